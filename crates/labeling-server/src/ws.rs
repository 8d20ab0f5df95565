//! WebSocket endpoints: `/ws/auto-detection/{file_id}` drives C11's agent
//! runner and forwards its `EventBus` notifications; `/ws/chat/{file_id}`
//! is the external chat stub (§6 Non-goals: no real LLM reasoning wired
//! to it, only context tracking and an echo acknowledging the message).

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{json, Value};

use labeling_core::{ConversationKind, ConversationStatus};
use labeling_types::{kind, EngineEvent};

use crate::{runner, AppState};

#[derive(Deserialize)]
struct ClientCommand {
    command: String,
}

pub async fn auto_detection_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_auto_detection(socket, state, file_id))
}

async fn handle_auto_detection(mut socket: WebSocket, state: AppState, file_id: String) {
    let mut events = state.events.subscribe();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Ok(cmd) = serde_json::from_str::<ClientCommand>(&text) {
                            match cmd.command.as_str() {
                                "start" | "start_auto_detection" => {
                                    runner::spawn_detection(state.clone(), file_id.clone());
                                }
                                "cancel" | "cancel_auto_detection" => {
                                    state.runs.cancel(&file_id).await;
                                }
                                _ => {}
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        state.runs.cancel(&file_id).await;
                        break;
                    }
                    Some(Err(_)) => {
                        state.runs.cancel(&file_id).await;
                        break;
                    }
                    _ => {}
                }
            }
            received = events.recv() => {
                match received {
                    Ok(event) if event.file_id.as_deref() == Some(file_id.as_str()) => {
                        let frame = json!({
                            "type": event.event_type,
                            "data": event.properties,
                            "atMs": event.at_ms,
                        });
                        if socket.send(WsMessage::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

pub async fn chat_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat(socket, state, file_id))
}

async fn handle_chat(mut socket: WebSocket, state: AppState, file_id: String) {
    while let Some(Ok(msg)) = socket.recv().await {
        let WsMessage::Text(text) = msg else { continue };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        if value.get("action").and_then(|v| v.as_str()) == Some("set-context") {
            state
                .conversations
                .set_status(&file_id, ConversationKind::Chat, ConversationStatus::Started)
                .await;
            continue;
        }

        let Some(message) = value.get("message").and_then(|v| v.as_str()) else {
            continue;
        };

        let received = EngineEvent::new(
            kind::USER_MESSAGE_RECEIVED,
            Some(file_id.clone()),
            json!({ "message": message }),
        );
        state
            .conversations
            .append(&file_id, ConversationKind::Chat, received.clone())
            .await;
        let _ = socket
            .send(WsMessage::Text(
                json!({ "type": received.event_type, "data": received.properties }).to_string().into(),
            ))
            .await;

        let reply_text =
            "Chat reasoning is not implemented by this endpoint; use auto-detection for event labeling.";
        let reply = EngineEvent::new(kind::AI_RESPONSE, Some(file_id.clone()), json!({ "message": reply_text }));
        state
            .conversations
            .append(&file_id, ConversationKind::Chat, reply.clone())
            .await;
        let _ = socket
            .send(WsMessage::Text(
                json!({ "type": reply.event_type, "data": reply.properties }).to_string().into(),
            ))
            .await;
    }
}
