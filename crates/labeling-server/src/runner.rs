//! The Agent Runner (C11, spec §4.9/§4.11): drives the planner/identifier/
//! validator state machine to completion for one file, turning its pure
//! `route()`/`apply_*_output()` reducer into an actual loop over LLM calls
//! and tool execution, and publishing progress over the file's `EventBus`
//! subscribers as it goes.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use labeling_core::{ConversationKind, ConversationStatus};
use labeling_orchestrator::{
    apply_identifier_output, apply_planner_output, apply_validator_output, route, AgentKind, AgentState,
    ChatTurn, IdentifierOutput, NextStep, PlannerOutput, ValidatorOutput,
};
use labeling_providers::{ChatMessage, ProviderError};
use labeling_tools::{basic_statistics, BasicStatistics, PlotCommand, PlotViewer, ToolResult};
use labeling_types::{kind, CoreError, EngineEvent, ToolSchema};

use crate::{loader, persistence, AppState};

enum RunOutcome {
    Completed(AgentState),
    Cancelled,
}

/// Fires the detection run in the background; the WS handler that
/// triggers this returns immediately, and progress arrives as `EventBus`
/// notifications the handler relays back over the socket.
pub fn spawn_detection(state: AppState, file_id: String) {
    tokio::spawn(async move {
        if let Err(err) = run_detection(state.clone(), file_id.clone()).await {
            tracing::warn!(file_id = %file_id, error = %err, "auto-detection run failed");
        }
    });
}

async fn run_detection(state: AppState, file_id: String) -> anyhow::Result<()> {
    let Some(cancel) = state.runs.try_start(&file_id).await else {
        publish(
            &state,
            &file_id,
            kind::DETECTION_FAILED,
            json!({ "message": "a run is already active for this file" }),
        )
        .await;
        return Ok(());
    };

    let result = drive_run(&state, &file_id, cancel.clone()).await;
    state.runs.finish(&file_id).await;

    match result {
        Ok(RunOutcome::Completed(agent_state)) => {
            let saved = persistence::persist_agent_state(&state, &file_id, &agent_state).await?;
            publish(&state, &file_id, kind::EVENTS_SAVED, json!({ "count": saved })).await;
            let summary = agent_state
                .final_result
                .map(|f| f.summary)
                .unwrap_or_default();
            publish(&state, &file_id, kind::DETECTION_COMPLETED, json!({ "summary": summary })).await;
            state
                .conversations
                .set_status(&file_id, ConversationKind::AutoDetection, ConversationStatus::Completed)
                .await;
        }
        Ok(RunOutcome::Cancelled) => {
            publish(&state, &file_id, kind::DETECTION_CANCELLED, json!({})).await;
            state
                .conversations
                .set_status(&file_id, ConversationKind::AutoDetection, ConversationStatus::Cancelled)
                .await;
        }
        Err(err) => {
            publish(&state, &file_id, kind::DETECTION_FAILED, json!({ "message": err.to_string() })).await;
            state
                .conversations
                .set_status(&file_id, ConversationKind::AutoDetection, ConversationStatus::Failed)
                .await;
        }
    }
    Ok(())
}

async fn drive_run(state: &AppState, file_id: &str, cancel: CancellationToken) -> anyhow::Result<RunOutcome> {
    publish(state, file_id, kind::DETECTION_STARTED, json!({})).await;
    state
        .conversations
        .set_status(file_id, ConversationKind::AutoDetection, ConversationStatus::Running)
        .await;

    let record = state.files.get(file_id).await.context("file not found")?;
    let (x, channels) = loader::load_full_series(&record)
        .await
        .context("loading series for detection")?;
    if x.is_empty() {
        anyhow::bail!("file has no parsed data points");
    }

    // C11 responsibility 1: load the project's label classes so the
    // planner/identifier prompt can name them and C12 can color by them.
    let classes = state.files.classes_for_file(file_id).await;
    let stats = basic_statistics(&channels);
    let system_prompt = build_system_prompt(&stats, &classes);

    let mut agent_state = AgentState::new();
    agent_state.push_message(AgentKind::Planner, ChatTurn::new("system", system_prompt));

    let mut viewers: HashMap<AgentKind, PlotViewer> = HashMap::new();
    for node in [AgentKind::Planner, AgentKind::Identifier, AgentKind::Validator] {
        viewers.insert(node, PlotViewer::new(x.clone(), channels.clone()));
    }
    let tools = labeling_tools::tool_schemas();

    for _ in 0..state.config.recursion_limit {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        match route(&agent_state) {
            NextStep::Terminal => {
                if agent_state.final_result.is_some() {
                    return Ok(RunOutcome::Completed(agent_state));
                }
                // `graph::is_terminal` also fires on a blown token budget,
                // with no `final_result` to show for it. Spec §7 reserves
                // `Completed` for a guarded `final_result`; anything else
                // that reaches `Terminal` is a budget failure, not success.
                return Err(CoreError::BudgetExceeded(format!(
                    "{:?} exceeded its token budget ({} tokens used) without producing a final result",
                    agent_state.current_agent, agent_state.token_usage,
                ))
                .into());
            }
            NextStep::ToolRunner(node) => {
                let viewer = viewers.get_mut(&node).expect("viewer registered for every node");
                run_tool(state, file_id, &mut agent_state, viewer, node).await;
            }
            NextStep::Route(node) | NextStep::SelfLoop(node) => {
                step_node(state, file_id, &mut agent_state, node, &tools).await?;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    anyhow::bail!("recursion limit reached without finalizing")
}

async fn complete_for(
    state: &AppState,
    agent_state: &AgentState,
    node: AgentKind,
    tools: &[ToolSchema],
) -> anyhow::Result<labeling_providers::CompletionResult> {
    let messages: Vec<ChatMessage> = agent_state
        .messages(node)
        .iter()
        .map(|turn| ChatMessage::text(turn.role.clone(), turn.content.clone()))
        .collect();

    match state.providers.complete(messages.clone(), Some(tools.to_vec())).await {
        Ok(result) => Ok(result),
        Err(ProviderError::BadRequest(_)) => {
            let retry: Vec<ChatMessage> = messages.iter().map(ChatMessage::without_image).collect();
            Ok(state.providers.complete(retry, Some(tools.to_vec())).await?)
        }
        Err(other) => Err(other.into()),
    }
}

fn parse_planner_text(text: &str) -> PlannerOutput {
    serde_json::from_str(text).unwrap_or_else(|_| PlannerOutput {
        raw_message: text.to_string(),
        tool_call: None,
        additional_info: None,
    })
}

fn parse_identifier_text(text: &str) -> IdentifierOutput {
    serde_json::from_str(text).unwrap_or_else(|_| IdentifierOutput {
        raw_message: text.to_string(),
        tool_call: None,
        task_result: None,
    })
}

fn parse_validator_text(text: &str) -> ValidatorOutput {
    serde_json::from_str(text).unwrap_or_else(|_| ValidatorOutput {
        raw_message: text.to_string(),
        tool_call: None,
        task_result: None,
    })
}

async fn step_node(
    state: &AppState,
    file_id: &str,
    agent_state: &mut AgentState,
    node: AgentKind,
    tools: &[ToolSchema],
) -> anyhow::Result<()> {
    let completion = complete_for(state, agent_state, node, tools).await?;
    let delta = completion.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0);
    agent_state.add_token_usage(delta);
    let tool_call = completion.tool_calls.into_iter().next();

    match node {
        AgentKind::Planner => {
            let mut output = parse_planner_text(&completion.text);
            if tool_call.is_some() {
                output.tool_call = tool_call;
            }
            apply_planner_output(agent_state, output);
            publish(state, file_id, kind::PLAN_UPDATED, json!({ "plan": agent_state.plan })).await;
        }
        AgentKind::Identifier => {
            let mut output = parse_identifier_text(&completion.text);
            if tool_call.is_some() {
                output.tool_call = tool_call;
            }
            apply_identifier_output(agent_state, output);
            if let Some(comm) = &agent_state.communication {
                publish(
                    state,
                    file_id,
                    kind::TASK_COMPLETED,
                    json!({ "node": "identifier", "message": comm.message }),
                )
                .await;
            }
        }
        AgentKind::Validator => {
            let mut output = parse_validator_text(&completion.text);
            if tool_call.is_some() {
                output.tool_call = tool_call;
            }
            apply_validator_output(agent_state, output);
            if let Some(comm) = &agent_state.communication {
                publish(
                    state,
                    file_id,
                    kind::TASK_COMPLETED,
                    json!({ "node": "validator", "message": comm.message }),
                )
                .await;
            }
        }
    }

    publish(
        state,
        file_id,
        kind::LLM_INTERACTION,
        json!({ "node": node_label(node), "message": completion.text }),
    )
    .await;
    publish(
        state,
        file_id,
        kind::ANALYSIS_PROGRESS,
        json!({
            "node": node_label(node),
            "tokenUsage": agent_state.token_usage,
            "eventsFound": agent_state.detected_events.len(),
        }),
    )
    .await;

    Ok(())
}

async fn run_tool(
    state: &AppState,
    file_id: &str,
    agent_state: &mut AgentState,
    viewer: &mut PlotViewer,
    node: AgentKind,
) {
    let Some(call) = agent_state.pending_tool_call.take() else {
        return;
    };

    let command: Result<PlotCommand, _> =
        serde_json::from_value(json!({ "name": call.name, "args": call.arguments }));
    let (result, sync) = match command {
        Ok(cmd) => viewer.execute(cmd),
        Err(err) => (
            ToolResult {
                desc: format!("invalid tool arguments: {err}"),
                fig: None,
            },
            None,
        ),
    };

    if let Some(sync) = sync {
        let payload = serde_json::to_value(&sync).unwrap_or_else(|_| json!({}));
        publish(state, file_id, kind::PLOT_VIEW_SYNC, payload).await;
    }

    let mut content = result.desc.clone();
    if result.fig.is_some() {
        content.push_str("\n[chart image attached]");
    }
    agent_state.push_message(node, ChatTurn::new("tool", content));
}

fn node_label(node: AgentKind) -> &'static str {
    match node {
        AgentKind::Planner => "planner",
        AgentKind::Identifier => "identifier",
        AgentKind::Validator => "validator",
    }
}

fn build_system_prompt(stats: &BasicStatistics, classes: &[labeling_types::ProjectClass]) -> String {
    let columns = stats
        .columns
        .iter()
        .map(|c| format!("{} (mean={:.3}, std={:.3}, min={:.3}, max={:.3})", c.name, c.mean, c.std, c.min, c.max))
        .collect::<Vec<_>>()
        .join("; ");
    let event_pattern_text = if classes.is_empty() {
        "none defined; name events however best fits what you observe".to_string()
    } else {
        classes.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
    };
    format!(
        "You are the planning agent for automatic event detection over a time series with {} rows and {} channel(s): {}. \
         Known event patterns for this project: {}. \
         Decompose the task into identification and verification plan items, dispatch them to the identifier/validator \
         agents, and only emit a final_result once every plan item is done and no detected event still needs verification.",
        stats.num_rows, stats.num_columns, columns, event_pattern_text
    )
}

async fn publish(state: &AppState, file_id: &str, event_type: &str, properties: Value) {
    let event = EngineEvent::new(event_type, Some(file_id.to_string()), properties);
    state
        .conversations
        .append(file_id, ConversationKind::AutoDetection, event.clone())
        .await;
    state.events.publish(event);
}
