//! Broadcast payload for `labeling-core::EventBus` and the WS notification
//! frames sent to `/ws/auto-detection/{file_id}` and `/ws/chat/{file_id}`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Notification kinds emitted during a detection run, plus the chat
/// stub's frame kinds. Kept as a plain string on the wire so new kinds
/// don't require a breaking change to subscribers, but the constants
/// here are the single source of truth for spelling.
pub mod kind {
    pub const ANALYSIS_PROGRESS: &str = "analysis_progress";
    pub const PLAN_UPDATED: &str = "plan_updated";
    pub const LLM_INTERACTION: &str = "llm_interaction";
    pub const PLOT_VIEW_SYNC: &str = "plot_view_sync";
    pub const TASK_COMPLETED: &str = "task_completed";
    pub const DETECTION_STARTED: &str = "detection_started";
    pub const ANALYSIS_COMPLETED: &str = "analysis_completed";
    pub const DETECTION_COMPLETED: &str = "detection_completed";
    pub const EVENTS_SAVED: &str = "events_saved";
    pub const DETECTION_FAILED: &str = "detection_failed";
    pub const DETECTION_CANCELLED: &str = "detection_cancelled";

    pub const USER_MESSAGE_RECEIVED: &str = "user_message_received";
    pub const AI_RESPONSE: &str = "ai_response";
    pub const ERROR: &str = "error";
    pub const EVENT_ADDED: &str = "event_added";
    pub const GUIDELINE_ADDED: &str = "guideline_added";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub event_type: String,
    pub file_id: Option<String>,
    pub properties: Value,
    pub at_ms: u64,
}

impl EngineEvent {
    pub fn new(event_type: impl Into<String>, file_id: Option<String>, properties: Value) -> Self {
        Self {
            event_type: event_type.into(),
            file_id,
            properties,
            at_ms: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
