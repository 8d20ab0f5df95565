//! The agent state container: the single-writer-at-any-time state three
//! LLM-backed nodes exchange. Every mutation goes through a typed
//! accessor instead of loose dict-style access.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use labeling_types::{DetectedEvent, PlanItem, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Planner,
    Identifier,
    Validator,
}

/// The three hand-off destinations a `Communication` can name.
/// Kept distinct from [`AgentKind`] because the wire vocabulary
/// ("identification"/"verification") differs from the node names
/// ("identifier"/"validator").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Planner,
    Identification,
    Verification,
}

impl RouteTarget {
    pub fn node(self) -> AgentKind {
        match self {
            RouteTarget::Planner => AgentKind::Planner,
            RouteTarget::Identification => AgentKind::Identifier,
            RouteTarget::Verification => AgentKind::Validator,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// The single in-flight hand-off between nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Communication {
    pub from: AgentKind,
    pub to: RouteTarget,
    pub message: String,
}

/// The planner's finalization claim, accepted only once the guard in
/// [`crate::planner::apply_planner_output`] passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub summary: String,
    pub total_events: usize,
}

/// `(event_name, start_index, end_index)` — the key used to
/// de-duplicate `detected_events` as a set.
pub fn event_key(event: &DetectedEvent) -> String {
    format!("{}:{}:{}", event.event_name, event.start_index, event.end_index)
}

#[derive(Debug, Clone)]
pub struct AgentState {
    pub planner_messages: Vec<ChatTurn>,
    pub identifier_messages: Vec<ChatTurn>,
    pub validator_messages: Vec<ChatTurn>,
    pub plan: Vec<PlanItem>,
    pub communication: Option<Communication>,
    /// Keyed by [`event_key`] so re-emitting the same event is a no-op
    /// rather than a duplicate.
    pub detected_events: BTreeMap<String, DetectedEvent>,
    pub token_usage: u64,
    pub current_agent: AgentKind,
    /// A tool call the current node just requested; routing sends the
    /// graph to that node's tool-runner before returning control.
    /// Cleared once the runner has executed it and appended the tool
    /// result to the owning node's message thread.
    pub pending_tool_call: Option<ToolCall>,
    pub final_result: Option<FinalResult>,
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            planner_messages: Vec::new(),
            identifier_messages: Vec::new(),
            validator_messages: Vec::new(),
            plan: Vec::new(),
            communication: None,
            detected_events: BTreeMap::new(),
            token_usage: 0,
            current_agent: AgentKind::Planner,
            pending_tool_call: None,
            final_result: None,
        }
    }

    pub fn messages_mut(&mut self, kind: AgentKind) -> &mut Vec<ChatTurn> {
        match kind {
            AgentKind::Planner => &mut self.planner_messages,
            AgentKind::Identifier => &mut self.identifier_messages,
            AgentKind::Validator => &mut self.validator_messages,
        }
    }

    pub fn messages(&self, kind: AgentKind) -> &[ChatTurn] {
        match kind {
            AgentKind::Planner => &self.planner_messages,
            AgentKind::Identifier => &self.identifier_messages,
            AgentKind::Validator => &self.validator_messages,
        }
    }

    pub fn push_message(&mut self, kind: AgentKind, turn: ChatTurn) {
        self.messages_mut(kind).push(turn);
    }

    /// Token usage is monotonic and cross-node: every LLM call's usage
    /// is added here regardless of which node made the call.
    pub fn add_token_usage(&mut self, delta: u64) {
        self.token_usage = self.token_usage.saturating_add(delta);
    }

    pub fn upsert_event(&mut self, event: DetectedEvent) {
        self.detected_events.insert(event_key(&event), event);
    }

    pub fn plan_item_mut(&mut self, task_id: &str) -> Option<&mut PlanItem> {
        self.plan.iter_mut().find(|item| item.task_id == task_id)
    }

    pub fn has_plan_item(&self, task_id: &str) -> bool {
        self.plan.iter().any(|item| item.task_id == task_id)
    }

    pub fn all_plan_items_done(&self) -> bool {
        self.plan.iter().all(|item| item.is_done)
    }

    pub fn any_event_needs_verification(&self) -> bool {
        self.detected_events.values().any(|e| e.need_verification)
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labeling_types::{PlanItemType, VerificationResult};

    fn event(name: &str, start: u64, end: u64, needs_verification: bool) -> DetectedEvent {
        DetectedEvent {
            event_name: name.to_string(),
            start_index: start,
            end_index: end,
            visual_pattern: "spike".to_string(),
            need_verification: needs_verification,
            verification_result: if needs_verification { None } else { Some(VerificationResult::Keep) },
        }
    }

    #[test]
    fn upsert_event_deduplicates_by_name_start_end() {
        let mut state = AgentState::new();
        state.upsert_event(event("spike", 10, 20, true));
        state.upsert_event(event("spike", 10, 20, false));
        assert_eq!(state.detected_events.len(), 1);
        assert!(!state.detected_events.values().next().unwrap().need_verification);
    }

    #[test]
    fn finalization_guards_reflect_plan_and_verification_state() {
        let mut state = AgentState::new();
        state.plan.push(PlanItem {
            task_id: "t1".into(),
            task_description: "find spikes".into(),
            task_type: PlanItemType::Identification,
            is_done: false,
        });
        state.upsert_event(event("spike", 1, 2, true));
        assert!(!state.all_plan_items_done());
        assert!(state.any_event_needs_verification());

        state.plan_item_mut("t1").unwrap().is_done = true;
        state.upsert_event(event("spike", 1, 2, false));
        assert!(state.all_plan_items_done());
        assert!(!state.any_event_needs_verification());
    }
}
