//! The identifier node's contract: inspect the window the planner
//! assigned and report back which events it found.

use serde::Deserialize;

use labeling_types::{DetectedEvent, ToolCall};

use crate::state::{AgentKind, AgentState, ChatTurn, Communication, RouteTarget};

#[derive(Debug, Clone, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: bool,
    #[serde(default)]
    pub events_found: Vec<DetectedEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifierOutput {
    pub raw_message: String,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub task_result: Option<TaskResult>,
}

pub fn apply_identifier_output(state: &mut AgentState, output: IdentifierOutput) {
    state.current_agent = AgentKind::Identifier;
    state.push_message(AgentKind::Identifier, ChatTurn::new("assistant", output.raw_message));
    state.communication = None;

    if let Some(tool_call) = output.tool_call {
        state.pending_tool_call = Some(tool_call);
        return;
    }

    let Some(result) = output.task_result else {
        state.push_message(
            AgentKind::Identifier,
            ChatTurn::new("system", "expected a tool_call or task_result"),
        );
        return;
    };

    if !state.has_plan_item(&result.task_id) {
        state.push_message(
            AgentKind::Identifier,
            ChatTurn::new("system", format!("error: task_id {} not in plan", result.task_id)),
        );
        return;
    }

    if result.status {
        // `need_verification`/`verification_result` are the LLM's own
        // call: an event it's confident about can go straight to
        // finalization, one it's unsure of can carry `need_verification =
        // true` for the validator to settle later.
        for event in result.events_found {
            state.upsert_event(event);
        }
        if let Some(item) = state.plan_item_mut(&result.task_id) {
            item.is_done = true;
        }
    }

    state.communication = Some(Communication {
        from: AgentKind::Identifier,
        to: RouteTarget::Planner,
        message: format!("identifier task {} completed: status={}", result.task_id, result.status),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use labeling_types::{PlanItem, PlanItemType};

    fn state_with_task(task_id: &str) -> AgentState {
        let mut state = AgentState::new();
        state.plan.push(PlanItem {
            task_id: task_id.to_string(),
            task_description: "find spikes".into(),
            task_type: PlanItemType::Identification,
            is_done: false,
        });
        state
    }

    #[test]
    fn unknown_task_id_reports_error_without_mutating_plan_or_events() {
        let mut state = state_with_task("t1");
        apply_identifier_output(
            &mut state,
            IdentifierOutput {
                raw_message: "done".into(),
                tool_call: None,
                task_result: Some(TaskResult {
                    task_id: "missing".into(),
                    status: true,
                    events_found: vec![],
                }),
            },
        );
        assert!(state.communication.is_none());
        assert!(!state.plan[0].is_done);
        assert!(state
            .identifier_messages
            .last()
            .unwrap()
            .content
            .contains("not in plan"));
    }

    #[test]
    fn successful_result_marks_plan_item_done_and_preserves_llm_verification_flag() {
        let mut state = state_with_task("t1");
        apply_identifier_output(
            &mut state,
            IdentifierOutput {
                raw_message: "found one".into(),
                tool_call: None,
                task_result: Some(TaskResult {
                    task_id: "t1".into(),
                    status: true,
                    events_found: vec![DetectedEvent {
                        event_name: "spike".into(),
                        start_index: 10,
                        end_index: 20,
                        visual_pattern: "spike".into(),
                        need_verification: true,
                        verification_result: None,
                    }],
                }),
            },
        );
        assert!(state.plan[0].is_done);
        assert_eq!(state.detected_events.len(), 1);
        assert!(state.detected_events.values().next().unwrap().need_verification);
        let comm = state.communication.expect("hand-back to planner");
        assert_eq!(comm.to, RouteTarget::Planner);
    }

    #[test]
    fn successful_result_with_need_verification_false_is_stored_as_reported() {
        let mut state = state_with_task("t1");
        apply_identifier_output(
            &mut state,
            IdentifierOutput {
                raw_message: "found one, confident".into(),
                tool_call: None,
                task_result: Some(TaskResult {
                    task_id: "t1".into(),
                    status: true,
                    events_found: vec![DetectedEvent {
                        event_name: "spike".into(),
                        start_index: 10,
                        end_index: 20,
                        visual_pattern: "spike".into(),
                        need_verification: false,
                        verification_result: None,
                    }],
                }),
            },
        );
        assert!(!state.detected_events.values().next().unwrap().need_verification);
    }

    #[test]
    fn failed_result_hands_back_without_marking_plan_item_done() {
        let mut state = state_with_task("t1");
        apply_identifier_output(
            &mut state,
            IdentifierOutput {
                raw_message: "found nothing".into(),
                tool_call: None,
                task_result: Some(TaskResult {
                    task_id: "t1".into(),
                    status: false,
                    events_found: vec![],
                }),
            },
        );
        assert!(!state.plan[0].is_done);
        assert!(state.communication.is_some());
    }
}
