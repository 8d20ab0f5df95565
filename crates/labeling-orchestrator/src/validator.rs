//! The validator node's contract: confirm or reject events the
//! identifier proposed.

use serde::Deserialize;

use labeling_types::{ToolCall, VerificationResult};

use crate::state::{event_key, AgentKind, AgentState, ChatTurn, Communication, RouteTarget};

/// `event_id` is the [`event_key`] string (`"name:start:end"`) the
/// planner quoted back to the validator when it dispatched the task.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationDecision {
    pub event_id: String,
    pub remove: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorTaskResult {
    pub task_id: String,
    pub status: bool,
    #[serde(default)]
    pub validation_results: Vec<ValidationDecision>,
    #[serde(default)]
    pub recommendations: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorOutput {
    pub raw_message: String,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub task_result: Option<ValidatorTaskResult>,
}

pub fn apply_validator_output(state: &mut AgentState, output: ValidatorOutput) {
    state.current_agent = AgentKind::Validator;
    state.push_message(AgentKind::Validator, ChatTurn::new("assistant", output.raw_message));
    state.communication = None;

    if let Some(tool_call) = output.tool_call {
        state.pending_tool_call = Some(tool_call);
        return;
    }

    let Some(result) = output.task_result else {
        state.push_message(
            AgentKind::Validator,
            ChatTurn::new("system", "expected a tool_call or task_result"),
        );
        return;
    };

    if !state.has_plan_item(&result.task_id) {
        state.push_message(
            AgentKind::Validator,
            ChatTurn::new("system", format!("error: task_id {} not in plan", result.task_id)),
        );
        return;
    }

    for decision in &result.validation_results {
        if let Some(event) = state.detected_events.get_mut(&decision.event_id) {
            event.need_verification = false;
            event.verification_result = Some(if decision.remove {
                VerificationResult::Remove
            } else {
                VerificationResult::Keep
            });
        }
    }

    if let Some(item) = state.plan_item_mut(&result.task_id) {
        item.is_done = true;
    }

    let mut message = format!("validator task {} completed: status={}", result.task_id, result.status);
    if let Some(recommendations) = result.recommendations {
        message.push_str(&format!(" recommendations={recommendations}"));
    }
    state.communication = Some(Communication {
        from: AgentKind::Validator,
        to: RouteTarget::Planner,
        message,
    });
}

/// Convenience accessor mirroring [`event_key`] so callers assembling a
/// validator task assignment can quote the same identifiers back at it.
pub fn event_id_for(event: &labeling_types::DetectedEvent) -> String {
    event_key(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labeling_types::{DetectedEvent, PlanItem, PlanItemType};

    fn state_with_pending_event() -> (AgentState, String) {
        let mut state = AgentState::new();
        state.plan.push(PlanItem {
            task_id: "t1".into(),
            task_description: "verify spikes".into(),
            task_type: PlanItemType::Verification,
            is_done: false,
        });
        let event = DetectedEvent {
            event_name: "spike".into(),
            start_index: 10,
            end_index: 20,
            visual_pattern: "spike".into(),
            need_verification: true,
            verification_result: None,
        };
        let key = event_key(&event);
        state.upsert_event(event);
        (state, key)
    }

    #[test]
    fn keep_decision_clears_verification_flag_and_records_keep() {
        let (mut state, key) = state_with_pending_event();
        apply_validator_output(
            &mut state,
            ValidatorOutput {
                raw_message: "looks real".into(),
                tool_call: None,
                task_result: Some(ValidatorTaskResult {
                    task_id: "t1".into(),
                    status: true,
                    validation_results: vec![ValidationDecision { event_id: key.clone(), remove: false }],
                    recommendations: None,
                }),
            },
        );
        let event = &state.detected_events[&key];
        assert!(!event.need_verification);
        assert_eq!(event.verification_result, Some(VerificationResult::Keep));
        assert!(state.plan[0].is_done);
    }

    #[test]
    fn remove_decision_is_recorded_without_deleting_the_event() {
        let (mut state, key) = state_with_pending_event();
        apply_validator_output(
            &mut state,
            ValidatorOutput {
                raw_message: "false positive".into(),
                tool_call: None,
                task_result: Some(ValidatorTaskResult {
                    task_id: "t1".into(),
                    status: true,
                    validation_results: vec![ValidationDecision { event_id: key.clone(), remove: true }],
                    recommendations: Some("noise near sensor boundary".into()),
                }),
            },
        );
        let event = &state.detected_events[&key];
        assert!(!event.need_verification);
        assert_eq!(event.verification_result, Some(VerificationResult::Remove));
    }

    #[test]
    fn unknown_task_id_leaves_plan_and_events_untouched() {
        let (mut state, key) = state_with_pending_event();
        apply_validator_output(
            &mut state,
            ValidatorOutput {
                raw_message: "".into(),
                tool_call: None,
                task_result: Some(ValidatorTaskResult {
                    task_id: "missing".into(),
                    status: true,
                    validation_results: vec![ValidationDecision { event_id: key.clone(), remove: true }],
                    recommendations: None,
                }),
            },
        );
        assert!(state.detected_events[&key].need_verification);
        assert!(!state.plan[0].is_done);
        assert!(state.communication.is_none());
    }
}
