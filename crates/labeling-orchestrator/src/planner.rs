//! The planner node's contract: decompose the request into a plan,
//! dispatch tasks to the identifier/validator, and decide when the run
//! is done. The planner's structured output is a typed enum rather than
//! an ad hoc set of optional fields checked in sequence.

use serde::Deserialize;

use labeling_types::{PlanItem, ToolCall};

use crate::state::{AgentKind, AgentState, ChatTurn, Communication, FinalResult, RouteTarget};

/// A `[start, end]` index window before it is widened for hand-off.
pub type Window = [i64; 2];

#[derive(Debug, Clone, Deserialize)]
pub struct TaskAssignment {
    pub task_id: String,
    pub task_description: String,
    #[serde(default)]
    pub event_names: Vec<String>,
    /// Candidate windows the planner wants inspected; widened by
    /// [`widen_window`] before being handed to the identifier/validator.
    #[serde(default)]
    pub potential_windows: Vec<Window>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalResultClaim {
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", untagged)]
pub enum PlannerAdditionalInfo {
    Plan { plan: Vec<PlanItem> },
    IdentifierTask { identifier_task: TaskAssignment },
    ValidatorTask { validator_task: TaskAssignment },
    FinalResult { final_result: FinalResultClaim },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerOutput {
    pub raw_message: String,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub additional_info: Option<PlannerAdditionalInfo>,
}

/// Widen `[start, end]` to `[start - (end-start)/2, end + (end-start)/2]`
/// so the downstream agent sees context around the candidate window
/// rather than only the window itself.
pub fn widen_window(window: Window) -> Window {
    let [start, end] = window;
    let pad = (end - start) / 2;
    [start - pad, end + pad]
}

/// Apply the planner's structured output to `state`, advancing
/// `communication`/`plan`/`final_result` per the node's contract. Returns
/// nothing: the next step is read back out of `state` by [`crate::graph::route`].
pub fn apply_planner_output(state: &mut AgentState, output: PlannerOutput) {
    state.current_agent = AgentKind::Planner;
    state.push_message(AgentKind::Planner, ChatTurn::new("assistant", output.raw_message));
    state.communication = None;

    if let Some(tool_call) = output.tool_call {
        state.pending_tool_call = Some(tool_call);
        return;
    }

    match output.additional_info {
        Some(PlannerAdditionalInfo::Plan { plan }) => {
            state.plan = plan;
        }
        Some(PlannerAdditionalInfo::IdentifierTask { identifier_task }) => {
            dispatch_task(state, identifier_task, RouteTarget::Identification);
        }
        Some(PlannerAdditionalInfo::ValidatorTask { validator_task }) => {
            dispatch_task(state, validator_task, RouteTarget::Verification);
        }
        Some(PlannerAdditionalInfo::FinalResult { final_result }) => {
            finalize(state, final_result);
        }
        None => {
            state.push_message(
                AgentKind::Planner,
                ChatTurn::new(
                    "system",
                    "expected a tool_call or one of plan/identifier_task/validator_task/final_result",
                ),
            );
        }
    }
}

fn dispatch_task(state: &mut AgentState, mut task: TaskAssignment, to: RouteTarget) {
    if !state.has_plan_item(&task.task_id) {
        state.push_message(
            AgentKind::Planner,
            ChatTurn::new("system", format!("warning: task_id {} not found in plan", task.task_id)),
        );
        return;
    }
    task.potential_windows = task.potential_windows.into_iter().map(widen_window).collect();
    let message = serde_json::to_string(&serde_json::json!({
        "task_id": task.task_id,
        "task_description": task.task_description,
        "event_names": task.event_names,
        "potential_windows": task.potential_windows,
    }))
    .unwrap_or_default();
    state.communication = Some(Communication {
        from: AgentKind::Planner,
        to,
        message,
    });
}

fn finalize(state: &mut AgentState, claim: FinalResultClaim) {
    if state.all_plan_items_done() && !state.any_event_needs_verification() {
        state.final_result = Some(FinalResult {
            summary: claim.summary,
            total_events: state.detected_events.len(),
        });
    } else {
        state.push_message(
            AgentKind::Planner,
            ChatTurn::new(
                "system",
                "cannot finalize: plan has unfinished items or events still awaiting verification",
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labeling_types::{PlanItemType, VerificationResult};

    fn plan_item(task_id: &str, done: bool) -> PlanItem {
        PlanItem {
            task_id: task_id.to_string(),
            task_description: "find spikes".into(),
            task_type: PlanItemType::Identification,
            is_done: done,
        }
    }

    #[test]
    fn widen_window_pads_by_half_the_span() {
        assert_eq!(widen_window([100, 200]), [50, 250]);
        assert_eq!(widen_window([0, 10]), [-5, 15]);
    }

    #[test]
    fn unknown_task_id_is_rejected_without_dispatch() {
        let mut state = AgentState::new();
        let output = PlannerOutput {
            raw_message: "dispatching".into(),
            tool_call: None,
            additional_info: Some(PlannerAdditionalInfo::IdentifierTask {
                identifier_task: TaskAssignment {
                    task_id: "missing".into(),
                    task_description: "".into(),
                    event_names: vec![],
                    potential_windows: vec![],
                },
            }),
        };
        apply_planner_output(&mut state, output);
        assert!(state.communication.is_none());
        assert!(state
            .planner_messages
            .last()
            .unwrap()
            .content
            .contains("not found in plan"));
    }

    #[test]
    fn known_task_id_dispatches_with_widened_windows() {
        let mut state = AgentState::new();
        state.plan.push(plan_item("t1", false));
        let output = PlannerOutput {
            raw_message: "dispatching t1".into(),
            tool_call: None,
            additional_info: Some(PlannerAdditionalInfo::IdentifierTask {
                identifier_task: TaskAssignment {
                    task_id: "t1".into(),
                    task_description: "find spikes".into(),
                    event_names: vec!["spike".into()],
                    potential_windows: vec![[100, 200]],
                },
            }),
        };
        apply_planner_output(&mut state, output);
        let comm = state.communication.expect("dispatch communication");
        assert_eq!(comm.to, RouteTarget::Identification);
        assert!(comm.message.contains("50") && comm.message.contains("250"));
    }

    #[test]
    fn finalize_is_refused_while_plan_items_remain() {
        let mut state = AgentState::new();
        state.plan.push(plan_item("t1", false));
        let output = PlannerOutput {
            raw_message: "wrapping up".into(),
            tool_call: None,
            additional_info: Some(PlannerAdditionalInfo::FinalResult {
                final_result: FinalResultClaim { summary: "done".into() },
            }),
        };
        apply_planner_output(&mut state, output);
        assert!(state.final_result.is_none());
    }

    #[test]
    fn finalize_is_refused_while_events_await_verification() {
        let mut state = AgentState::new();
        state.plan.push(plan_item("t1", true));
        state.upsert_event(labeling_types::DetectedEvent {
            event_name: "spike".into(),
            start_index: 1,
            end_index: 2,
            visual_pattern: "spike".into(),
            need_verification: true,
            verification_result: None,
        });
        let output = PlannerOutput {
            raw_message: "wrapping up".into(),
            tool_call: None,
            additional_info: Some(PlannerAdditionalInfo::FinalResult {
                final_result: FinalResultClaim { summary: "done".into() },
            }),
        };
        apply_planner_output(&mut state, output);
        assert!(state.final_result.is_none());
    }

    #[test]
    fn finalize_succeeds_once_plan_and_verification_clear() {
        let mut state = AgentState::new();
        state.plan.push(plan_item("t1", true));
        state.upsert_event(labeling_types::DetectedEvent {
            event_name: "spike".into(),
            start_index: 1,
            end_index: 2,
            visual_pattern: "spike".into(),
            need_verification: false,
            verification_result: Some(VerificationResult::Keep),
        });
        let output = PlannerOutput {
            raw_message: "wrapping up".into(),
            tool_call: None,
            additional_info: Some(PlannerAdditionalInfo::FinalResult {
                final_result: FinalResultClaim { summary: "found 1 spike".into() },
            }),
        };
        apply_planner_output(&mut state, output);
        let result = state.final_result.expect("final result");
        assert_eq!(result.total_events, 1);
    }
}
