//! Planner/Identifier/Validator agent state machine: a pure
//! reducer over [`AgentState`] plus the routing function that decides
//! which node runs next. Driving the loop — calling an LLM, invoking
//! tools, persisting results — is the runner's job, not this crate's;
//! everything here is deterministic and can be exercised without a
//! network connection.

pub mod graph;
pub mod identifier;
pub mod planner;
pub mod state;
pub mod validator;

pub use graph::{budget_for, is_terminal, route, NextStep, IDENTIFIER_VALIDATOR_TOKEN_BUDGET, PLANNER_TOKEN_BUDGET};
pub use identifier::{apply_identifier_output, IdentifierOutput, TaskResult};
pub use planner::{apply_planner_output, widen_window, PlannerAdditionalInfo, PlannerOutput, TaskAssignment, Window};
pub use state::{event_key, AgentKind, AgentState, ChatTurn, Communication, FinalResult, RouteTarget};
pub use validator::{apply_validator_output, event_id_for, ValidationDecision, ValidatorOutput, ValidatorTaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use labeling_types::{DetectedEvent, PlanItem, PlanItemType, VerificationResult};

    /// A full planner → identifier → planner → validator → planner →
    /// terminal pass, exercising the reducer and router together the way
    /// the runner will.
    #[test]
    fn end_to_end_run_reaches_terminal_once_all_events_are_validated() {
        let mut state = AgentState::new();

        apply_planner_output(
            &mut state,
            PlannerOutput {
                raw_message: "planning".into(),
                tool_call: None,
                additional_info: Some(PlannerAdditionalInfo::Plan {
                    plan: vec![
                        PlanItem {
                            task_id: "identify-1".into(),
                            task_description: "find spikes".into(),
                            task_type: PlanItemType::Identification,
                            is_done: false,
                        },
                        PlanItem {
                            task_id: "verify-1".into(),
                            task_description: "verify spikes".into(),
                            task_type: PlanItemType::Verification,
                            is_done: false,
                        },
                    ],
                }),
            },
        );
        assert_eq!(route(&state), NextStep::SelfLoop(AgentKind::Planner));

        apply_planner_output(
            &mut state,
            PlannerOutput {
                raw_message: "dispatching identification".into(),
                tool_call: None,
                additional_info: Some(PlannerAdditionalInfo::IdentifierTask {
                    identifier_task: TaskAssignment {
                        task_id: "identify-1".into(),
                        task_description: "find spikes".into(),
                        event_names: vec!["spike".into()],
                        potential_windows: vec![[100, 200]],
                    },
                }),
            },
        );
        assert_eq!(route(&state), NextStep::Route(AgentKind::Identifier));

        let event = DetectedEvent {
            event_name: "spike".into(),
            start_index: 100,
            end_index: 200,
            visual_pattern: "spike".into(),
            need_verification: false,
            verification_result: None,
        };
        let key = event_key(&event);
        apply_identifier_output(
            &mut state,
            IdentifierOutput {
                raw_message: "found it".into(),
                tool_call: None,
                task_result: Some(TaskResult {
                    task_id: "identify-1".into(),
                    status: true,
                    events_found: vec![event],
                }),
            },
        );
        assert_eq!(route(&state), NextStep::Route(AgentKind::Planner));
        assert!(!state.detected_events[&key].need_verification);

        apply_planner_output(
            &mut state,
            PlannerOutput {
                raw_message: "dispatching verification".into(),
                tool_call: None,
                additional_info: Some(PlannerAdditionalInfo::ValidatorTask {
                    validator_task: TaskAssignment {
                        task_id: "verify-1".into(),
                        task_description: "verify spikes".into(),
                        event_names: vec!["spike".into()],
                        potential_windows: vec![],
                    },
                }),
            },
        );
        assert_eq!(route(&state), NextStep::Route(AgentKind::Validator));

        apply_validator_output(
            &mut state,
            ValidatorOutput {
                raw_message: "confirmed".into(),
                tool_call: None,
                task_result: Some(ValidatorTaskResult {
                    task_id: "verify-1".into(),
                    status: true,
                    validation_results: vec![ValidationDecision { event_id: key.clone(), remove: false }],
                    recommendations: None,
                }),
            },
        );
        assert_eq!(route(&state), NextStep::Route(AgentKind::Planner));
        assert!(!state.detected_events[&key].need_verification);
        assert_eq!(state.detected_events[&key].verification_result, Some(VerificationResult::Keep));

        apply_planner_output(
            &mut state,
            PlannerOutput {
                raw_message: "wrapping up".into(),
                tool_call: None,
                additional_info: Some(PlannerAdditionalInfo::FinalResult {
                    final_result: planner::FinalResultClaim { summary: "1 spike confirmed".into() },
                }),
            },
        );
        assert_eq!(route(&state), NextStep::Terminal);
        assert_eq!(state.final_result.unwrap().total_events, 1);
    }

    /// S4: a single identification item, an identifier confident enough
    /// to report `need_verification = false` directly, and a planner that
    /// finalizes without ever dispatching a validator task.
    #[test]
    fn direct_finalization_when_identifier_reports_no_verification_needed() {
        let mut state = AgentState::new();

        apply_planner_output(
            &mut state,
            PlannerOutput {
                raw_message: "planning".into(),
                tool_call: None,
                additional_info: Some(PlannerAdditionalInfo::Plan {
                    plan: vec![PlanItem {
                        task_id: "identify-1".into(),
                        task_description: "find spikes".into(),
                        task_type: PlanItemType::Identification,
                        is_done: false,
                    }],
                }),
            },
        );

        apply_planner_output(
            &mut state,
            PlannerOutput {
                raw_message: "dispatching identification".into(),
                tool_call: None,
                additional_info: Some(PlannerAdditionalInfo::IdentifierTask {
                    identifier_task: TaskAssignment {
                        task_id: "identify-1".into(),
                        task_description: "find spikes".into(),
                        event_names: vec!["spike".into()],
                        potential_windows: vec![],
                    },
                }),
            },
        );
        assert_eq!(route(&state), NextStep::Route(AgentKind::Identifier));

        apply_identifier_output(
            &mut state,
            IdentifierOutput {
                raw_message: "found it, confident".into(),
                tool_call: None,
                task_result: Some(TaskResult {
                    task_id: "identify-1".into(),
                    status: true,
                    events_found: vec![DetectedEvent {
                        event_name: "spike".into(),
                        start_index: 100,
                        end_index: 200,
                        visual_pattern: "spike".into(),
                        need_verification: false,
                        verification_result: None,
                    }],
                }),
            },
        );
        assert_eq!(route(&state), NextStep::Route(AgentKind::Planner));
        assert!(state.all_plan_items_done());
        assert!(!state.any_event_needs_verification());

        apply_planner_output(
            &mut state,
            PlannerOutput {
                raw_message: "wrapping up".into(),
                tool_call: None,
                additional_info: Some(PlannerAdditionalInfo::FinalResult {
                    final_result: planner::FinalResultClaim { summary: "1 spike found".into() },
                }),
            },
        );
        assert_eq!(route(&state), NextStep::Terminal);
        assert_eq!(state.final_result.unwrap().total_events, 1);
    }
}
