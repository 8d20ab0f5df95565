//! Pure routing over [`AgentState`]. Every branch here is a
//! function of state alone: no I/O, no LLM calls, no clock. The runner
//! (outside this crate) drives the loop this describes — call a node,
//! apply its output, compute the next step, repeat until [`NextStep::Terminal`].

use crate::state::{AgentKind, AgentState};

pub const PLANNER_TOKEN_BUDGET: u64 = 500_000;
pub const IDENTIFIER_VALIDATOR_TOKEN_BUDGET: u64 = 2_000_000;

pub fn budget_for(kind: AgentKind) -> u64 {
    match kind {
        AgentKind::Planner => PLANNER_TOKEN_BUDGET,
        AgentKind::Identifier | AgentKind::Validator => IDENTIFIER_VALIDATOR_TOKEN_BUDGET,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Run `kind`'s tool-runner against `state.pending_tool_call`, append
    /// the result to `kind`'s message thread, then return to `kind`.
    ToolRunner(AgentKind),
    /// Hand control to the node named by `state.communication.to`.
    Route(AgentKind),
    /// The current node produced neither a tool call nor its expected
    /// structured field; re-run it so it can recover (stall recovery).
    SelfLoop(AgentKind),
    Terminal,
}

/// Whether the graph should stop: a token budget was blown, or the
/// planner's final result passed its guard (see
/// [`crate::planner::apply_planner_output`], which only ever sets
/// `state.final_result` once `all_plan_items_done` and
/// `!any_event_needs_verification` both hold).
pub fn is_terminal(state: &AgentState) -> bool {
    state.final_result.is_some() || state.token_usage > budget_for(state.current_agent)
}

pub fn route(state: &AgentState) -> NextStep {
    if is_terminal(state) {
        return NextStep::Terminal;
    }
    if state.pending_tool_call.is_some() {
        return NextStep::ToolRunner(state.current_agent);
    }
    if let Some(comm) = &state.communication {
        return NextStep::Route(comm.to.node());
    }
    NextStep::SelfLoop(state.current_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Communication, RouteTarget};
    use labeling_types::ToolCall;
    use serde_json::json;

    #[test]
    fn exceeding_budget_terminates_regardless_of_communication() {
        let mut state = AgentState::new();
        state.current_agent = AgentKind::Planner;
        state.token_usage = PLANNER_TOKEN_BUDGET + 1;
        state.communication = Some(Communication {
            from: AgentKind::Planner,
            to: RouteTarget::Identification,
            message: "go".into(),
        });
        assert_eq!(route(&state), NextStep::Terminal);
    }

    #[test]
    fn identifier_budget_is_four_times_planner_budget() {
        let mut state = AgentState::new();
        state.current_agent = AgentKind::Identifier;
        state.token_usage = PLANNER_TOKEN_BUDGET + 1;
        assert_eq!(route(&state), NextStep::SelfLoop(AgentKind::Identifier));
        state.token_usage = IDENTIFIER_VALIDATOR_TOKEN_BUDGET + 1;
        assert_eq!(route(&state), NextStep::Terminal);
    }

    #[test]
    fn pending_tool_call_wins_over_communication() {
        let mut state = AgentState::new();
        state.pending_tool_call = Some(ToolCall {
            id: "1".into(),
            name: "plot_all".into(),
            arguments: json!({}),
        });
        state.communication = Some(Communication {
            from: AgentKind::Planner,
            to: RouteTarget::Identification,
            message: "go".into(),
        });
        assert_eq!(route(&state), NextStep::ToolRunner(AgentKind::Planner));
    }

    #[test]
    fn communication_routes_to_named_target() {
        let mut state = AgentState::new();
        state.communication = Some(Communication {
            from: AgentKind::Planner,
            to: RouteTarget::Verification,
            message: "verify t1".into(),
        });
        assert_eq!(route(&state), NextStep::Route(AgentKind::Validator));
    }

    #[test]
    fn no_communication_and_no_tool_call_self_loops() {
        let mut state = AgentState::new();
        state.current_agent = AgentKind::Identifier;
        assert_eq!(route(&state), NextStep::SelfLoop(AgentKind::Identifier));
    }

    #[test]
    fn final_result_terminates_even_under_budget() {
        let mut state = AgentState::new();
        state.final_result = Some(crate::state::FinalResult {
            summary: "done".into(),
            total_events: 3,
        });
        assert_eq!(route(&state), NextStep::Terminal);
    }
}
