//! Run lifecycle state machine.
//!
//! A run walks a fixed forward chain; any step may collapse it into the
//! absorbing `Failed` state.
//!
//! ```text
//! Start -> SanityChecked -> FeaturesBuilt -> InferenceRun -> Published -> Done
//!   \_____________\______________\______________\_____________\-> Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    SanityChecked,
    FeaturesBuilt,
    InferenceRun,
    Published,
    Done,
    Failed,
}

impl RunState {
    /// The state that follows `self` on success, or `None` for terminal states.
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Start => Some(RunState::SanityChecked),
            RunState::SanityChecked => Some(RunState::FeaturesBuilt),
            RunState::FeaturesBuilt => Some(RunState::InferenceRun),
            RunState::InferenceRun => Some(RunState::Published),
            RunState::Published => Some(RunState::Done),
            RunState::Done | RunState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Start => "Start",
            RunState::SanityChecked => "SanityChecked",
            RunState::FeaturesBuilt => "FeaturesBuilt",
            RunState::InferenceRun => "InferenceRun",
            RunState::Published => "Published",
            RunState::Done => "Done",
            RunState::Failed => "Failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: RunState, to: RunState) -> bool {
    if from.is_terminal() {
        return false;
    }
    to == RunState::Failed || from.next() == Some(to)
}

/// Validate a state transition, returning an error for invalid ones.
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), CoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RunState; 7] = [
        RunState::Start,
        RunState::SanityChecked,
        RunState::FeaturesBuilt,
        RunState::InferenceRun,
        RunState::Published,
        RunState::Done,
        RunState::Failed,
    ];

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn forward_chain_reaches_done() {
        let mut state = RunState::Start;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            assert!(can_transition(state, next));
            state = next;
            visited.push(state);
        }
        assert_eq!(state, RunState::Done);
        assert_eq!(visited.len(), 6);
    }

    #[test]
    fn every_non_terminal_state_can_fail() {
        for state in ALL.iter().copied().filter(|s| !s.is_terminal()) {
            assert!(can_transition(state, RunState::Failed), "{state} -> Failed");
        }
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn terminal_states_are_absorbing() {
        for to in ALL {
            assert!(!can_transition(RunState::Done, to));
            assert!(!can_transition(RunState::Failed, to));
        }
    }

    #[test]
    fn cannot_skip_steps() {
        assert!(!can_transition(RunState::Start, RunState::FeaturesBuilt));
        assert!(!can_transition(RunState::SanityChecked, RunState::Published));
        assert!(!can_transition(RunState::InferenceRun, RunState::Done));
    }

    #[test]
    fn cannot_go_backwards() {
        assert!(!can_transition(RunState::Published, RunState::InferenceRun));
        assert!(!can_transition(RunState::FeaturesBuilt, RunState::Start));
    }

    #[test]
    fn validate_reports_both_states() {
        let err = validate_transition(RunState::Start, RunState::Done).unwrap_err();
        assert_eq!(err.to_string(), "Invalid transition: Start -> Done");
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&RunState::SanityChecked).unwrap();
        assert_eq!(json, "\"sanity_checked\"");
    }
}
