use crate::run_state::RunState;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: RunState, to: RunState },
}
