//! `pm25-core` -- pure domain logic for the daily forecast pipeline.
//!
//! Everything here is free of scheduling and configuration concerns:
//! notebook references, pre-flight checks, the run state machine, and the
//! subprocess plumbing used to drive the notebook toolchain and git.

pub mod error;
pub mod git;
pub mod run_state;
pub mod sanity;
pub mod scripting;
pub mod types;
