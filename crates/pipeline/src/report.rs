//! Per-run bookkeeping.
//!
//! [`RunReport`] doubles as the run's state tracker: every transition goes
//! through [`RunReport::advance`] or [`RunReport::fail`], which validate it
//! against the run state machine.

use std::path::Path;

use chrono::{DateTime, Utc};
use pm25_core::error::CoreError;
use pm25_core::run_state::{validate_transition, RunState};
use pm25_core::scripting::executor::NotebookRun;
use serde::Serialize;
use uuid::Uuid;

use crate::publisher::PublishOutcome;

/// Time spent reaching one state.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub state: RunState,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Current state; `Done` or `Failed` once the run is over.
    pub state: RunState,
    /// Last state reached successfully.
    pub reached: RunState,
    pub stages: Vec<StageRecord>,
    pub notebooks: Vec<NotebookRun>,
    pub publish: Option<PublishOutcome>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn begin() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Start,
            reached: RunState::Start,
            stages: Vec::new(),
            notebooks: Vec::new(),
            publish: None,
            error: None,
        }
    }

    /// Record a successful transition into `to`.
    pub fn advance(&mut self, to: RunState, duration_ms: u64) -> Result<(), CoreError> {
        validate_transition(self.state, to)?;
        self.state = to;
        self.reached = to;
        self.stages.push(StageRecord {
            state: to,
            duration_ms,
        });
        if to == RunState::Done {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Collapse the run into `Failed`. A no-op on an already terminal run.
    pub fn fail(&mut self, message: impl Into<String>) {
        if validate_transition(self.state, RunState::Failed).is_err() {
            return;
        }
        self.state = RunState::Failed;
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Write the report as pretty JSON to `path`.
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        tokio::fs::write(path, json).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn full_chain_finishes_done() {
        let mut report = RunReport::begin();
        for state in [
            RunState::SanityChecked,
            RunState::FeaturesBuilt,
            RunState::InferenceRun,
            RunState::Published,
            RunState::Done,
        ] {
            report.advance(state, 1).expect("valid transition");
        }
        assert!(report.succeeded());
        assert!(report.finished_at.is_some());
        assert_eq!(report.stages.len(), 5);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut report = RunReport::begin();
        assert_matches!(
            report.advance(RunState::InferenceRun, 0),
            Err(CoreError::InvalidTransition { .. })
        );
        assert_eq!(report.state, RunState::Start);
    }

    #[test]
    fn fail_keeps_last_reached_state() {
        let mut report = RunReport::begin();
        report.advance(RunState::SanityChecked, 0).expect("advance");
        report.fail("notebook exploded");

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.reached, RunState::SanityChecked);
        assert_eq!(report.error.as_deref(), Some("notebook exploded"));
        assert!(!report.succeeded());
    }

    #[test]
    fn failed_is_absorbing() {
        let mut report = RunReport::begin();
        report.fail("first");
        report.fail("second");
        assert_eq!(report.error.as_deref(), Some("first"));
        assert!(report.advance(RunState::SanityChecked, 0).is_err());
    }

    #[test]
    fn json_contains_state_and_run_id() {
        let report = RunReport::begin();
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().expect("json")).expect("parse");
        assert_eq!(json["state"], "start");
        assert_eq!(json["run_id"], report.run_id.to_string());
    }

    #[tokio::test]
    async fn write_to_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        RunReport::begin().write_to(&path).await.expect("write");
        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"run_id\""));
    }
}
