use pm25_core::error::CoreError;
use pm25_core::git::GitError;
use pm25_core::run_state::RunState;
use pm25_core::sanity::SanityError;
use pm25_core::scripting::executor::ScriptError;

/// Everything that can stop a run.
///
/// No variant is retried within a run; the next scheduled run is the
/// retry boundary.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// A required notebook is missing. Raised before any side effect.
    #[error(transparent)]
    Sanity(#[from] SanityError),

    /// A notebook could not be run to completion.
    #[error("Notebook {notebook} failed: {source}")]
    Notebook {
        notebook: String,
        #[source]
        source: ScriptError,
    },

    /// Clone, stage, commit or push failed.
    #[error("Publish failed: {0}")]
    Publish(#[from] GitError),

    /// The run budget elapsed while `stage` was in progress.
    #[error("Run timed out during {stage} after {budget_secs}s")]
    Timeout { stage: RunState, budget_secs: u64 },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the pipeline crate.
pub type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn sanity_error_is_transparent() {
        let err = RunError::from(SanityError::MissingNotebook {
            path: PathBuf::from("/root/notebooks/4_batch_inference.ipynb"),
        });
        assert_eq!(
            err.to_string(),
            "Required file /root/notebooks/4_batch_inference.ipynb does not exist"
        );
    }

    #[test]
    fn timeout_names_stage() {
        let err = RunError::Timeout {
            stage: RunState::InferenceRun,
            budget_secs: 3600,
        };
        assert_eq!(err.to_string(), "Run timed out during InferenceRun after 3600s");
    }

    #[test]
    fn notebook_error_keeps_source() {
        let err = RunError::Notebook {
            notebook: "2_feature_pipeline".to_string(),
            source: ScriptError::ExecutionFailed {
                program: "ipython".to_string(),
                exit_code: 1,
                stderr: String::new(),
            },
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("Notebook 2_feature_pipeline failed"));
    }
}
