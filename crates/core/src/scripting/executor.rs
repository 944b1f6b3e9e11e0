//! Shared process execution types and the notebook runner seam.
//!
//! Defines [`NotebookRunner`], the trait the pipeline driver depends on,
//! along with [`ScriptInput`], [`ScriptOutput`], [`StreamOutcome`], and
//! [`ScriptError`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::types::NotebookRef;

/// Process settings shared by every subprocess invocation.
#[derive(Debug, Clone)]
pub struct ScriptInput {
    /// Additional environment variables set for the child process.
    pub env_vars: Vec<(String, String)>,
    /// Working directory for the child process (inherits the parent's if `None`).
    pub working_directory: Option<PathBuf>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
}

impl ScriptInput {
    pub fn new(timeout: Duration) -> Self {
        Self {
            env_vars: Vec::new(),
            working_directory: None,
            timeout,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Captured output from a buffered process execution.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Which pipe a streamed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One line of child output, delivered as soon as it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLine {
    pub kind: StreamKind,
    pub text: String,
}

/// Result of a streamed process execution.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Last lines written to stderr, oldest first.
    pub stderr_tail: Vec<String>,
}

impl StreamOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Summary of one completed notebook execution.
#[derive(Debug, Clone, Serialize)]
pub struct NotebookRun {
    pub notebook: String,
    pub duration_ms: u64,
}

/// Errors that can occur while running an external process.
#[derive(Debug)]
pub enum ScriptError {
    /// The program could not be started (not installed, not executable, ...).
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// The process exceeded its configured timeout and was killed.
    Timeout {
        program: String,
        elapsed_ms: u64,
    },
    /// The process ran but exited with a non-zero exit code.
    ExecutionFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },
    /// The converter reported success but produced no script.
    MissingOutput(PathBuf),
    /// An I/O error occurred while communicating with the process.
    IoError(std::io::Error),
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { program, source } => write!(f, "Failed to start {program}: {source}"),
            Self::Timeout {
                program,
                elapsed_ms,
            } => write!(f, "{program} timed out after {elapsed_ms}ms"),
            Self::ExecutionFailed {
                program,
                exit_code,
                stderr,
            } => {
                if stderr.is_empty() {
                    write!(f, "{program} failed with exit code {exit_code}")
                } else {
                    write!(f, "{program} failed with exit code {exit_code}: {stderr}")
                }
            }
            Self::MissingOutput(path) => {
                write!(f, "Expected converted script at {}", path.display())
            }
            Self::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::IoError(err) => Some(err),
            _ => None,
        }
    }
}

/// Executes a notebook to completion with its output streamed live.
///
/// A notebook either fully succeeds or the call returns an error; there is
/// no partial result.
pub trait NotebookRunner: Send + Sync {
    fn run(
        &self,
        notebook: &NotebookRef,
        input: ScriptInput,
    ) -> impl std::future::Future<Output = Result<NotebookRun, ScriptError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
