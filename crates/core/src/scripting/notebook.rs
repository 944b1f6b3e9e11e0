//! Notebook executor.
//!
//! Converts a notebook to a plain script with the converter tool, then runs
//! that script through the interpreter with its output streamed line by
//! line. The converted script lives in a private scratch directory that is
//! removed when the run ends, whatever the outcome.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::process::Command;

use super::executor::{
    NotebookRun, NotebookRunner, ScriptError, ScriptInput, StreamKind, StreamLine,
};
use super::subprocess;
use crate::types::NotebookRef;

/// A program plus leading arguments, e.g. `python -m jupyter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Split a whitespace-separated command line. Returns `None` when empty.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// The converter and interpreter used to execute notebooks.
#[derive(Debug, Clone)]
pub struct NotebookToolchain {
    /// Invoked as `<converter> nbconvert --to python --output-dir <dir> --output <name> <notebook>`.
    pub converter: ToolCommand,
    /// Invoked as `<interpreter> --no-banner --no-confirm-exit -c "%run <script>"`.
    pub interpreter: ToolCommand,
}

impl Default for NotebookToolchain {
    fn default() -> Self {
        Self {
            converter: ToolCommand {
                program: "jupyter".to_string(),
                args: Vec::new(),
            },
            interpreter: ToolCommand {
                program: "ipython".to_string(),
                args: Vec::new(),
            },
        }
    }
}

/// Executor for notebooks using a convert-then-interpret toolchain.
pub struct NotebookExecutor {
    toolchain: NotebookToolchain,
    /// Parent directory for per-run scratch directories (system temp dir if `None`).
    scratch_root: Option<PathBuf>,
}

impl NotebookExecutor {
    pub fn new(toolchain: NotebookToolchain) -> Self {
        Self {
            toolchain,
            scratch_root: None,
        }
    }

    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nbrun-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// Convert `notebook` into a script inside `scratch`, returning its path.
    pub async fn convert(
        &self,
        notebook: &NotebookRef,
        scratch: &Path,
        input: &ScriptInput,
    ) -> Result<PathBuf, ScriptError> {
        let name = format!("{}_run", notebook.name());
        let mut cmd = self.toolchain.converter.command();
        cmd.args(["nbconvert", "--to", "python", "--output-dir"])
            .arg(scratch)
            .arg("--output")
            .arg(&name)
            .arg(notebook.path());

        let output = subprocess::run_captured(&mut cmd, input).await?;
        if !output.success() {
            return Err(ScriptError::ExecutionFailed {
                program: self.toolchain.converter.program.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let script = scratch.join(format!("{name}.py"));
        if !script.is_file() {
            return Err(ScriptError::MissingOutput(script));
        }
        Ok(script)
    }

    /// Run a converted script, forwarding its output as it is produced.
    pub async fn interpret(&self, script: &Path, input: &ScriptInput) -> Result<u64, ScriptError> {
        let mut cmd = self.toolchain.interpreter.command();
        cmd.args(["--no-banner", "--no-confirm-exit", "-c"])
            .arg(format!("%run \"{}\"", script.display()));

        let outcome = subprocess::run_streaming(&mut cmd, input, echo_line).await?;
        if !outcome.success() {
            return Err(ScriptError::ExecutionFailed {
                program: self.toolchain.interpreter.program.clone(),
                exit_code: outcome.exit_code,
                stderr: outcome.stderr_tail.join("\n"),
            });
        }
        Ok(outcome.duration_ms)
    }
}

impl NotebookRunner for NotebookExecutor {
    async fn run(
        &self,
        notebook: &NotebookRef,
        input: ScriptInput,
    ) -> Result<NotebookRun, ScriptError> {
        let rule = "=".repeat(80);
        println!("\n{rule}\nRunning notebook: {notebook}\n{rule}\n");
        tracing::info!(notebook = %notebook.name(), "Notebook started");

        let scratch = self.scratch_dir().map_err(ScriptError::IoError)?;
        let result = match self.convert(notebook, scratch.path(), &input).await {
            Ok(script) => self.interpret(&script, &input).await,
            Err(e) => Err(e),
        };

        // Explicit close so a failed removal is at least visible in the log.
        if let Err(e) = scratch.close() {
            tracing::warn!(notebook = %notebook.name(), error = %e, "Failed to remove scratch directory");
        }

        let duration_ms = result?;
        println!("\n{rule}\nFinished notebook: {notebook}\n{rule}\n");
        tracing::info!(notebook = %notebook.name(), duration_ms, "Notebook finished");

        Ok(NotebookRun {
            notebook: notebook.name(),
            duration_ms,
        })
    }
}

fn echo_line(line: StreamLine) {
    match line.kind {
        StreamKind::Stdout => println!("{}", line.text),
        StreamKind::Stderr => eprintln!("{}", line.text),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
