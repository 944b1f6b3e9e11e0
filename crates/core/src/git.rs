//! Thin async wrapper around the `git` command line.
//!
//! Every command runs with an explicit working directory; nothing here
//! changes the process-wide current directory. Any secret embedded in the
//! remote URL is scrubbed from error messages.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::scripting::executor::{ScriptError, ScriptInput, ScriptOutput};
use crate::scripting::subprocess;

const REDACTED: &str = "***";

/// Error type for git operations.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git {command} failed (exit code {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("git {command} returned unexpected exit code {exit_code}: {stderr}")]
    UnexpectedStatus {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("git process error: {0}")]
    Process(#[from] ScriptError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where to clone from and push to.
#[derive(Clone)]
pub struct RemoteSpec {
    url: String,
    secret: Option<String>,
}

impl RemoteSpec {
    /// Token-authenticated HTTPS remote:
    /// `https://<token>:x-oauth-basic@<host>/<repository>.git`.
    pub fn authenticated(host: &str, repository: &str, token: &str) -> Self {
        Self {
            url: format!("https://{token}:x-oauth-basic@{host}/{repository}.git"),
            secret: Some(token.to_string()),
        }
    }

    /// Remote URL or path used as-is, with no credential.
    pub fn plain(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            secret: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Replace every occurrence of the credential in `text`.
    pub fn redact(&self, text: &str) -> String {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => text.replace(secret, REDACTED),
            _ => text.to_string(),
        }
    }
}

impl fmt::Debug for RemoteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSpec")
            .field("url", &self.redact(&self.url))
            .finish()
    }
}

/// A local working copy.
#[derive(Debug)]
pub struct GitRepo {
    dir: PathBuf,
    timeout: Duration,
    remote: Option<RemoteSpec>,
}

impl GitRepo {
    /// Open an existing working copy without touching the remote.
    pub fn open(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
            remote: None,
        }
    }

    /// Clone `remote` into `dest`, which must not exist yet.
    ///
    /// With `branch` set, only that branch is fetched.
    pub async fn clone_into(
        remote: &RemoteSpec,
        branch: Option<&str>,
        dest: &Path,
        timeout: Duration,
    ) -> Result<Self, GitError> {
        let parent = dest.parent().unwrap_or(Path::new("."));
        let mut args = vec!["clone".to_string()];
        if let Some(branch) = branch {
            args.extend(["--branch".to_string(), branch.to_string(), "--single-branch".to_string()]);
        }
        args.push(remote.url().to_string());
        args.push(dest.to_string_lossy().into_owned());

        tracing::info!(remote = ?remote, dest = %dest.display(), "Cloning repository");
        run_git(parent, &args, timeout, Some(remote)).await?;

        Ok(Self {
            dir: dest.to_path_buf(),
            timeout,
            remote: Some(remote.clone()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    async fn git(&self, args: &[&str]) -> Result<ScriptOutput, GitError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        run_git(&self.dir, &args, self.timeout, self.remote.as_ref()).await
    }

    /// Set the committer identity for this working copy only.
    pub async fn configure_identity(&self, email: &str, name: &str) -> Result<(), GitError> {
        self.git(&["config", "user.email", email]).await?;
        self.git(&["config", "user.name", name]).await?;
        Ok(())
    }

    pub async fn add(&self, pathspec: &str) -> Result<(), GitError> {
        self.git(&["add", pathspec]).await.map(|_| ())
    }

    /// Whether the index differs from `HEAD`.
    ///
    /// `git diff --staged --quiet` exits 0 when there are no differences and
    /// 1 when there are; any other code is an error.
    pub async fn has_staged_changes(&self) -> Result<bool, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(["diff", "--staged", "--quiet"]);
        let output = subprocess::run_captured(&mut cmd, &self.input()).await?;
        match output.exit_code {
            0 => Ok(false),
            1 => Ok(true),
            exit_code => Err(GitError::UnexpectedStatus {
                command: "diff --staged --quiet".to_string(),
                exit_code,
                stderr: self.scrub(output.stderr.trim()),
            }),
        }
    }

    pub async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.git(&["commit", "-m", message]).await.map(|_| ())
    }

    /// Push the current branch to `origin`.
    pub async fn push(&self) -> Result<(), GitError> {
        self.git(&["push", "origin", "HEAD"]).await.map(|_| ())
    }

    /// Full hash of `HEAD`.
    pub async fn head(&self) -> Result<String, GitError> {
        let output = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(output.stdout.trim().to_string())
    }

    fn input(&self) -> ScriptInput {
        git_input(&self.dir, self.timeout)
    }

    fn scrub(&self, text: &str) -> String {
        match &self.remote {
            Some(remote) => remote.redact(text),
            None => text.to_string(),
        }
    }
}

fn git_input(dir: &Path, timeout: Duration) -> ScriptInput {
    let mut input = ScriptInput::new(timeout).in_dir(dir);
    // Never block waiting for credentials on a terminal.
    input
        .env_vars
        .push(("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()));
    input
}

/// Run `git <args>` in `dir`, failing on a non-zero exit.
async fn run_git(
    dir: &Path,
    args: &[String],
    timeout: Duration,
    remote: Option<&RemoteSpec>,
) -> Result<ScriptOutput, GitError> {
    let scrub = |text: &str| match remote {
        Some(remote) => remote.redact(text),
        None => text.to_string(),
    };

    let mut cmd = Command::new("git");
    cmd.args(args);
    let output = subprocess::run_captured(&mut cmd, &git_input(dir, timeout)).await?;

    if !output.success() {
        return Err(GitError::CommandFailed {
            command: scrub(&args.join(" ")),
            exit_code: output.exit_code,
            stderr: scrub(output.stderr.trim()),
        });
    }

    tracing::debug!(command = %scrub(&args.join(" ")), duration_ms = output.duration_ms, "git ok");
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
