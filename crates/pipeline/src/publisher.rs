//! Result publishing.
//!
//! [`GitPublisher`] clones the target repository into a fresh working copy,
//! copies the run's artifacts into it, and commits + pushes only when the
//! staged set differs from `HEAD`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use pm25_core::git::{GitError, GitRepo, RemoteSpec};
use serde::Serialize;

/// Timestamp format used in commit messages.
pub const COMMIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Commit message for artifacts generated at `at`.
pub fn commit_message(at: &DateTime<Local>) -> String {
    format!("Update forecast images - {}", at.format(COMMIT_TIMESTAMP_FORMAT))
}

/// What a publish step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// One commit was created and pushed.
    Pushed { timestamp: String, commit: String },
    /// The staged set matched `HEAD`; nothing was committed or pushed.
    NoChanges,
}

/// Pushes a run's artifacts somewhere durable.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        artifacts: &Path,
    ) -> impl std::future::Future<Output = Result<PublishOutcome, GitError>> + Send;
}

/// Settings for [`GitPublisher`].
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub remote: RemoteSpec,
    /// Branch to clone and push; the remote's default branch if `None`.
    pub branch: Option<String>,
    /// Directory inside the repository that receives the artifacts.
    pub artifact_dir: String,
    pub author_email: String,
    pub author_name: String,
    /// Per-command timeout for git.
    pub command_timeout: Duration,
    /// Parent directory for working copies (system temp dir if `None`).
    pub workspace_root: Option<PathBuf>,
}

pub struct GitPublisher {
    settings: PublishSettings,
}

impl GitPublisher {
    pub fn new(settings: PublishSettings) -> Self {
        Self { settings }
    }

    fn workspace(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("publish-");
        match &self.settings.workspace_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

impl Publisher for GitPublisher {
    async fn publish(&self, artifacts: &Path) -> Result<PublishOutcome, GitError> {
        let s = &self.settings;
        let workspace = self.workspace()?;
        let checkout = workspace.path().join("checkout");

        let repo =
            GitRepo::clone_into(&s.remote, s.branch.as_deref(), &checkout, s.command_timeout)
                .await?;
        repo.configure_identity(&s.author_email, &s.author_name)
            .await?;

        let src = artifacts.to_path_buf();
        let dst = checkout.join(&s.artifact_dir);
        let copied = tokio::task::spawn_blocking(move || copy_dir_all(&src, &dst))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        tracing::info!(files = copied, artifact_dir = %s.artifact_dir, "Artifacts copied into working copy");

        repo.add(&format!("{}/", s.artifact_dir)).await?;

        let generated_at = Local::now();
        let timestamp = generated_at.format(COMMIT_TIMESTAMP_FORMAT).to_string();

        if !repo.has_staged_changes().await? {
            tracing::info!("No changes to commit");
            return Ok(PublishOutcome::NoChanges);
        }

        repo.commit(&commit_message(&generated_at)).await?;
        // Resolved before pushing: once the push lands, nothing may fail the run.
        let commit = repo.head().await?;
        repo.push().await?;

        tracing::info!(%timestamp, %commit, "Successfully pushed images to remote");
        Ok(PublishOutcome::Pushed { timestamp, commit })
    }
}

/// Recursively copy `src` into `dst`, overwriting files. Returns the file count.
fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<u64> {
    std::fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}
