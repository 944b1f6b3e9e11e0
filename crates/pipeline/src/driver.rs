//! Daily pipeline driver.
//!
//! Sequences one run:
//!
//! 1. Sanity-check both notebooks (no side effects before this passes).
//! 2. Create the output directory and run the feature notebook.
//! 3. Run the batch-inference notebook.
//! 4. Publish the artifacts.
//!
//! Every step runs under one shared deadline. The first failure collapses
//! the run into `Failed`; later steps never start.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use pm25_core::run_state::RunState;
use pm25_core::sanity;
use pm25_core::scripting::executor::{NotebookRun, NotebookRunner, ScriptInput};
use pm25_core::types::NotebookRef;
use tokio::time::Instant;

use crate::error::{RunError, RunResult};
use crate::publisher::{PublishOutcome, Publisher};
use crate::report::RunReport;

/// Static inputs of a run.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    pub feature_notebook: NotebookRef,
    pub inference_notebook: NotebookRef,
    /// Where the notebooks write models and images.
    pub output_dir: PathBuf,
    /// Working directory handed to the notebook interpreter.
    pub work_dir: PathBuf,
    /// Wall-clock budget for the whole run.
    pub run_timeout: Duration,
}

/// A finished run: the report plus the typed outcome.
#[derive(Debug)]
pub struct CompletedRun {
    pub report: RunReport,
    pub result: RunResult<PublishOutcome>,
}

pub struct DailyPipeline<N, P> {
    plan: PipelinePlan,
    runner: N,
    publisher: P,
}

impl<N, P> DailyPipeline<N, P>
where
    N: NotebookRunner,
    P: Publisher,
{
    pub fn new(plan: PipelinePlan, runner: N, publisher: P) -> Self {
        Self {
            plan,
            runner,
            publisher,
        }
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    pub fn runner(&self) -> &N {
        &self.runner
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Perform one complete run. Never panics on step failure; the failure
    /// is carried in [`CompletedRun::result`].
    pub async fn run(&self) -> CompletedRun {
        let mut report = RunReport::begin();
        tracing::info!(run_id = %report.run_id, "------ Running pipeline ------");

        let deadline = deadline_after(self.plan.run_timeout);
        let result = self.execute(&mut report, deadline).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(run_id = %report.run_id, ?outcome, "Pipeline finished");
            }
            Err(e) => {
                report.fail(e.to_string());
                tracing::error!(
                    run_id = %report.run_id,
                    reached = %report.reached,
                    error = %e,
                    "Pipeline failed",
                );
            }
        }

        CompletedRun { report, result }
    }

    async fn execute(
        &self,
        report: &mut RunReport,
        deadline: Instant,
    ) -> RunResult<PublishOutcome> {
        let plan = &self.plan;

        self.stage(report, RunState::SanityChecked, deadline, async {
            sanity::check_notebooks(&[
                plan.feature_notebook.clone(),
                plan.inference_notebook.clone(),
            ])?;
            Ok::<_, RunError>(())
        })
        .await?;

        let features = self
            .stage(report, RunState::FeaturesBuilt, deadline, async {
                tokio::fs::create_dir_all(&plan.output_dir).await?;
                tracing::info!(dir = %plan.output_dir.display(), "Created output directory");
                self.run_notebook(&plan.feature_notebook, deadline).await
            })
            .await?;
        report.notebooks.push(features);

        let inference = self
            .stage(report, RunState::InferenceRun, deadline, async {
                self.run_notebook(&plan.inference_notebook, deadline).await
            })
            .await?;
        report.notebooks.push(inference);

        let outcome = self
            .stage(report, RunState::Published, deadline, async {
                self.publisher
                    .publish(&plan.output_dir)
                    .await
                    .map_err(RunError::from)
            })
            .await?;
        report.publish = Some(outcome.clone());

        report.advance(RunState::Done, 0)?;
        Ok(outcome)
    }

    /// Run `work` under the shared deadline and record the transition into
    /// `to` once it succeeds.
    async fn stage<T, F>(
        &self,
        report: &mut RunReport,
        to: RunState,
        deadline: Instant,
        work: F,
    ) -> RunResult<T>
    where
        F: Future<Output = RunResult<T>>,
    {
        let started = Instant::now();
        let value = match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(RunError::Timeout {
                    stage: to,
                    budget_secs: self.plan.run_timeout.as_secs(),
                })
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        report.advance(to, elapsed_ms)?;
        tracing::info!(state = %to, elapsed_ms, "Stage complete");
        Ok(value)
    }

    async fn run_notebook(&self, notebook: &NotebookRef, deadline: Instant) -> RunResult<NotebookRun> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let input = ScriptInput::new(remaining).in_dir(&self.plan.work_dir);
        self.runner
            .run(notebook, input)
            .await
            .map_err(|source| RunError::Notebook {
                notebook: notebook.name(),
                source,
            })
    }
}

/// `now + budget`, saturating at a deadline that never fires in practice.
fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Roughly thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
