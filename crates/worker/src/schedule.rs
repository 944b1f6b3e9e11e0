//! Run triggering: a single run, or one run per period until cancelled.
//!
//! Runs never overlap. The loop awaits the next tick only after the current
//! run has finished, and ticks missed during a long run are skipped rather
//! than replayed back to back.

use std::path::Path;
use std::time::Duration;

use pm25_core::scripting::executor::NotebookRunner;
use pm25_pipeline::driver::{CompletedRun, DailyPipeline};
use pm25_pipeline::publisher::Publisher;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Perform one run, then log its report and persist it to `report_path`.
///
/// Failing to write the report is logged and otherwise ignored; the run
/// outcome is what the caller acts on.
pub async fn run_once<N, P>(
    pipeline: &DailyPipeline<N, P>,
    report_path: Option<&Path>,
) -> CompletedRun
where
    N: NotebookRunner,
    P: Publisher,
{
    let run = pipeline.run().await;

    match run.report.to_json() {
        Ok(json) => tracing::info!(run_id = %run.report.run_id, report = %json, "Run report"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize run report"),
    }

    if let Some(path) = report_path {
        if let Err(e) = run.report.write_to(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write run report");
        }
    }

    run
}

/// Run immediately, then once every `period`, until `cancel` fires.
///
/// A failed run does not stop the loop; the next tick is the retry. Returns
/// the number of runs performed.
pub async fn run_schedule<N, P>(
    pipeline: &DailyPipeline<N, P>,
    period: Duration,
    report_path: Option<&Path>,
    cancel: CancellationToken,
) -> u64
where
    N: NotebookRunner,
    P: Publisher,
{
    tracing::info!(period_secs = period.as_secs(), "Pipeline schedule started");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut runs = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(runs, "Pipeline schedule stopping");
                break;
            }
            _ = interval.tick() => {
                let run = run_once(pipeline, report_path).await;
                runs += 1;
                if run.report.succeeded() {
                    tracing::info!(run_id = %run.report.run_id, runs, "Scheduled run succeeded");
                } else {
                    tracing::warn!(
                        run_id = %run.report.run_id,
                        runs,
                        "Scheduled run failed; retrying at next tick",
                    );
                }
            }
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use pm25_core::git::GitError;
    use pm25_core::run_state::RunState;
    use pm25_core::scripting::executor::{NotebookRun, ScriptError, ScriptInput};
    use pm25_core::types::NotebookRef;
    use pm25_pipeline::driver::PipelinePlan;
    use pm25_pipeline::publisher::PublishOutcome;

    use super::*;

    struct CountingRunner {
        fail: bool,
    }

    impl NotebookRunner for CountingRunner {
        async fn run(
            &self,
            notebook: &NotebookRef,
            _input: ScriptInput,
        ) -> Result<NotebookRun, ScriptError> {
            if self.fail {
                return Err(ScriptError::ExecutionFailed {
                    program: "ipython".to_string(),
                    exit_code: 1,
                    stderr: "boom".to_string(),
                });
            }
            Ok(NotebookRun {
                notebook: notebook.name(),
                duration_ms: 1,
            })
        }
    }

    /// Cancels the schedule once it has been asked to publish `stop_after` times.
    struct StoppingPublisher {
        calls: AtomicU32,
        stop_after: u32,
        cancel: CancellationToken,
    }

    impl Publisher for StoppingPublisher {
        async fn publish(&self, _artifacts: &Path) -> Result<PublishOutcome, GitError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.stop_after {
                self.cancel.cancel();
            }
            Ok(PublishOutcome::NoChanges)
        }
    }

    fn plan(dir: &Path) -> PipelinePlan {
        let feature = dir.join("2_feature_pipeline.ipynb");
        let inference = dir.join("4_batch_inference.ipynb");
        std::fs::write(&feature, "{}").expect("write");
        std::fs::write(&inference, "{}").expect("write");
        PipelinePlan {
            feature_notebook: NotebookRef::new(feature),
            inference_notebook: NotebookRef::new(inference),
            output_dir: dir.join("models"),
            work_dir: dir.to_path_buf(),
            run_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn once_writes_the_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let publisher = StoppingPublisher {
            calls: AtomicU32::new(0),
            stop_after: u32::MAX,
            cancel: CancellationToken::new(),
        };
        let pipeline = DailyPipeline::new(plan(dir.path()), CountingRunner { fail: false }, publisher);
        let report_path: PathBuf = dir.path().join("report.json");

        let run = run_once(&pipeline, Some(&report_path)).await;

        assert_eq!(run.report.state, RunState::Done);
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report_path).expect("read"))
                .expect("parse");
        assert_eq!(json["state"], "done");
        assert_eq!(json["publish"]["status"], "no_changes");
    }

    #[tokio::test]
    async fn unwritable_report_path_does_not_fail_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let publisher = StoppingPublisher {
            calls: AtomicU32::new(0),
            stop_after: u32::MAX,
            cancel: CancellationToken::new(),
        };
        let pipeline = DailyPipeline::new(plan(dir.path()), CountingRunner { fail: false }, publisher);
        let report_path = dir.path().join("missing").join("report.json");

        let run = run_once(&pipeline, Some(&report_path)).await;

        assert!(run.report.succeeded());
        assert!(!report_path.exists());
    }

    #[tokio::test]
    async fn schedule_repeats_until_cancelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cancel = CancellationToken::new();
        let publisher = StoppingPublisher {
            calls: AtomicU32::new(0),
            stop_after: 3,
            cancel: cancel.clone(),
        };
        let pipeline = DailyPipeline::new(plan(dir.path()), CountingRunner { fail: false }, publisher);

        let runs = tokio::time::timeout(
            Duration::from_secs(10),
            run_schedule(&pipeline, Duration::from_millis(20), None, cancel),
        )
        .await
        .expect("schedule stops");

        assert_eq!(runs, 3);
        assert_eq!(pipeline.publisher().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_runs_do_not_stop_the_schedule() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cancel = CancellationToken::new();
        let publisher = StoppingPublisher {
            calls: AtomicU32::new(0),
            stop_after: u32::MAX,
            cancel: cancel.clone(),
        };
        let pipeline = DailyPipeline::new(plan(dir.path()), CountingRunner { fail: true }, publisher);

        let stopper = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                cancel.cancel();
            })
        };
        let runs = run_schedule(&pipeline, Duration::from_millis(20), None, cancel).await;
        stopper.await.expect("join");

        assert!(runs >= 2, "expected repeated attempts, got {runs}");
        assert_eq!(pipeline.publisher().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let publisher = StoppingPublisher {
            calls: AtomicU32::new(0),
            stop_after: u32::MAX,
            cancel: cancel.clone(),
        };
        let pipeline = DailyPipeline::new(plan(dir.path()), CountingRunner { fail: false }, publisher);

        let runs = run_schedule(&pipeline, Duration::from_secs(3600), None, cancel).await;

        assert_eq!(runs, 0);
    }
}
