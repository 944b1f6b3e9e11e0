//! `pm25-worker` -- daily PM2.5 forecast pipeline runner.
//!
//! Refreshes air-quality features, runs batch inference and publishes the
//! resulting forecast images to the results repository. See
//! [`pm25_worker::config::PipelineConfig::from_env`] for the full list of
//! environment variables.
//!
//! # Environment variables (most common)
//!
//! | Variable          | Required | Default    | Description                              |
//! |-------------------|----------|------------|------------------------------------------|
//! | `GITHUB_PAT`      | yes      | --         | Token used to push to the results repo   |
//! | `RUN_MODE`        | no       | `schedule` | `once` runs a single pass and exits      |
//! | `RUN_PERIOD_SECS` | no       | `86400`    | Seconds between scheduled runs           |
//! | `LOG_FORMAT`      | no       | text       | `json` switches to JSON log lines        |

use std::process::ExitCode;

use anyhow::Context;
use pm25_core::scripting::notebook::NotebookExecutor;
use pm25_pipeline::driver::DailyPipeline;
use pm25_pipeline::publisher::GitPublisher;
use pm25_worker::config::{PipelineConfig, RunMode};
use pm25_worker::schedule;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "pm25-worker exiting");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pm25_worker=info,pm25_pipeline=info,pm25_core=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn run() -> anyhow::Result<ExitCode> {
    let config = PipelineConfig::from_env().context("invalid configuration")?;

    tracing::info!(
        mode = ?config.mode,
        feature_notebook = %config.plan.feature_notebook,
        inference_notebook = %config.plan.inference_notebook,
        output_dir = %config.plan.output_dir.display(),
        remote = ?config.publish.remote,
        run_timeout_secs = config.plan.run_timeout.as_secs(),
        "Starting pm25-worker",
    );

    let PipelineConfig {
        plan,
        toolchain,
        publish,
        mode,
        period,
        report_path,
    } = config;
    let pipeline = DailyPipeline::new(
        plan,
        NotebookExecutor::new(toolchain),
        GitPublisher::new(publish),
    );

    match mode {
        RunMode::Once => {
            let run = schedule::run_once(&pipeline, report_path.as_deref()).await;
            Ok(if run.report.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        RunMode::Schedule => {
            let cancel = CancellationToken::new();
            tokio::spawn(stop_on_signal(cancel.clone()));
            schedule::run_schedule(&pipeline, period, report_path.as_deref(), cancel).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Cancel the schedule on SIGINT, or SIGTERM on Unix.
async fn stop_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), stopping after the current run"),
        () = terminate => tracing::info!("Received SIGTERM, stopping after the current run"),
    }
    cancel.cancel();
}
