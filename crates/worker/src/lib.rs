//! `pm25-worker` -- runs the daily forecast pipeline once or on a schedule.
//!
//! The binary in `main.rs` wires [`config::PipelineConfig`] into a
//! [`pm25_pipeline::driver::DailyPipeline`] and hands it to [`schedule`].

pub mod config;
pub mod schedule;
