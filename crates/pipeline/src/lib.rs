//! `pm25-pipeline` -- one daily run, end to end.
//!
//! [`driver::DailyPipeline`] sequences the sanity check, both notebooks and
//! the publish step behind the [`pm25_core::scripting::executor::NotebookRunner`]
//! and [`publisher::Publisher`] seams.

pub mod driver;
pub mod error;
pub mod publisher;
pub mod report;
