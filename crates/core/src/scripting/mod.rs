//! External process orchestration.
//!
//! Provides the shared subprocess runner (buffered and streamed), the
//! [`executor::NotebookRunner`] seam, and the convert-then-interpret
//! notebook executor.

pub mod executor;
pub mod notebook;
pub mod subprocess;
