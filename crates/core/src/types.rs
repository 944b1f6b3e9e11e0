use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// A path naming one notebook to execute.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotebookRef {
    path: PathBuf,
}

impl NotebookRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem of the notebook (`2_feature_pipeline` for
    /// `/root/notebooks/2_feature_pipeline.ipynb`).
    ///
    /// Falls back to the full path when there is no stem.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for NotebookRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_file_stem() {
        let nb = NotebookRef::new("/root/notebooks/2_feature_pipeline.ipynb");
        assert_eq!(nb.name(), "2_feature_pipeline");
    }

    #[test]
    fn name_falls_back_to_path() {
        let nb = NotebookRef::new("/");
        assert_eq!(nb.name(), "/");
    }

    #[test]
    fn display_is_path() {
        let nb = NotebookRef::new("notebooks/4_batch_inference.ipynb");
        assert_eq!(nb.to_string(), "notebooks/4_batch_inference.ipynb");
    }
}
