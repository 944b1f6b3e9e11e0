//! Pre-flight checks run before any notebook executes.
//!
//! A run must not allocate resources or start processes until every
//! required notebook is present on disk.

use std::path::PathBuf;

use crate::types::NotebookRef;

/// Error type for pre-flight checks.
#[derive(Debug, thiserror::Error)]
pub enum SanityError {
    #[error("Required file {} does not exist", path.display())]
    MissingNotebook { path: PathBuf },

    #[error("Required file {} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    #[error("Cannot inspect required file {}: {source}", path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Confirm that every notebook in `required` exists as a regular file.
///
/// Paths are checked in order and the first missing one is reported.
pub fn check_notebooks(required: &[NotebookRef]) -> Result<(), SanityError> {
    tracing::info!(count = required.len(), "Ensure notebook files exist");

    for notebook in required {
        let path = notebook.path();
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(SanityError::NotAFile {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SanityError::MissingNotebook {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(SanityError::Inaccessible {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    tracing::info!("All required files found");
    Ok(())
}
