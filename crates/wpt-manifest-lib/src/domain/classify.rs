use std::path::PathBuf;
use thiserror::Error;

use super::{ItemError, ManifestItem};

/// Errors raised while classifying a single file
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to read test file: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build item for {path}")]
    Item {
        path: String,
        #[source]
        source: ItemError,
    },

    #[error("invalid regex pattern")]
    Regex(#[from] regex::Error),
}

/// Trait for turning a tests-root relative path into manifest items
pub trait Classifier {
    /// Classify the file at `rel_path`.
    ///
    /// Returns `Ok(None)` if there is no file at `rel_path`, and an empty list
    /// if the file exists but is not a test.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or yields an invalid item.
    fn classify(&self, rel_path: &str) -> Result<Option<Vec<ManifestItem>>, ClassifyError>;

    /// Whether a file currently exists at `rel_path`.
    fn exists(&self, rel_path: &str) -> bool;
}
