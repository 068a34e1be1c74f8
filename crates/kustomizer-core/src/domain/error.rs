//! Error taxonomy for the render-and-publish pipeline.
//!
//! Each stage fails with its own variant and the dispatcher hands it back to
//! the transport unchanged, so the variant always names the stage that broke.

use std::path::PathBuf;

/// Errors produced while validating an event or running a pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum KustomizerError {
    #[error("event is missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("event field {field} is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("listing release assets failed: {0}")]
    AssetList(String),

    #[error("downloading asset {asset} failed: {cause}")]
    Download { asset: String, cause: String },

    #[error("cloning {url} failed: {cause}")]
    Clone { url: String, cause: String },

    #[error("pull failed: {0}")]
    Pull(String),

    #[error("tag {name:?} not found")]
    TagNotFound { name: String },

    #[error("checkout of {revision} failed: {cause}")]
    Checkout { revision: String, cause: String },

    #[error("merging trees failed: {0}")]
    Merge(String),

    #[error("manifest build failed: {cause}")]
    Build { cause: String },

    #[error("staging {file} failed: {cause}")]
    Stage { file: String, cause: String },

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("push failed: {0}")]
    Push(String),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KustomizerError {
    /// Whether the error was caused by the event itself rather than a stage.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            KustomizerError::MissingField { .. } | KustomizerError::InvalidField { .. }
        )
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KustomizerError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, KustomizerError>;
