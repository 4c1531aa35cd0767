//! Error types for the storage module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during object storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Container does not exist.
    #[error("Container not found: {name}")]
    ContainerNotFound { name: String },

    /// Blob does not exist.
    #[error("Blob not found: {container}/{name}")]
    BlobNotFound { container: String, name: String },

    /// Container or blob name is not acceptable to the backend.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Local or backend file access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend is temporarily unavailable.
    #[error("Storage service unavailable: {0}")]
    Unavailable(String),

    /// Access URI could not be produced.
    #[error("Failed to generate access URI: {0}")]
    Signing(String),

    /// A background storage task panicked or was aborted.
    #[error("Storage task failed: {0}")]
    TaskFailed(String),
}

impl StorageError {
    /// Creates an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Io { source, .. } => !matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StorageError::Unavailable("503".into()).is_retryable());
        assert!(StorageError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr")
        )
        .is_retryable());
        assert!(!StorageError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone")
        )
        .is_retryable());
        assert!(!StorageError::ContainerNotFound { name: "c".into() }.is_retryable());
    }

    #[test]
    fn test_error_display_names_path() {
        let err = StorageError::io(
            "/docs/report.docx",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        );
        assert!(err.to_string().contains("/docs/report.docx"));
    }
}
