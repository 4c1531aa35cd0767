//! Error types for the transfer engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

use super::types::TransferSummary;

/// Errors that can occur while moving files to or from storage.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A local file could not be uploaded.
    #[error("Failed to upload {}: {source}", path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    /// A blob could not be downloaded to its local path.
    #[error("Failed to download {blob} to {}: {source}", path.display())]
    Download {
        blob: String,
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    /// The container listing needed for a download failed.
    #[error("Failed to list container {container}: {source}")]
    Listing {
        container: String,
        #[source]
        source: StorageError,
    },

    /// Local file system preparation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more transfers in a batch exhausted their retries.
    #[error("{failed} of {total} transfers failed; first: {first}")]
    Batch {
        failed: usize,
        total: usize,
        /// Transfers that did complete before the batch was reported.
        completed: TransferSummary,
        first: Box<TransferError>,
    },
}

impl TransferError {
    /// Local path involved in the failure, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Upload { path, .. } | Self::Download { path, .. } | Self::Io { path, .. } => {
                Some(path)
            }
            Self::Listing { .. } => None,
            Self::Batch { first, .. } => first.path(),
        }
    }

    /// Files and bytes that were moved despite the failure.
    pub fn completed(&self) -> TransferSummary {
        match self {
            Self::Batch { completed, .. } => *completed,
            _ => TransferSummary::default(),
        }
    }
}
