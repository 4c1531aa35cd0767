//! Transfer engine for moving run files in and out of storage.
//!
//! Uploads and downloads fan out over a semaphore that is local to each call,
//! so concurrent runs never share a transfer budget. A failed transfer does not
//! cancel its siblings: the batch waits for every transfer and then reports one
//! aggregate error.
//!
//! # Example
//!
//! ```ignore
//! use doctr_core::transfer::{RetryConfig, TransferEngine};
//!
//! let engine = TransferEngine::new(storage, RetryConfig::default());
//! let uploaded = engine.upload_all(&files, &set.source, 50).await?;
//! let downloaded = engine.download_all(&target, &out_dir, "es", 50).await?;
//! ```

mod batch;
mod config;
mod error;
mod types;

pub use batch::{with_language_suffix, TransferEngine, DEFAULT_MAX_CONCURRENCY};
pub use config::RetryConfig;
pub use error::TransferError;
pub use types::{Direction, TransferSummary};
