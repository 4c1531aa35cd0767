//! Translation engine abstraction.
//!
//! This module provides the `TranslationEngine` trait for batch document
//! translation services, the request/status/outcome types exchanged with them,
//! and an Azure Document Translation implementation.

mod azure;
mod error;
mod traits;
mod types;

pub use azure::AzureTranslatorClient;
pub use error::{EngineError, SIGNED_URI_REJECTION_CODE};
pub use traits::TranslationEngine;
pub use types::*;
