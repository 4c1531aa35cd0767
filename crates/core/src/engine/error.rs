//! Error types for translation engine calls.

use thiserror::Error;

/// Error code the engine reports when it cannot use a signed container URI.
pub const SIGNED_URI_REJECTION_CODE: &str = "InvalidDocumentAccessLevel";

/// Errors that can occur when talking to the translation engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine refused the request with a coded error.
    #[error("{code}: {message}")]
    Rejected {
        status: u16,
        code: String,
        inner_code: Option<String>,
        message: String,
    },

    /// Request timed out.
    #[error("Request timeout")]
    Timeout,

    /// Could not reach the engine.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Engine is throttling or temporarily down.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// Response body could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl EngineError {
    /// Stable code string for reports.
    pub fn code(&self) -> &str {
        match self {
            Self::Rejected { code, .. } => code,
            Self::Timeout => "Timeout",
            Self::ConnectionFailed(_) => "ConnectionFailed",
            Self::Unavailable(_) => "ServiceUnavailable",
            Self::InvalidResponse(_) => "InvalidResponse",
        }
    }

    /// Whether the call may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed(_) | Self::Unavailable(_)
        )
    }

    /// Whether the engine rejected the signed URIs it was given.
    pub fn is_signed_uri_rejection(&self) -> bool {
        match self {
            Self::Rejected {
                code, inner_code, ..
            } => {
                code == SIGNED_URI_REJECTION_CODE
                    || inner_code.as_deref() == Some(SIGNED_URI_REJECTION_CODE)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::Timeout
        } else if e.is_connect() {
            EngineError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            EngineError::InvalidResponse(e.to_string())
        } else {
            EngineError::Unavailable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: &str, inner: Option<&str>) -> EngineError {
        EngineError::Rejected {
            status: 400,
            code: code.to_string(),
            inner_code: inner.map(String::from),
            message: "nope".to_string(),
        }
    }

    #[test]
    fn test_signed_uri_rejection_detection() {
        assert!(
            rejected("InvalidRequest", Some(SIGNED_URI_REJECTION_CODE)).is_signed_uri_rejection()
        );
        assert!(rejected(SIGNED_URI_REJECTION_CODE, None).is_signed_uri_rejection());
        let other_level = rejected("InvalidRequest", Some("InvalidTargetDocumentAccessLevel"));
        assert!(!other_level.is_signed_uri_rejection());
        assert!(!EngineError::Timeout.is_signed_uri_rejection());
    }

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Timeout.is_transient());
        assert!(EngineError::Unavailable("503".into()).is_transient());
        assert!(!rejected("InvalidRequest", None).is_transient());
        assert!(!EngineError::InvalidResponse("bad json".into()).is_transient());
    }

    #[test]
    fn test_display_carries_code_and_message() {
        let err = rejected("UnsupportedLanguageCode", None);
        assert_eq!(err.to_string(), "UnsupportedLanguageCode: nope");
        assert_eq!(err.code(), "UnsupportedLanguageCode");
    }
}
