//! Unified error handling for the flowhome-bridge crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`BridgeErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use flowhome_bridge::error::{BridgeErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying on next poll: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::client::error::{UnavailableCause, UpstreamError};
pub use crate::endpoint::EndpointError;
pub use crate::webhooks::dispatcher::DispatchError;
pub use crate::webhooks::store::StorageError;

/// Common trait for all flowhome-bridge error types
pub trait BridgeErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed connection input
    Endpoint,
    /// Upstream unreachable, timed out, or answered with an error status
    Network,
    /// Upstream rejected the configured credentials
    Auth,
    /// Persisted webhook state could not be read or written
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short machine-readable label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Endpoint => "invalid_endpoint",
            Self::Network => "cannot_connect",
            Self::Auth => "invalid_auth",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the flowhome-bridge crate
#[derive(Error, Debug)]
pub enum Error {
    /// Connection input could not be resolved to an endpoint
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// Upstream request failed
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Webhook persistence failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Inbound dispatcher refused a binding
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BridgeErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Endpoint(_) => false,
            Self::Upstream(e) => e.is_recoverable(),
            Self::Storage(_) => true,
            Self::Dispatch(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Endpoint(_) => ErrorCategory::Endpoint,
            Self::Upstream(e) => e.category(),
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Dispatch(_) => ErrorCategory::Other,
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let timeout = Error::Upstream(UpstreamError::timeout());
        assert_eq!(timeout.category(), ErrorCategory::Network);

        let auth = Error::Upstream(UpstreamError::AuthenticationRejected { status: 401 });
        assert_eq!(auth.category(), ErrorCategory::Auth);

        let endpoint = Error::Endpoint(EndpointError::Empty);
        assert_eq!(endpoint.category(), ErrorCategory::Endpoint);
    }

    #[test]
    fn test_is_recoverable() {
        let timeout = Error::Upstream(UpstreamError::timeout());
        assert!(timeout.is_recoverable());

        let auth = Error::Upstream(UpstreamError::AuthenticationRejected { status: 403 });
        assert!(!auth.is_recoverable());

        let endpoint = Error::Endpoint(EndpointError::MissingHost("http://".to_string()));
        assert!(!endpoint.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let upstream = UpstreamError::timeout();
        let unified: Error = upstream.into();
        assert!(matches!(unified, Error::Upstream(_)));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("poll interval must be positive");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(ErrorCategory::Network.to_string(), "cannot_connect");
        assert_eq!(ErrorCategory::Auth.to_string(), "invalid_auth");
    }
}
