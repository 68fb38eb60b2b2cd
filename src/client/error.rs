//! Upstream client errors

use crate::error::{BridgeErrorTrait, ErrorCategory};
use thiserror::Error;

/// Why the upstream could not serve a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableCause {
    /// Request exceeded the client timeout
    Timeout,

    /// Upstream answered with a non-2xx status other than 401/403
    Status { status: u16, body: String },

    /// Connection, DNS or TLS failure
    Transport(String),

    /// Response body was not the JSON we expected
    InvalidBody(String),
}

impl std::fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Status { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            Self::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::InvalidBody(msg) => write!(f, "invalid response body: {msg}"),
        }
    }
}

/// Upstream client errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Timeout, transport or HTTP failure; retried on the next poll
    #[error("upstream unavailable: {cause}")]
    Unavailable { cause: UnavailableCause },

    /// 401/403 from the upstream; the credentials need re-entering
    #[error("upstream rejected credentials (HTTP {status})")]
    AuthenticationRejected { status: u16 },
}

impl UpstreamError {
    pub fn timeout() -> Self {
        Self::Unavailable {
            cause: UnavailableCause::Timeout,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Unavailable {
            cause: UnavailableCause::Status {
                status,
                body: body.into(),
            },
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Unavailable {
            cause: UnavailableCause::Transport(msg.into()),
        }
    }

    pub fn invalid_body(msg: impl Into<String>) -> Self {
        Self::Unavailable {
            cause: UnavailableCause::InvalidBody(msg.into()),
        }
    }

    /// True for every variant except authentication rejection
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout()
        } else if err.is_decode() {
            Self::invalid_body(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

impl BridgeErrorTrait for UpstreamError {
    fn is_recoverable(&self) -> bool {
        self.is_unavailable()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Unavailable { .. } => ErrorCategory::Network,
            Self::AuthenticationRejected { .. } => ErrorCategory::Auth,
        }
    }
}
