//! Error taxonomy for calls leaving the client.
//!
//! Only terminal outcomes cross the pipeline boundary. Retries, breaker
//! bookkeeping and refresh coordination never surface as errors of their own.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::http::request::TargetKey;

/// Coarse classification of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CircuitOpen,
    SessionExpired,
    Server,
    Client,
    Network,
    Cancelled,
    InvalidRequest,
    Decode,
}

impl ErrorKind {
    /// Stable label used for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Network => "network",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Decode => "decode",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a logical call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Breaker is open for this endpoint; the dependency is still recovering.
    #[error("circuit open for {target}, retry in {}s", .retry_after.as_secs())]
    CircuitOpen {
        target: TargetKey,
        retry_after: Duration,
    },

    /// Token refresh failed or the refreshed token was rejected. Forces logout.
    #[error("session expired: {reason}")]
    SessionExpired { target: TargetKey, reason: String },

    /// 5xx after the retry budget was spent.
    #[error("server error {status} from {target}: {message}")]
    Server {
        target: TargetKey,
        status: u16,
        message: String,
    },

    /// 4xx other than 401. Never retried.
    #[error("request to {target} rejected with {status}: {message}")]
    Client {
        target: TargetKey,
        status: u16,
        message: String,
    },

    /// No response was received (connect failure, reset, timeout).
    #[error("network error calling {target}: {message}")]
    Network { target: TargetKey, message: String },

    /// The chain was abandoned because the client is shutting down.
    #[error("request to {target} cancelled")]
    Cancelled { target: TargetKey },

    /// The request could not be built (bad path, header or body).
    #[error("invalid request for {target}: {message}")]
    InvalidRequest { target: TargetKey, message: String },

    /// A successful response whose body did not have the expected shape.
    #[error("unexpected response body from {target}: {message}")]
    Decode { target: TargetKey, message: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ApiError::SessionExpired { .. } => ErrorKind::SessionExpired,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Client { .. } => ErrorKind::Client,
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Cancelled { .. } => ErrorKind::Cancelled,
            ApiError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            ApiError::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Endpoint the failed chain was addressed to.
    pub fn target(&self) -> &TargetKey {
        match self {
            ApiError::CircuitOpen { target, .. }
            | ApiError::SessionExpired { target, .. }
            | ApiError::Server { target, .. }
            | ApiError::Client { target, .. }
            | ApiError::Network { target, .. }
            | ApiError::Cancelled { target }
            | ApiError::InvalidRequest { target, .. }
            | ApiError::Decode { target, .. } => target,
        }
    }

    /// Short, user-facing message used as the notification dedupe key.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::CircuitOpen { .. } => "Service temporarily unavailable".to_string(),
            ApiError::SessionExpired { .. } => "Your session has expired".to_string(),
            ApiError::Server { message, .. }
            | ApiError::Client { message, .. }
            | ApiError::Network { message, .. }
            | ApiError::InvalidRequest { message, .. } => message.clone(),
            ApiError::Decode { .. } => "Unexpected response from server".to_string(),
            ApiError::Cancelled { .. } => "Request cancelled".to_string(),
        }
    }

    /// HTTP status of the final response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            ApiError::SessionExpired { .. } => Some(401),
            _ => None,
        }
    }
}

/// Result type for pipeline calls.
pub type ApiResult<T> = Result<T, ApiError>;
