//! Outcome classification for retry decisions.
//!
//! # Responsibilities
//! - Map a transport outcome onto the pipeline's retry dispositions
//! - Decide which outcomes count against an endpoint's circuit breaker
//!
//! # Design Decisions
//! - 401 is routed to token refresh, never to backoff
//! - 5xx and connection-level failures are retried with backoff
//! - Other 4xx are final on first sight
//! - Anything below 400 is a success (redirects are followed by the transport)

use reqwest::StatusCode;

use crate::http::response::ApiResponse;
use crate::http::transport::TransportError;

/// What the pipeline should do with one attempt's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Unauthorized,
    ServerError,
    ClientError,
    Network,
}

impl Disposition {
    /// Classify a received status code.
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            Disposition::Unauthorized
        } else if status.is_server_error() {
            Disposition::ServerError
        } else if status.as_u16() >= 400 {
            Disposition::ClientError
        } else {
            Disposition::Success
        }
    }

    /// Classify one attempt. No response at all is a `Network` failure.
    pub fn from_outcome(outcome: &Result<ApiResponse, TransportError>) -> Self {
        match outcome {
            Ok(response) => Self::from_status(response.status()),
            Err(_) => Disposition::Network,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Success => "success",
            Disposition::Unauthorized => "unauthorized",
            Disposition::ServerError => "server_error",
            Disposition::ClientError => "client_error",
            Disposition::Network => "network",
        }
    }
}
