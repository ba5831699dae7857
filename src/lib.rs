//! Resilient API client library.
//!
//! Wraps every outbound backend call with bearer-token attachment,
//! single-flight token refresh, per-endpoint circuit breaking, exponential
//! backoff and deduplicated error notification.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod notifications;
pub mod observability;
pub mod resilience;

pub use config::schema::ClientConfig;
pub use error::{ApiError, ApiResult, ErrorKind};
pub use http::{ApiClient, ApiClientBuilder, ApiResponse, RequestDescriptor, TargetKey};
pub use lifecycle::Shutdown;
