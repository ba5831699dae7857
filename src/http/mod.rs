//! HTTP client subsystem.
//!
//! # Data Flow
//! ```text
//! ApiClient::get / post / ... (client.rs)
//!     → request.rs (descriptor: target key, method, path, body)
//!     → pipeline.rs (breaker admit, bearer token, retries, refresh)
//!     → transport.rs (one attempt over reqwest)
//!     → response.rs (status, body, error message extraction)
//!     → Ok(ApiResponse) or Err(ApiError)
//! ```

pub mod client;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{ApiClient, ApiClientBuilder, ClientBuildError};
pub use pipeline::RequestPipeline;
pub use request::{route_template, AttemptState, RequestDescriptor, RequestId, TargetKey, X_REQUEST_ID};
pub use response::ApiResponse;
pub use transport::{OutboundRequest, ReqwestTransport, Transport, TransportError};
