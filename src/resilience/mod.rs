//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → circuit_breaker.rs (admit, or reject fast while the endpoint recovers)
//!     → timeouts.rs (enforce per-attempt deadline, abort on shutdown)
//!     → retries.rs (classify the outcome)
//!     → On server failure: backoff.rs (delay before the next attempt)
//!     → circuit_breaker.rs (track failures, open circuit if threshold exceeded)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only server-side failures feed the breaker and the backoff loop
//! - Circuit breaker prevents hammering a failing dependency
//! - All state is owned by one client instance, never process-global

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{BreakerStatus, CircuitBreakerRegistry, CircuitSnapshot, CircuitState};
pub use retries::Disposition;
