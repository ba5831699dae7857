//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     ApiClient::shutdown() or Ctrl+C → trigger
//!     → pending backoff waits abort
//!     → in-flight attempts abort
//!     → chains return Cancelled
//! ```
//!
//! # Design Decisions
//! - One coordinator per client instance
//! - Shutdown never blocks on a sleeping retry

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::on_interrupt;
