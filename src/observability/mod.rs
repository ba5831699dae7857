//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (target, attempt, request_id) on every pipeline event
//! - Request ID flows through all attempts of one call chain
//! - Metrics are cheap and no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
