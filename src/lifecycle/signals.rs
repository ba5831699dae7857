//! OS signal handling.
//!
//! # Responsibilities
//! - Translate Ctrl+C (SIGINT) into a client shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Only the first interrupt is acted on

use tokio::task::JoinHandle;

/// Run `action` once when the process receives Ctrl+C.
pub fn on_interrupt<F>(action: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, cancelling pending requests");
                action();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for interrupt signal"),
        }
    })
}
