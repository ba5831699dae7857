//! Timeout and cancellation enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with a per-attempt deadline
//! - Make backoff waits and in-flight calls abortable on shutdown
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Cancellation wins over completion when both are ready

use std::future::Future;
use std::time::Duration;

use crate::lifecycle::ShutdownSignal;

/// Why a guarded operation did not produce its own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut(Duration),
    Cancelled,
}

/// Run `fut` with a deadline, aborting early if `shutdown` fires.
pub async fn with_deadline<F, T>(
    limit: Duration,
    shutdown: &mut ShutdownSignal,
    fut: F,
) -> Result<T, Interrupted>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = shutdown.triggered() => Err(Interrupted::Cancelled),
        res = tokio::time::timeout(limit, fut) => res.map_err(|_| Interrupted::TimedOut(limit)),
    }
}

/// Sleep for `delay` unless shutdown is triggered first.
pub async fn sleep_or_shutdown(delay: Duration, shutdown: &mut ShutdownSignal) -> Result<(), Interrupted> {
    tokio::select! {
        biased;
        _ = shutdown.triggered() => Err(Interrupted::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
