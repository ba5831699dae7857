//! Circuit breaker registry for backend endpoint protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: endpoint assumed down, requests fail fast
//! - Half-Open: cooldown elapsed, a single trial request is in flight
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive server failures >= threshold
//! Open → Half-Open: first admission after cooldown (lazy, no timer)
//! Half-Open → Closed: trial succeeds or fails client-side
//! Half-Open → Open: trial fails server-side
//! ```
//!
//! # Design Decisions
//! - Per-endpoint circuit breaker keyed by target key (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial call in Half-Open (prevents hammering recovering endpoint);
//!   with `half_open_single_trial = false` expiry closes the breaker outright
//! - An abandoned trial is re-granted once another cooldown has passed

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::http::request::TargetKey;
use crate::observability::metrics;

/// Breaker status for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { trial_started: Instant },
}

impl BreakerStatus {
    fn label(&self) -> &'static str {
        match self {
            BreakerStatus::Closed => "closed",
            BreakerStatus::Open { .. } => "open",
            BreakerStatus::HalfOpen { .. } => "half_open",
        }
    }
}

/// State tracked per target key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitState {
    pub status: BreakerStatus,
    pub consecutive_failures: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            status: BreakerStatus::Closed,
            consecutive_failures: 0,
        }
    }
}

/// Point-in-time view of one breaker, for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub target: TargetKey,
    pub status: &'static str,
    pub consecutive_failures: u32,
    /// Remaining cooldown when open.
    pub retry_after: Option<Duration>,
}

/// Per-endpoint circuit breakers, created lazily on first use.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    states: DashMap<TargetKey, CircuitState>,
    threshold: u32,
    cooldown: Duration,
    single_trial: bool,
}

impl CircuitBreakerRegistry {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            states: DashMap::new(),
            threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            single_trial: config.half_open_single_trial,
        }
    }

    /// Admit a call to `target`, or return the remaining cooldown.
    ///
    /// Performs the lazy Open → Half-Open (or Closed) transition once the
    /// cooldown has elapsed.
    pub fn admit(&self, target: &TargetKey) -> Result<(), Duration> {
        let now = Instant::now();
        let mut entry = self.states.entry(target.clone()).or_default();
        let state = entry.value_mut();

        match state.status {
            BreakerStatus::Closed => Ok(()),
            BreakerStatus::Open { opened_at } => {
                let reopen_at = opened_at + self.cooldown;
                if now < reopen_at {
                    return Err(reopen_at - now);
                }
                state.consecutive_failures = 0;
                if self.single_trial {
                    state.status = BreakerStatus::HalfOpen { trial_started: now };
                    tracing::info!(endpoint = %target, "Circuit half-open, admitting trial request");
                } else {
                    state.status = BreakerStatus::Closed;
                    tracing::info!(endpoint = %target, "Circuit cooldown elapsed, closing");
                }
                metrics::record_circuit_state(target.as_str(), state.status.label());
                Ok(())
            }
            BreakerStatus::HalfOpen { trial_started } => {
                let regrant_at = trial_started + self.cooldown;
                if now < regrant_at {
                    return Err(regrant_at - now);
                }
                tracing::warn!(endpoint = %target, "Trial request never reported back, admitting a new one");
                state.status = BreakerStatus::HalfOpen { trial_started: now };
                Ok(())
            }
        }
    }

    /// True while calls to `target` are being rejected.
    pub fn is_open(&self, target: &TargetKey) -> bool {
        self.admit(target).is_err()
    }

    /// Record a server-side failure (5xx or no response).
    ///
    /// Returns whether the breaker is open after recording.
    pub fn record_failure(&self, target: &TargetKey) -> bool {
        let now = Instant::now();
        let mut entry = self.states.entry(target.clone()).or_default();
        let state = entry.value_mut();

        match state.status {
            BreakerStatus::Open { .. } => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                true
            }
            BreakerStatus::HalfOpen { .. } => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.status = BreakerStatus::Open { opened_at: now };
                tracing::warn!(endpoint = %target, "Trial request failed, circuit re-opened");
                metrics::record_circuit_state(target.as_str(), state.status.label());
                true
            }
            BreakerStatus::Closed => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                if state.consecutive_failures >= self.threshold {
                    state.status = BreakerStatus::Open { opened_at: now };
                    tracing::warn!(
                        endpoint = %target,
                        failures = state.consecutive_failures,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Circuit opened"
                    );
                    metrics::record_circuit_state(target.as_str(), state.status.label());
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record an outcome that proves the endpoint answered (success or non-server failure).
    ///
    /// Resets the failure count. An open breaker stays open until its cooldown ends.
    pub fn record_success_or_non_server_failure(&self, target: &TargetKey) {
        let mut entry = self.states.entry(target.clone()).or_default();
        let state = entry.value_mut();
        state.consecutive_failures = 0;

        if let BreakerStatus::HalfOpen { .. } = state.status {
            state.status = BreakerStatus::Closed;
            tracing::info!(endpoint = %target, "Trial request answered, circuit closed");
            metrics::record_circuit_state(target.as_str(), state.status.label());
        }
    }

    /// Current state of `target`'s breaker, without applying lazy expiry.
    pub fn state(&self, target: &TargetKey) -> Option<CircuitState> {
        self.states.get(target).map(|r| *r.value())
    }

    /// Point-in-time view of `target`'s breaker.
    pub fn snapshot(&self, target: &TargetKey) -> Option<CircuitSnapshot> {
        let now = Instant::now();
        self.states
            .get(target)
            .map(|r| self.describe(target, r.value(), now))
    }

    /// Snapshot of every breaker seen so far, sorted by target.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let now = Instant::now();
        let mut all: Vec<_> = self
            .states
            .iter()
            .map(|r| self.describe(r.key(), r.value(), now))
            .collect();
        all.sort_by(|a, b| a.target.cmp(&b.target));
        all
    }

    fn describe(&self, target: &TargetKey, state: &CircuitState, now: Instant) -> CircuitSnapshot {
        let retry_after = match state.status {
            BreakerStatus::Open { opened_at } => Some((opened_at + self.cooldown).saturating_duration_since(now)),
            _ => None,
        };
        CircuitSnapshot {
            target: target.clone(),
            status: state.status.label(),
            consecutive_failures: state.consecutive_failures,
            retry_after,
        }
    }

    /// Number of endpoints with breaker state.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
