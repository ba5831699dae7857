//! Deduplicated error notifications.
//!
//! A flapping endpoint produces the same failure many times a second. The
//! notifier lets the first occurrence of an (endpoint, message) pair through,
//! suppresses repeats for the dedupe window, and reports how many were
//! swallowed when the pair is shown again.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::ErrorKind;
use crate::http::request::TargetKey;
use crate::observability::metrics;

/// One user-visible error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub target: TargetKey,
    pub kind: ErrorKind,
    pub message: String,
    /// Identical reports suppressed since this pair was last shown.
    pub suppressed: u64,
}

/// Destination for emitted notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: &Notification) {
        tracing::warn!(
            endpoint = %n.target,
            kind = %n.kind,
            suppressed = n.suppressed,
            "{}",
            n.message
        );
    }
}

/// Forwards notifications to a UI (toast) consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        if self.tx.send(notification.clone()).is_err() {
            tracing::debug!(endpoint = %notification.target, "Notification receiver dropped");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DedupeEntry {
    last_shown: Instant,
    suppressed: u64,
}

/// Rate-limits error reporting per (endpoint, message).
pub struct ErrorNotifier {
    window: Duration,
    entries: DashMap<(TargetKey, String), DedupeEntry>,
    sink: Box<dyn NotificationSink>,
}

impl ErrorNotifier {
    pub fn new(window: Duration, sink: Box<dyn NotificationSink>) -> Self {
        Self {
            window,
            entries: DashMap::new(),
            sink,
        }
    }

    /// Report a failure. Returns whether it was emitted.
    pub fn report(&self, target: &TargetKey, kind: ErrorKind, message: &str) -> bool {
        let now = Instant::now();
        let key = (target.clone(), message.to_string());

        let emitted = match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(DedupeEntry { last_shown: now, suppressed: 0 });
                Some(0)
            }
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if now.duration_since(entry.last_shown) > self.window {
                    let suppressed = entry.suppressed;
                    entry.last_shown = now;
                    entry.suppressed = 0;
                    Some(suppressed)
                } else {
                    entry.suppressed += 1;
                    None
                }
            }
        };

        metrics::record_notification(emitted.is_some());

        match emitted {
            Some(suppressed) => {
                self.sink.notify(&Notification {
                    target: target.clone(),
                    kind,
                    message: message.to_string(),
                    suppressed,
                });
                true
            }
            None => {
                tracing::trace!(endpoint = %target, msg = message, "Duplicate notification suppressed");
                false
            }
        }
    }

    /// Number of distinct (endpoint, message) pairs seen.
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}
