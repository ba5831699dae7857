//! User-visible error notifications.
//!
//! Suppression affects only what is shown, never what a caller receives.

pub mod notifier;

pub use notifier::{ChannelSink, ErrorNotifier, Notification, NotificationSink, TracingSink};
