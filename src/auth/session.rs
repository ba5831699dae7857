//! Session lifecycle events.

use tokio::sync::broadcast;

use crate::http::request::TargetKey;

/// Emitted when the client gives up on the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were cleared; the application should navigate to `redirect_to`.
    Expired { target: TargetKey, redirect_to: String },
}

/// Fan-out of session events to UI or CLI listeners.
#[derive(Debug)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
    login_path: String,
}

impl SessionEvents {
    pub fn new(login_path: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            login_path: login_path.into(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Announce that the session expired while calling `target`.
    pub fn expired(&self, target: &TargetKey) {
        let event = SessionEvent::Expired {
            target: target.clone(),
            redirect_to: self.login_path.clone(),
        };
        // No listeners is fine: nothing to redirect.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_event_carries_login_path() {
        let events = SessionEvents::new("/login");
        let mut rx = events.subscribe();
        events.expired(&TargetKey::new("GET /orders"));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::Expired {
                target: TargetKey::new("GET /orders"),
                redirect_to: "/login".into(),
            }
        );
    }

    #[test]
    fn test_no_listeners_is_not_an_error() {
        let events = SessionEvents::new("/login");
        events.expired(&TargetKey::new("GET /orders"));
    }
}
