//! Single-flight token refresh.
//!
//! # Responsibilities
//! - Perform the real refresh call against the backend
//! - Guarantee at most one refresh is in flight per client
//! - Hand every concurrent caller the same outcome
//! - Store the new token before any waiter resumes
//!
//! # Design Decisions
//! - The in-flight refresh is a `Shared` future; joining is a clone
//! - The future clears its own ticket on completion
//! - Callers name the token their request carried; if the store already
//!   holds a different one, another chain rotated it and no refresh is made
//! - Whoever polls the shared future drives it; an abandoned leader
//!   does not strand the waiters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::auth::credentials::{CredentialStore, StoredSession, Token};
use crate::observability::metrics;

/// Why a refresh did not produce a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The refresh endpoint refused (refresh credential missing or expired).
    #[error("refresh rejected with status {0}")]
    Rejected(u16),

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh response invalid: {0}")]
    InvalidResponse(String),
}

/// Result of a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    pub token: Token,
    pub user: Option<serde_json::Value>,
}

/// Performs one real refresh call.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<RefreshedSession, RefreshError>;
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "accessToken", alias = "token")]
    access_token: String,
    #[serde(default)]
    user: Option<serde_json::Value>,
}

/// Refresher that POSTs to the backend's refresh endpoint.
///
/// No `Authorization` header is sent; the server reads the refresh credential
/// from the cookie jar shared with the request transport.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: Client,
    url: Url,
}

impl HttpTokenRefresher {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> Result<RefreshedSession, RefreshError> {
        let response = self
            .client
            .post(self.url.clone())
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected(status.as_u16()));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        if body.access_token.is_empty() {
            return Err(RefreshError::InvalidResponse("empty access token".into()));
        }

        Ok(RefreshedSession {
            token: Token::new(body.access_token),
            user: body.user,
        })
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Token, RefreshError>>>;

/// One in-flight refresh and the number of chains waiting on it.
struct RefreshTicket {
    id: u64,
    result: RefreshFuture,
    waiters: Arc<AtomicUsize>,
}

/// Coordinates token refreshes so concurrent 401s share one refresh call.
pub struct TokenRefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    credentials: Arc<dyn CredentialStore>,
    in_flight: Arc<Mutex<Option<RefreshTicket>>>,
    next_ticket: AtomicU64,
}

impl TokenRefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            refresher,
            credentials,
            in_flight: Arc::new(Mutex::new(None)),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Obtain a token newer than `rejected`, the one the failed request carried.
    ///
    /// Joins the in-flight refresh if there is one. With none in flight, a
    /// stored token that differs from `rejected` is returned as is.
    pub async fn refresh(&self, rejected: Option<&Token>) -> Result<Token, RefreshError> {
        let pending = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(ticket) => {
                    let waiting = ticket.waiters.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::debug!(ticket = ticket.id, waiters = waiting, "Joining in-flight token refresh");
                    ticket.result.clone()
                }
                None => {
                    if let Some(current) = self.credentials.token().filter(|t| Some(t) != rejected) {
                        tracing::debug!("Token already rotated, reusing it");
                        return Ok(current);
                    }
                    let ticket = self.start_ticket();
                    let result = ticket.result.clone();
                    *slot = Some(ticket);
                    result
                }
            }
        };

        pending.await
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn start_ticket(&self) -> RefreshTicket {
        let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let waiters = Arc::new(AtomicUsize::new(1));

        let refresher = self.refresher.clone();
        let credentials = self.credentials.clone();
        let slot = self.in_flight.clone();
        let counted = waiters.clone();

        tracing::info!(ticket = id, "Refreshing access token");

        let result = async move {
            let outcome = refresher.refresh().await;

            let outcome = match outcome {
                Ok(session) => {
                    match session.user {
                        Some(user) => credentials.set_session(StoredSession {
                            token: session.token.clone(),
                            user: Some(user),
                        }),
                        None => credentials.set_token(session.token.clone()),
                    }
                    metrics::record_token_refresh("success");
                    Ok(session.token)
                }
                Err(e) => {
                    metrics::record_token_refresh("failure");
                    Err(e)
                }
            };

            {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.as_ref().is_some_and(|t| t.id == id) {
                    *slot = None;
                }
            }

            let waiters = counted.load(Ordering::Relaxed);
            match &outcome {
                Ok(_) => tracing::info!(ticket = id, waiters, "Token refresh succeeded"),
                Err(e) => tracing::warn!(ticket = id, waiters, error = %e, "Token refresh failed"),
            }
            outcome
        }
        .boxed()
        .shared();

        RefreshTicket { id, result, waiters }
    }
}
