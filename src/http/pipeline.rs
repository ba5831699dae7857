//! Request pipeline: the orchestrator around a single transport call.
//!
//! # Responsibilities
//! - Reject fast when the endpoint's breaker is open
//! - Attach the bearer token and request ID to every attempt
//! - Route 401s through the refresh coordinator and reissue once
//! - Retry server failures with backoff, feeding the breaker
//! - Surface every terminal failure through the notifier
//!
//! # State Machine (per logical call)
//! ```text
//! Pending ──breaker open──▶ Rejected (CircuitOpen, no network call)
//!    │
//!    ▼
//!  Sent ──< 400──────────▶ Succeeded
//!    │ ──401, first time──▶ RetryingAuth ──refresh ok──▶ Sent (fresh server budget)
//!    │                                   └─refresh err─▶ Failed (SessionExpired)
//!    │ ──401, again───────▶ Failed (SessionExpired)
//!    │ ──5xx / no response─▶ RetryingServerError ──budget left──▶ Sent
//!    │                                          └─exhausted or breaker opened─▶ Failed
//!    └ ──other 4xx────────▶ Failed (Client)
//! ```
//!
//! # Design Decisions
//! - Auth and server-error retry budgets are independent
//! - A chain that trips its endpoint's breaker stops retrying at once
//! - Notifier suppression never changes what the caller receives

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use tokio::time::Instant;
use url::Url;

use crate::auth::{CredentialStore, SessionEvents, Token, TokenRefreshCoordinator};
use crate::error::{ApiError, ApiResult, ErrorKind};
use crate::http::request::{AttemptState, RequestDescriptor, RequestId, TargetKey, X_REQUEST_ID};
use crate::http::response::ApiResponse;
use crate::http::transport::{OutboundRequest, Transport, TransportError};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::notifications::ErrorNotifier;
use crate::observability::metrics;
use crate::resilience::timeouts::{self, Interrupted};
use crate::resilience::{BackoffPolicy, CircuitBreakerRegistry, Disposition};

/// Composes breaker, refresh, backoff and notification around a [`Transport`].
pub struct RequestPipeline {
    pub(crate) base_url: Url,
    pub(crate) default_timeout: Duration,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) breakers: CircuitBreakerRegistry,
    pub(crate) refresher: TokenRefreshCoordinator,
    pub(crate) notifier: ErrorNotifier,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) session: SessionEvents,
    pub(crate) shutdown: Shutdown,
}

impl RequestPipeline {
    /// Run one logical call to its terminal outcome.
    pub async fn send(&self, request: RequestDescriptor) -> ApiResult<ApiResponse> {
        let start = Instant::now();
        let request_id = RequestId::new();
        let target = request.target().clone();

        let result = self.run_chain(&request, request_id).await;

        match &result {
            Ok(response) => {
                metrics::record_request(target.as_str(), "success", start);
                tracing::debug!(
                    endpoint = %target,
                    request_id = %request_id,
                    status = response.status().as_u16(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request succeeded"
                );
            }
            Err(err) => {
                metrics::record_request(target.as_str(), err.kind().as_str(), start);
                tracing::debug!(endpoint = %target, request_id = %request_id, error = %err, "Request failed");
            }
        }

        result.map_err(|err| self.surface(err))
    }

    /// Hand a terminal failure to the notifier and give it back.
    ///
    /// Cancellation is never reported.
    pub(crate) fn surface(&self, err: ApiError) -> ApiError {
        if err.kind() != ErrorKind::Cancelled {
            self.notifier.report(err.target(), err.kind(), &err.user_message());
        }
        err
    }

    async fn run_chain(&self, request: &RequestDescriptor, request_id: RequestId) -> ApiResult<ApiResponse> {
        let target = request.target();

        if let Err(retry_after) = self.breakers.admit(target) {
            metrics::record_circuit_rejection(target.as_str());
            tracing::debug!(endpoint = %target, retry_after_ms = retry_after.as_millis() as u64, "Circuit open, rejecting");
            return Err(ApiError::CircuitOpen {
                target: target.clone(),
                retry_after,
            });
        }

        let mut shutdown = self.shutdown.subscribe();
        let mut state = AttemptState::default();
        let mut token = self.credentials.token();

        loop {
            let outbound = self.prepare(request, request_id, token.as_ref())?;
            state.sent += 1;
            tracing::debug!(
                endpoint = %target,
                request_id = %request_id,
                attempt = state.sent,
                "Sending request"
            );

            let limit = outbound.timeout;
            let outcome = match timeouts::with_deadline(limit, &mut shutdown, self.transport.send(outbound)).await {
                Ok(outcome) => outcome,
                Err(Interrupted::Cancelled) => return Err(ApiError::Cancelled { target: target.clone() }),
                Err(Interrupted::TimedOut(limit)) => Err(TransportError::Timeout(limit)),
            };

            let disposition = Disposition::from_outcome(&outcome);
            tracing::debug!(
                endpoint = %target,
                request_id = %request_id,
                disposition = disposition.as_str(),
                "Attempt finished"
            );

            match (disposition, outcome) {
                (Disposition::Success, Ok(response)) => {
                    self.breakers.record_success_or_non_server_failure(target);
                    return Ok(response);
                }
                (Disposition::Unauthorized, _) => {
                    self.breakers.record_success_or_non_server_failure(target);
                    if state.auth_retried {
                        return Err(self.expire_session(target, "refreshed credentials were rejected".into()));
                    }
                    state.auth_retried = true;

                    let refreshed = tokio::select! {
                        biased;
                        _ = shutdown.triggered() => return Err(ApiError::Cancelled { target: target.clone() }),
                        refreshed = self.refresher.refresh(token.as_ref()) => refreshed,
                    };
                    match refreshed {
                        Ok(fresh) => {
                            tracing::info!(endpoint = %target, request_id = %request_id, "Token refreshed, reissuing request");
                            metrics::record_retry(target.as_str(), "auth");
                            token = Some(fresh);
                            state.server_attempt = 0;
                        }
                        Err(e) => return Err(self.expire_session(target, e.to_string())),
                    }
                }
                (Disposition::ClientError, Ok(response)) => {
                    self.breakers.record_success_or_non_server_failure(target);
                    return Err(ApiError::Client {
                        target: target.clone(),
                        status: response.status().as_u16(),
                        message: response.error_message(),
                    });
                }
                (_, outcome) => {
                    let failure = match outcome {
                        Ok(response) => ApiError::Server {
                            target: target.clone(),
                            status: response.status().as_u16(),
                            message: response.error_message(),
                        },
                        Err(e) => {
                            tracing::warn!(endpoint = %target, request_id = %request_id, error = %e, "No response from backend");
                            ApiError::Network {
                                target: target.clone(),
                                message: e.to_string(),
                            }
                        }
                    };
                    self.back_off(target, &mut state, failure, &mut shutdown).await?;
                }
            }
        }
    }

    /// Record a server-side failure and wait before the next attempt.
    ///
    /// Returns `failure` when the chain must stop instead.
    async fn back_off(
        &self,
        target: &TargetKey,
        state: &mut AttemptState,
        failure: ApiError,
        shutdown: &mut ShutdownSignal,
    ) -> ApiResult<()> {
        let opened = self.breakers.record_failure(target);
        let attempt = state.server_attempt;

        if opened {
            tracing::warn!(endpoint = %target, attempt, "Circuit open, giving up on this call");
            return Err(failure);
        }
        if !self.backoff.allows(attempt) {
            tracing::warn!(endpoint = %target, attempts = attempt, "Retry budget exhausted");
            return Err(failure);
        }

        let delay = self.backoff.delay(attempt);
        tracing::info!(
            endpoint = %target,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Retrying after server failure"
        );
        metrics::record_retry(target.as_str(), failure.kind().as_str());

        timeouts::sleep_or_shutdown(delay, shutdown)
            .await
            .map_err(|_| ApiError::Cancelled { target: target.clone() })?;
        state.server_attempt += 1;
        Ok(())
    }

    /// Clear credentials, announce the expiry and build the terminal error.
    fn expire_session(&self, target: &TargetKey, reason: String) -> ApiError {
        tracing::warn!(endpoint = %target, reason = %reason, "Session expired, clearing credentials");
        self.credentials.clear();
        self.session.expired(target);
        ApiError::SessionExpired {
            target: target.clone(),
            reason,
        }
    }

    /// Build one attempt from the descriptor and the current token.
    fn prepare(
        &self,
        request: &RequestDescriptor,
        request_id: RequestId,
        token: Option<&Token>,
    ) -> ApiResult<OutboundRequest> {
        let invalid = |message: String| ApiError::InvalidRequest {
            target: request.target().clone(),
            message,
        };

        let url = join_url(&self.base_url, request.path()).map_err(|e| invalid(e.to_string()))?;

        let mut headers = request.headers().clone();
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        if let Some(token) = token {
            let value = HeaderValue::from_str(&token.bearer())
                .map_err(|_| invalid("token is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        let id = HeaderValue::from_str(&request_id.to_string()).map_err(|e| invalid(e.to_string()))?;
        headers.insert(X_REQUEST_ID, id);

        Ok(OutboundRequest {
            method: request.method().clone(),
            url,
            headers,
            body: request.body().cloned(),
            timeout: request.timeout_override().unwrap_or(self.default_timeout),
        })
    }
}

/// Append `path` (and its query) to `base`, keeping any path prefix of `base`.
pub fn join_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined)
}
