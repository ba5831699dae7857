//! Public client facade.
//!
//! `ApiClient` is what application code holds. It is cheap to clone; every
//! clone shares one pipeline, so breakers, the refresh slot and the notifier
//! are per client instance rather than per call site.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

use crate::auth::{
    CredentialError, CredentialStore, FileCredentialStore, HttpTokenRefresher, MemoryCredentialStore,
    SessionEvent, SessionEvents, TokenRefreshCoordinator, TokenRefresher,
};
use crate::config::validation::validate_config;
use crate::config::{ClientConfig, ConfigError};
use crate::error::{ApiError, ApiResult};
use crate::http::pipeline::{join_url, RequestPipeline};
use crate::http::request::{RequestDescriptor, TargetKey};
use crate::http::response::ApiResponse;
use crate::http::transport::{ReqwestTransport, Transport};
use crate::lifecycle::Shutdown;
use crate::notifications::{ErrorNotifier, NotificationSink, TracingSink};
use crate::resilience::{BackoffPolicy, CircuitBreakerRegistry, CircuitSnapshot};

/// Failure to assemble a client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to open credential store: {0}")]
    Credentials(#[from] CredentialError),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Assembles an [`ApiClient`] from configuration, with optional seams replaced.
pub struct ApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    sink: Option<Box<dyn NotificationSink>>,
}

impl ApiClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            refresher: None,
            credentials: None,
            sink: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Where deduplicated error notifications go. Defaults to the log.
    pub fn notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ApiClient, ClientBuildError> {
        let config = self.config;
        validate_config(&config).map_err(ConfigError::Validation)?;

        let base_url = Url::parse(&config.backend.base_url)
            .map_err(|e| ClientBuildError::InvalidUrl(format!("{}: {}", config.backend.base_url, e)))?;

        // Transport and refresher share one cookie jar so the refresh
        // credential set at login travels with the refresh call.
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(config.timeouts.connect())
            .user_agent(config.backend.user_agent.as_str())
            .build()?;

        let credentials: Arc<dyn CredentialStore> = match (self.credentials, &config.auth.credentials_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileCredentialStore::open(path)?),
            (None, None) => Arc::new(MemoryCredentialStore::new()),
        };

        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(refresher) => refresher,
            None => {
                let url = join_url(&base_url, &config.auth.refresh_path)
                    .map_err(|e| ClientBuildError::InvalidUrl(format!("{}: {}", config.auth.refresh_path, e)))?;
                Arc::new(HttpTokenRefresher::new(http.clone(), url))
            }
        };

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new(http)));
        let sink = self.sink.unwrap_or_else(|| Box::new(TracingSink));

        tracing::info!(
            base_url = %base_url,
            max_attempts = config.retries.max_attempts,
            failure_threshold = config.circuit_breaker.failure_threshold,
            cooldown_secs = config.circuit_breaker.cooldown_secs,
            "API client configured"
        );

        let pipeline = RequestPipeline {
            base_url,
            default_timeout: config.timeouts.request(),
            transport,
            credentials: credentials.clone(),
            breakers: CircuitBreakerRegistry::new(&config.circuit_breaker),
            refresher: TokenRefreshCoordinator::new(refresher, credentials),
            notifier: ErrorNotifier::new(config.notifier.dedupe_window(), sink),
            backoff: BackoffPolicy::from_config(&config.retries),
            session: SessionEvents::new(config.auth.login_path.clone()),
            shutdown: Shutdown::new(),
        };

        Ok(ApiClient {
            pipeline: Arc::new(pipeline),
        })
    }
}

/// Resilient HTTP client for the backend API.
#[derive(Clone)]
pub struct ApiClient {
    pipeline: Arc<RequestPipeline>,
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// Client with production transport, refresher and stores.
    pub fn new(config: ClientConfig) -> Result<Self, ClientBuildError> {
        ApiClientBuilder::new(config).build()
    }

    pub async fn send(&self, request: RequestDescriptor) -> ApiResult<ApiResponse> {
        self.pipeline.send(request).await
    }

    pub async fn get(&self, path: &str) -> ApiResult<ApiResponse> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<ApiResponse> {
        self.send(RequestDescriptor::delete(path)).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> ApiResult<ApiResponse> {
        self.send(self.with_json(RequestDescriptor::post(path), body)?).await
    }

    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> ApiResult<ApiResponse> {
        self.send(self.with_json(RequestDescriptor::put(path), body)?).await
    }

    pub async fn patch<B: Serialize>(&self, path: &str, body: &B) -> ApiResult<ApiResponse> {
        self.send(self.with_json(RequestDescriptor::patch(path), body)?).await
    }

    /// GET and decode the body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let request = RequestDescriptor::get(path);
        let target = request.target().clone();
        let response = self.send(request).await?;
        self.decode(target, &response)
    }

    /// POST a JSON body and decode the reply.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        let request = self.with_json(RequestDescriptor::post(path), body)?;
        let target = request.target().clone();
        let response = self.send(request).await?;
        self.decode(target, &response)
    }

    /// Listen for forced logouts.
    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.pipeline.session.subscribe()
    }

    /// Breaker state of every endpoint called so far.
    pub fn circuits(&self) -> Vec<CircuitSnapshot> {
        self.pipeline.breakers.snapshots()
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.pipeline.credentials
    }

    /// Abort pending backoff waits and in-flight attempts on every clone.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down API client");
        self.pipeline.shutdown.trigger();
    }

    fn with_json<B: Serialize>(&self, request: RequestDescriptor, body: &B) -> ApiResult<RequestDescriptor> {
        let target = request.target().clone();
        request.json(body).map_err(|e| {
            self.pipeline.surface(ApiError::InvalidRequest {
                target,
                message: e.to_string(),
            })
        })
    }

    fn decode<T: DeserializeOwned>(&self, target: TargetKey, response: &ApiResponse) -> ApiResult<T> {
        response.json().map_err(|e| {
            self.pipeline.surface(ApiError::Decode {
                target,
                message: e.to_string(),
            })
        })
    }
}
