//! Request description and per-chain attempt bookkeeping.
//!
//! # Responsibilities
//! - Describe one logical call (target key, method, path, headers, body)
//! - Generate a request ID shared by every attempt of a chain
//! - Track the retry budgets of a single chain
//!
//! # Design Decisions
//! - The descriptor is immutable; attempts are rebuilt from it
//! - Target keys drop the query string and fold id-like segments into
//!   `{id}`, so `/orders/1` and `/orders/2?expand=lines` share one breaker
//!   and the per-endpoint maps stay bounded

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use uuid::Uuid;

/// Header carrying the correlation ID of a call chain.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Stable identifier of an endpoint, typically `METHOD /path/template`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetKey(String);

impl TargetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for `method` against `template`.
    pub fn for_route(method: &Method, template: &str) -> Self {
        Self(format!("{} {}", method, template))
    }

    /// Key for `method` against a concrete path, normalised with [`route_template`].
    pub fn for_path(method: &Method, path: &str) -> Self {
        Self::for_route(method, &route_template(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reduce a concrete path to its route template.
///
/// The query and fragment are dropped. Numeric segments, UUIDs and long hex
/// strings (object IDs, hashes) become `{id}`.
pub fn route_template(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .map(|segment| if is_id_like(segment) { "{id}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_id_like(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    segment.bytes().all(|b| b.is_ascii_digit())
        || Uuid::parse_str(segment).is_ok()
        || (segment.len() >= 16 && segment.bytes().all(|b| b.is_ascii_hexdigit()))
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Correlation ID for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable description of one logical call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    target: TargetKey,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    timeout: Option<Duration>,
}

impl RequestDescriptor {
    /// Describe a call whose target key is the route template of `path`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            target: TargetKey::for_path(&method, &path),
            method,
            path,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Use `template` (e.g. `/orders/{slug}`) instead of the derived one for the target key.
    pub fn with_template(mut self, template: &str) -> Self {
        self.target = TargetKey::for_route(&self.method, template);
        self
    }

    /// Attach a header. Invalid names or values are ignored with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(endpoint = %self.target, header = name, "Dropping invalid header"),
        }
        self
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach an already-serialized JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Per-attempt timeout overriding the client default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn target(&self) -> &TargetKey {
        &self.target
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Retry counters scoped to one call chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// Server-error retries made since the last (re)issue with a fresh token.
    pub server_attempt: u32,
    /// Whether the single auth retry has been spent.
    pub auth_retried: bool,
    /// Network calls issued so far.
    pub sent: u32,
}
