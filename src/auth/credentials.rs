//! Credential storage.
//!
//! The pipeline only ever asks for the current token, replaces it after a
//! refresh and clears it on forced logout. Where the session lives is up to
//! the store: memory for tests and short-lived tools, a JSON file for
//! sessions that must survive restarts.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque bearer token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// What a credential store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: Token,
    /// User record returned by login or refresh, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

/// Errors raised while persisting credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Holder of the current bearer token.
pub trait CredentialStore: Send + Sync {
    /// Current token, if logged in.
    fn token(&self) -> Option<Token>;

    /// Replace the token, keeping the stored user record.
    fn set_token(&self, token: Token);

    /// Replace token and user record together.
    fn set_session(&self, session: StoredSession);

    /// Last known user record.
    fn user(&self) -> Option<serde_json::Value>;

    /// Forget everything (forced logout).
    fn clear(&self);
}

/// Lock-free in-memory store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: ArcSwapOption<StoredSession>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: Token) -> Self {
        let store = Self::new();
        store.set_token(token);
        store
    }

    fn snapshot(&self) -> Option<Arc<StoredSession>> {
        self.session.load_full()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<Token> {
        self.snapshot().map(|s| s.token.clone())
    }

    fn set_token(&self, token: Token) {
        self.session.rcu(|current| {
            let user = current.as_ref().and_then(|s| s.user.clone());
            Some(Arc::new(StoredSession { token: token.clone(), user }))
        });
    }

    fn set_session(&self, session: StoredSession) {
        self.session.store(Some(Arc::new(session)));
    }

    fn user(&self) -> Option<serde_json::Value> {
        self.snapshot().and_then(|s| s.user.clone())
    }

    fn clear(&self) {
        self.session.store(None);
    }
}

/// In-memory store mirrored to a JSON file on every change.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    inner: MemoryCredentialStore,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading an existing session if present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        let inner = MemoryCredentialStore::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let session: Option<StoredSession> = serde_json::from_reader(reader)?;
            if let Some(session) = session {
                inner.set_session(session);
                tracing::info!(path = %path.display(), "Loaded stored session");
            }
        }

        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        if let Err(e) = self.write_file() {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to persist credentials");
        }
    }

    fn write_file(&self) -> Result<(), CredentialError> {
        let writer = BufWriter::new(File::create(&self.path)?);
        let session = self.inner.snapshot();
        serde_json::to_writer(writer, &session.as_deref())?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<Token> {
        self.inner.token()
    }

    fn set_token(&self, token: Token) {
        self.inner.set_token(token);
        self.persist();
    }

    fn set_session(&self, session: StoredSession) {
        self.inner.set_session(session);
        self.persist();
    }

    fn user(&self) -> Option<serde_json::Value> {
        self.inner.user()
    }

    fn clear(&self) {
        self.inner.clear();
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_operations() {
        let store = MemoryCredentialStore::new();
        assert!(store.token().is_none());

        store.set_session(StoredSession {
            token: Token::new("a"),
            user: Some(serde_json::json!({ "role": "manager" })),
        });
        store.set_token(Token::new("b"));
        assert_eq!(store.token(), Some(Token::new("b")));
        assert_eq!(store.user().unwrap()["role"], "manager");

        store.clear();
        assert!(store.token().is_none());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_token_is_redacted() {
        let token = Token::new("secret-value");
        assert_eq!(format!("{:?}", token), "Token(<redacted>)");
        assert_eq!(token.bearer(), "Bearer secret-value");
    }

    #[test]
    fn test_file_store_persistence() {
        let path = std::env::temp_dir().join(format!("creds-{}.json", uuid::Uuid::new_v4()));

        let store = FileCredentialStore::open(&path).unwrap();
        store.set_session(StoredSession {
            token: Token::new("persisted"),
            user: Some(serde_json::json!({ "name": "Ada" })),
        });

        let reloaded = FileCredentialStore::open(&path).unwrap();
        assert_eq!(reloaded.token(), Some(Token::new("persisted")));
        assert_eq!(reloaded.user().unwrap()["name"], "Ada");

        reloaded.clear();
        let cleared = FileCredentialStore::open(&path).unwrap();
        assert!(cleared.token().is_none());

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("creds-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(FileCredentialStore::open(&path), Err(CredentialError::Corrupt(_))));
        std::fs::remove_file(&path).unwrap_or_default();
    }
}
