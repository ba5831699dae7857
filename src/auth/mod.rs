//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound attempt:
//!     credentials.rs (current token) → Authorization: Bearer <token>
//!
//! 401 received:
//!     refresh.rs (join or start the single in-flight refresh)
//!     → success: credentials.rs stores the new token, chain reissues once
//!     → failure: credentials cleared, session.rs broadcasts Expired
//! ```
//!
//! # Design Decisions
//! - Refresh is single-flight per client; N concurrent 401s cost one call
//! - The coordinator never clears credentials; the pipeline decides logout
//! - Persistence is the store's concern, not the pipeline's

pub mod credentials;
pub mod refresh;
pub mod session;

pub use credentials::{CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredSession, Token};
pub use refresh::{HttpTokenRefresher, RefreshError, RefreshedSession, TokenRefreshCoordinator, TokenRefresher};
pub use session::{SessionEvent, SessionEvents};
