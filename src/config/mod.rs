//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, API_BASE_URL override)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → consumed once by ApiClient::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a new client is built for new settings
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::{
    AuthConfig, BackendConfig, CircuitBreakerConfig, NotifierConfig, ObservabilityConfig,
    RetryConfig, TimeoutConfig,
};
