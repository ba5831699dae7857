//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the backend base URL is absolute http(s)
//! - Validate value ranges (timeouts > 0, thresholds > 0, jitter in [0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("backend.base_url '{url}' is invalid: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("retries.max_delay_ms ({max}) is smaller than retries.base_delay_ms ({base})")]
    DelayBounds { base: u64, max: u64 },

    #[error("retries.jitter_ratio must be between 0.0 and 1.0")]
    JitterOutOfRange,

    #[error("{field} must start with '/'")]
    RelativePath { field: &'static str },
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.backend.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::InvalidBaseUrl {
            url: config.backend.base_url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError::InvalidBaseUrl {
            url: config.backend.base_url.clone(),
            reason: e.to_string(),
        }),
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::MustBePositive { field: "timeouts.connect_secs" });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::MustBePositive { field: "timeouts.request_secs" });
    }
    if config.retries.base_delay_ms == 0 {
        errors.push(ValidationError::MustBePositive { field: "retries.base_delay_ms" });
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::DelayBounds {
            base: config.retries.base_delay_ms,
            max: config.retries.max_delay_ms,
        });
    }
    if !(0.0..=1.0).contains(&config.retries.jitter_ratio) {
        errors.push(ValidationError::JitterOutOfRange);
    }
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::MustBePositive { field: "circuit_breaker.failure_threshold" });
    }
    if config.circuit_breaker.cooldown_secs == 0 {
        errors.push(ValidationError::MustBePositive { field: "circuit_breaker.cooldown_secs" });
    }
    if !config.auth.refresh_path.starts_with('/') {
        errors.push(ValidationError::RelativePath { field: "auth.refresh_path" });
    }
    if !config.auth.login_path.starts_with('/') {
        errors.push(ValidationError::RelativePath { field: "auth.login_path" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
