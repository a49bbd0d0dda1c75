//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::duck::is_identifier;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `graphql_url` is not an http(s) URL
    /// - `url_cache_max_entries`, a TTL or `threads` is 0
    /// - `request_timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `request_retries` is 0 or greater than 10
    /// - an extension name is not a plain identifier
    /// - `default_principal` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.graphql_url.starts_with("http://") || self.graphql_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "graphql_url".into(),
                reason: "must be an http:// or https:// URL".into(),
            });
        }

        if self.url_cache_max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "url_cache_max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.url_cache_ttl_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "url_cache_ttl_minutes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.url_cache_negative_ttl_minutes == Some(0) {
            return Err(ConfigError::Invalid {
                field: "url_cache_negative_ttl_minutes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.connection_ttl_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "connection_ttl_minutes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.request_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.request_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.request_retries == 0 || self.request_retries > 10 {
            return Err(ConfigError::Invalid {
                field: "request_retries".into(),
                reason: "must be between 1 and 10".into(),
            });
        }

        if self.probe_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "probe_timeout_ms".into(),
                reason: "probe and connect timeouts must be greater than 0".into(),
            });
        }

        if self.threads == Some(0) {
            return Err(ConfigError::Invalid { field: "threads".into(), reason: "must be greater than 0".into() });
        }

        if let Some(ext) = self.extensions.iter().find(|ext| !is_identifier(ext)) {
            return Err(ConfigError::Invalid {
                field: "extensions".into(),
                reason: format!("not a valid extension name: {ext:?}"),
            });
        }

        if self.default_principal.is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_principal".into(),
                reason: "must not be empty".into(),
            });
        }

        Ok(())
    }
}
