//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OHDUCK_*)
//! 2. TOML config file (if OHDUCK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OHDUCK_*)
/// 2. TOML config file (if OHDUCK_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// GraphQL endpoint of the dataset catalog.
    ///
    /// Set via OHDUCK_GRAPHQL_URL environment variable.
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,

    /// Bearer token sent with every catalog request.
    ///
    /// Set via OHDUCK_API_TOKEN environment variable.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Maximum number of resolved download URLs kept in memory.
    ///
    /// Set via OHDUCK_URL_CACHE_MAX_ENTRIES environment variable.
    #[serde(default = "default_url_cache_max_entries")]
    pub url_cache_max_entries: usize,

    /// How long a resolved download URL stays valid, in minutes.
    ///
    /// Signed URLs usually expire after 10 minutes, hence the default of 9.
    /// Set via OHDUCK_URL_CACHE_TTL_MINUTES environment variable.
    #[serde(default = "default_url_cache_ttl_minutes")]
    pub url_cache_ttl_minutes: u64,

    /// TTL for "file not found" resolutions, in minutes.
    ///
    /// Falls back to `url_cache_ttl_minutes` when unset.
    /// Set via OHDUCK_URL_CACHE_NEGATIVE_TTL_MINUTES environment variable.
    #[serde(default)]
    pub url_cache_negative_ttl_minutes: Option<u64>,

    /// Age after which a pooled DuckDB connection is recycled, in minutes.
    ///
    /// Set via OHDUCK_CONNECTION_TTL_MINUTES environment variable.
    #[serde(default = "default_connection_ttl_minutes")]
    pub connection_ttl_minutes: u64,

    /// Catalog HTTP request timeout in milliseconds.
    ///
    /// Set via OHDUCK_REQUEST_TIMEOUT_MS environment variable.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Attempts per catalog request, including the first one.
    ///
    /// Set via OHDUCK_REQUEST_RETRIES environment variable.
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,

    /// Upper bound for the liveness probe of a pooled connection.
    ///
    /// Set via OHDUCK_PROBE_TIMEOUT_MS environment variable.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound for opening and initializing a new connection.
    ///
    /// Set via OHDUCK_CONNECT_TIMEOUT_MS environment variable.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// DuckDB `memory_limit` applied when a connection is opened (e.g. "4GB").
    ///
    /// Set via OHDUCK_MEMORY_LIMIT environment variable.
    #[serde(default)]
    pub memory_limit: Option<String>,

    /// DuckDB worker threads per connection.
    ///
    /// Set via OHDUCK_THREADS environment variable.
    #[serde(default)]
    pub threads: Option<u32>,

    /// Directory DuckDB spills intermediate results to.
    ///
    /// Set via OHDUCK_TEMP_DIRECTORY environment variable.
    #[serde(default)]
    pub temp_directory: Option<PathBuf>,

    /// Extensions installed and loaded once per new connection.
    ///
    /// Set via OHDUCK_EXTENSIONS environment variable (e.g. `[httpfs,parquet]`).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Enable HTTP keep-alive and the HTTP metadata cache on new connections.
    ///
    /// Set via OHDUCK_HTTP_CACHE environment variable.
    #[serde(default = "default_true")]
    pub http_cache: bool,

    /// Principal used for pool keys when a request carries no user.
    ///
    /// Set via OHDUCK_DEFAULT_PRINCIPAL environment variable.
    #[serde(default = "default_principal")]
    pub default_principal: String,
}

/// Minutes to a `Duration`, saturating instead of overflowing on huge values.
fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

fn default_graphql_url() -> String {
    "https://app.openhexa.org/graphql/".into()
}

fn default_url_cache_max_entries() -> usize {
    1000
}

fn default_url_cache_ttl_minutes() -> u64 {
    9
}

fn default_connection_ttl_minutes() -> u64 {
    60
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_request_retries() -> u32 {
    3
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    60_000
}

fn default_extensions() -> Vec<String> {
    vec!["httpfs".into(), "parquet".into()]
}

fn default_true() -> bool {
    true
}

fn default_principal() -> String {
    "default".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            graphql_url: default_graphql_url(),
            api_token: None,
            url_cache_max_entries: default_url_cache_max_entries(),
            url_cache_ttl_minutes: default_url_cache_ttl_minutes(),
            url_cache_negative_ttl_minutes: None,
            connection_ttl_minutes: default_connection_ttl_minutes(),
            request_timeout_ms: default_request_timeout_ms(),
            request_retries: default_request_retries(),
            probe_timeout_ms: default_probe_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            memory_limit: None,
            threads: None,
            temp_directory: None,
            extensions: default_extensions(),
            http_cache: true,
            default_principal: default_principal(),
        }
    }
}

impl AppConfig {
    /// TTL of a positive URL cache entry.
    pub fn url_cache_ttl(&self) -> Duration {
        minutes(self.url_cache_ttl_minutes)
    }

    /// TTL of a negative ("no such file") URL cache entry.
    pub fn url_cache_negative_ttl(&self) -> Duration {
        minutes(self.url_cache_negative_ttl_minutes.unwrap_or(self.url_cache_ttl_minutes))
    }

    /// Maximum age of a pooled connection.
    pub fn connection_ttl(&self) -> Duration {
        minutes(self.connection_ttl_minutes)
    }

    /// Catalog request timeout as Duration for use with reqwest.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OHDUCK_`
    /// 2. TOML file from `OHDUCK_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OHDUCK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OHDUCK_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check if the catalog API token is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the token is not set.
    pub fn require_api_token(&self) -> Result<&str, ConfigError> {
        self.api_token.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "api_token".into(),
            hint: "Set OHDUCK_API_TOKEN environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.graphql_url, "https://app.openhexa.org/graphql/");
        assert_eq!(config.url_cache_max_entries, 1000);
        assert_eq!(config.url_cache_ttl_minutes, 9);
        assert_eq!(config.connection_ttl_minutes, 60);
        assert_eq!(config.request_timeout_ms, 30_000);
        assert_eq!(config.request_retries, 3);
        assert_eq!(config.extensions, vec!["httpfs".to_string(), "parquet".to_string()]);
        assert!(config.http_cache);
        assert!(config.api_token.is_none());
        assert_eq!(config.default_principal, "default");
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.url_cache_ttl(), Duration::from_secs(540));
        assert_eq!(config.connection_ttl(), Duration::from_secs(3600));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_huge_minutes_saturate() {
        let config = AppConfig {
            url_cache_ttl_minutes: u64::MAX,
            url_cache_negative_ttl_minutes: Some(u64::MAX / 2),
            connection_ttl_minutes: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.url_cache_ttl(), Duration::from_secs(u64::MAX));
        assert_eq!(config.url_cache_negative_ttl(), Duration::from_secs(u64::MAX));
        assert_eq!(config.connection_ttl(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_negative_ttl_falls_back_to_positive() {
        let config = AppConfig::default();
        assert_eq!(config.url_cache_negative_ttl(), config.url_cache_ttl());

        let config = AppConfig { url_cache_negative_ttl_minutes: Some(1), ..Default::default() };
        assert_eq!(config.url_cache_negative_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_require_api_token_missing() {
        let config = AppConfig::default();
        let result = config.require_api_token();
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_api_token_present() {
        let config = AppConfig { api_token: Some("test-token".into()), ..Default::default() };
        assert_eq!(config.require_api_token().unwrap(), "test-token");
    }
}
