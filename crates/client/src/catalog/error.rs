//! Catalog client error types.

use std::sync::Arc;

/// Errors from the dataset catalog client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// Invalid client configuration (e.g., an unparseable endpoint).
    #[error("invalid catalog configuration: {0}")]
    InvalidConfig(String),

    /// Authentication failed (missing, invalid or expired API token).
    #[error("authentication failed: check OHDUCK_API_TOKEN")]
    Auth,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// The GraphQL endpoint answered with an `errors` array.
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl CatalogError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Timeout | CatalogError::Network(_) => true,
            CatalogError::HttpError { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { CatalogError::Timeout } else { CatalogError::Network(Arc::new(err)) }
    }
}

impl From<CatalogError> for ohduck_core::Error {
    fn from(err: CatalogError) -> Self {
        ohduck_core::Error::Catalog(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::HttpError { status: 502 };
        assert!(err.to_string().contains("502"));

        let err = CatalogError::GraphQl("dataset not found".to_string());
        assert!(err.to_string().contains("dataset not found"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(CatalogError::Timeout.is_transient());
        assert!(CatalogError::HttpError { status: 503 }.is_transient());
        assert!(CatalogError::HttpError { status: 429 }.is_transient());
        assert!(!CatalogError::HttpError { status: 404 }.is_transient());
        assert!(!CatalogError::Auth.is_transient());
        assert!(!CatalogError::GraphQl("x".into()).is_transient());
    }

    #[test]
    fn test_into_core_error() {
        let err: ohduck_core::Error = CatalogError::Auth.into();
        assert!(err.to_string().starts_with("CATALOG_ERROR"));
    }
}
