//! Unified error types for ohduck.
//!
//! Every variant renders with a stable, upper-case code prefix so MCP clients
//! can match on it.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error types for the ohduck crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a dataset file path with too few segments).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A new pooled connection could not be built.
    #[error("CONNECT_FAILED: {0}")]
    ConnectFailed(String),

    /// Building a connection took longer than the configured timeout.
    #[error("CONNECT_TIMEOUT: {0}")]
    ConnectTimeout(String),

    /// The caller already closed this connection wrapper.
    #[error("CONNECTION_CLOSED: {0}")]
    ConnectionClosed(String),

    /// DuckDB reported an error while executing a statement.
    #[error("DATABASE_ERROR: {0}")]
    Database(#[from] duckdb::Error),

    /// The remote dataset catalog could not be queried.
    #[error("CATALOG_ERROR: {0}")]
    Catalog(String),

    /// Configuration could not be loaded or is invalid.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::ConnectFailed(format!("blocking task failed: {err}"))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::ConnectFailed(msg) => (-32020, msg.clone()),
            Error::ConnectTimeout(msg) => (-32021, msg.clone()),
            Error::ConnectionClosed(msg) => (-32022, msg.clone()),
            Error::Database(e) => (-32023, e.to_string()),
            Error::Catalog(msg) => (-32024, msg.clone()),
            Error::Config(e) => (-32025, e.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("only/two".to_string());
        assert!(err.to_string().contains("INVALID_INPUT"));
        assert!(err.to_string().contains("only/two"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::InvalidInput("bad path".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32602);

        let err = Error::ConnectTimeout("alice".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32021);
    }
}
