//! sql_query tool implementation.
//!
//! Runs one SQL statement on the caller's pooled DuckDB connection after the
//! catalog calls in it have been materialized.

use ohduck_core::duck::query::DEFAULT_MAX_ROWS;
use ohduck_core::{BrokeredConnection, ConnectOptions, ConnectionProvider, Error, QueryResult};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Hard ceiling on `max_rows`.
const MAX_ROWS_LIMIT: usize = 10_000;

/// Input parameters for sql_query tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SqlQueryParams {
    /// Database file to query, or ":memory:" for a throwaway database.
    pub database: String,

    /// The SQL statement. May call openhexa_dataset_files(['workspace'])
    /// and get_dataset_file_url(path) on any file path expression.
    pub sql: String,

    /// Principal the pooled connection belongs to (default from config).
    #[serde(default)]
    pub user: Option<String>,

    /// Maximum rows to return (default: 500, max: 10000).
    #[serde(default)]
    pub max_rows: Option<usize>,

    /// Per-request extensions to LOAD and settings to SET.
    #[serde(default)]
    pub options: Option<ConnectOptions>,
}

/// Output structure for sql_query tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SqlQueryOutput {
    #[serde(flatten)]
    pub result: QueryResult,
    pub row_count: usize,
    /// Temporary relations created for catalog listings.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub relations: Vec<String>,
}

/// Implementation of the sql_query tool.
pub async fn sql_query_impl(state: &AppState, params: SqlQueryParams) -> Result<CallToolResult, McpError> {
    let output = run(state, params).await?;
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize result: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

async fn run(state: &AppState, params: SqlQueryParams) -> Result<SqlQueryOutput, Error> {
    if params.sql.trim().is_empty() {
        return Err(Error::InvalidInput("sql cannot be empty".into()));
    }
    let max_rows = params.max_rows.unwrap_or(DEFAULT_MAX_ROWS);
    if max_rows == 0 || max_rows > MAX_ROWS_LIMIT {
        return Err(Error::InvalidInput(format!("max_rows must be 1-{MAX_ROWS_LIMIT}")));
    }

    let principal = state.principal(params.user.as_deref());
    let options = params.options.unwrap_or_default();
    let conn = state.broker.connect(principal, &params.database, &options).await?;

    let outcome = execute(state, &conn, &params.sql, max_rows).await;
    conn.close();
    outcome
}

async fn execute(state: &AppState, conn: &BrokeredConnection, sql: &str, max_rows: usize) -> Result<SqlQueryOutput, Error> {
    let prepared = state.rewriter.prepare(conn, sql).await?;
    let result = conn.query(&prepared.sql, max_rows).await?;
    tracing::debug!(rows = result.row_count(), truncated = result.truncated, "query executed");
    Ok(SqlQueryOutput { row_count: result.row_count(), result, relations: prepared.relations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCatalog, offline_config};
    use ohduck_client::UrlResolver;
    use ohduck_core::TtlCache;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn params(database: &str, sql: &str) -> SqlQueryParams {
        SqlQueryParams { database: database.into(), sql: sql.into(), user: None, max_rows: None, options: None }
    }

    #[tokio::test]
    async fn test_empty_sql_rejected() {
        let state = AppState::new(offline_config(), FakeCatalog::new());
        let result = sql_query_impl(&state, params(":memory:", "  ")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_max_rows_bounds() {
        let state = AppState::new(offline_config(), FakeCatalog::new());
        let mut p = params(":memory:", "SELECT 1");
        p.max_rows = Some(0);
        assert!(matches!(run(&state, p).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_query_pooled_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("analytics.duckdb").to_string_lossy().into_owned();
        let state = AppState::new(offline_config(), FakeCatalog::new());

        run(&state, params(&db, "CREATE TABLE visits AS SELECT * FROM range(5) t(n)")).await.unwrap();
        let mut p = params(&db, "SELECT n FROM visits ORDER BY n");
        p.max_rows = Some(2);
        let output = run(&state, p).await.unwrap();

        assert_eq!(output.result.columns, vec!["n"]);
        assert_eq!(output.result.rows, vec![vec![json!(0)], vec![json!(1)]]);
        assert!(output.result.truncated);
        assert_eq!(state.broker.pooled_connections().await, 1);
    }

    #[tokio::test]
    async fn test_query_with_catalog_calls() {
        let catalog = FakeCatalog::new()
            .with_file("malaria/cases/v1/cases.csv", "https://signed/cases")
            .with_file("supply/stock/v1/stock.csv", "https://signed/stock");
        let state = AppState::new(offline_config(), catalog);

        let output = run(
            &state,
            params(
                ":memory:",
                "SELECT file_path, get_dataset_file_url('malaria/cases/v1/cases.csv') AS url \
                 FROM openhexa_dataset_files('malaria')",
            ),
        )
        .await
        .unwrap();

        assert_eq!(output.result.rows, vec![vec![json!("malaria/cases/v1/cases.csv"), json!("https://signed/cases")]]);
        assert_eq!(output.relations.len(), 1);
    }

    #[tokio::test]
    async fn test_users_get_separate_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("shared.duckdb").to_string_lossy().into_owned();
        let state = AppState::new(offline_config(), FakeCatalog::new());

        let mut alice = params(&db, "CREATE TEMP TABLE scratch AS SELECT 1 AS v");
        alice.user = Some("alice".into());
        run(&state, alice).await.unwrap();

        let mut bob = params(&db, "SELECT v FROM scratch");
        bob.user = Some("bob".into());
        assert!(matches!(run(&state, bob).await, Err(Error::Database(_))));
        assert_eq!(state.broker.pooled_connections().await, 2);
    }

    #[tokio::test]
    async fn test_sql_error_maps_to_mcp_error() {
        let state = AppState::new(offline_config(), FakeCatalog::new());
        let err = sql_query_impl(&state, params(":memory:", "SELECT * FROM nowhere")).await.unwrap_err();
        assert_eq!(err.code.0, -32023);
    }

    #[tokio::test]
    async fn test_url_of_listed_column() {
        let catalog = FakeCatalog::new()
            .with_file("ws/ds/v1/a.csv", "https://signed/a")
            .with_file("ws/ds/v2/b.csv", "https://signed/b");
        let state = AppState::new(offline_config(), catalog);

        let output = run(
            &state,
            params(
                ":memory:",
                "SELECT file_path, get_dataset_file_url(file_path) AS url FROM openhexa_dataset_files('ws') ORDER BY 1",
            ),
        )
        .await
        .unwrap();

        assert_eq!(
            output.result.rows,
            vec![
                vec![json!("ws/ds/v1/a.csv"), json!("https://signed/a")],
                vec![json!("ws/ds/v2/b.csv"), json!("https://signed/b")],
            ]
        );
    }

    #[tokio::test]
    async fn test_expired_url_is_fetched_again() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("urls.duckdb").to_string_lossy().into_owned();
        let catalog = FakeCatalog::new().with_file("ws/ds/v1/a.csv", "https://signed/a");
        let ttl = Duration::from_millis(50);
        let resolver = UrlResolver::new(catalog.clone(), TtlCache::new(100, ttl), ttl);
        let state = AppState::with_resolver(offline_config(), catalog.clone(), Arc::new(resolver));
        let sql = "SELECT get_dataset_file_url('ws/ds/v1/a.csv') AS url";

        for _ in 0..2 {
            let output = run(&state, params(&db, sql)).await.unwrap();
            assert_eq!(output.result.rows, vec![vec![json!("https://signed/a")]]);
        }
        assert_eq!(catalog.url_calls(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        run(&state, params(&db, sql)).await.unwrap();
        assert_eq!(catalog.url_calls(), 2);
    }
}
