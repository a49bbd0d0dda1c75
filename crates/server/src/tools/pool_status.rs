//! pool_status tool implementation.
//!
//! Reports pooled connections and URL cache occupancy.

use ohduck_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Parameters for the pool_status tool (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PoolStatusParams {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PooledConnectionInfo {
    pub user: String,
    pub database: String,
    /// RFC 3339 creation time.
    pub created_at: String,
    pub age_secs: u64,
}

/// Output from the pool_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PoolStatusOutput {
    pub pooled_connections: usize,
    /// Database files held open by pooled sessions.
    pub open_databases: usize,
    pub connections: Vec<PooledConnectionInfo>,
    pub connection_ttl_secs: u64,
    pub url_cache_entries: usize,
    pub url_cache_max_entries: usize,
    pub url_cache_ttl_secs: u64,
}

/// Implementation of the pool_status tool.
pub async fn pool_status_impl(state: &AppState, _params: PoolStatusParams) -> Result<CallToolResult, McpError> {
    let mut connections: Vec<PooledConnectionInfo> = state
        .broker
        .status()
        .await
        .into_iter()
        .map(|entry| PooledConnectionInfo {
            user: entry.key.0,
            database: entry.key.1,
            created_at: entry.created_at.to_rfc3339(),
            age_secs: entry.age.as_secs(),
        })
        .collect();
    connections.sort_by(|a, b| (&a.user, &a.database).cmp(&(&b.user, &b.database)));

    let cache = state.resolver.cache();
    cache.purge_expired();

    let output = PoolStatusOutput {
        pooled_connections: connections.len(),
        open_databases: state.broker.open_databases(),
        connections,
        connection_ttl_secs: state.broker.pool().config().ttl.as_secs(),
        url_cache_entries: cache.len(),
        url_cache_max_entries: cache.max_entries(),
        url_cache_ttl_secs: cache.ttl().as_secs(),
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize status: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
