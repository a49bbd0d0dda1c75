//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::state::AppState;
use crate::tools::{
    DatasetFileUrlParams, DatasetFilesParams, PoolStatusParams, SqlQueryParams, dataset_file_url::dataset_file_url_impl,
    dataset_files::dataset_files_impl, pool_status::pool_status_impl, sql_query::sql_query_impl,
};

/// The main MCP server handler for ohduck.
#[derive(Clone)]
pub struct OhduckServer {
    state: Arc<AppState>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl OhduckServer {
    /// Create a new server handler around the shared services.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    /// Run SQL on a pooled DuckDB connection.
    ///
    /// Catalog calls in the SQL are materialized first; connections are keyed
    /// by (user, database) and survive between calls.
    #[tool(
        description = "Run a SQL statement on a DuckDB database. Connections are pooled per (user, database). \
                       Supports openhexa_dataset_files(['workspace']) as a table and \
                       get_dataset_file_url(file_path) for signed URLs of literal paths or columns."
    )]
    async fn sql_query(&self, params: Parameters<SqlQueryParams>) -> Result<CallToolResult, McpError> {
        sql_query_impl(&self.state, params.0).await
    }

    /// List dataset files from the catalog.
    #[tool(description = "List dataset files in the catalog, optionally filtered by workspace slug.")]
    async fn dataset_files(&self, params: Parameters<DatasetFilesParams>) -> Result<CallToolResult, McpError> {
        dataset_files_impl(&self.state, params.0).await
    }

    /// Resolve a dataset file path to a signed download URL.
    #[tool(
        description = "Resolve workspace/dataset/version/filename to a signed download URL. Results are cached briefly."
    )]
    async fn dataset_file_url(&self, params: Parameters<DatasetFileUrlParams>) -> Result<CallToolResult, McpError> {
        dataset_file_url_impl(&self.state, params.0).await
    }

    /// Report pool and cache occupancy.
    #[tool(description = "Show pooled DuckDB connections and URL cache occupancy.")]
    async fn pool_status(&self, params: Parameters<PoolStatusParams>) -> Result<CallToolResult, McpError> {
        pool_status_impl(&self.state, params.0).await
    }
}

impl ServerHandler for OhduckServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "ohduck".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Query DuckDB databases with pooled connections and the dataset catalog exposed as SQL functions."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
