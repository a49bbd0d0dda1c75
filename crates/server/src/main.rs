//! ohduck server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use ohduck_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod rewrite;
mod state;
#[cfg(test)]
mod testing;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(
        graphql_url = %config.graphql_url,
        connection_ttl_minutes = config.connection_ttl_minutes,
        url_cache_ttl_minutes = config.url_cache_ttl_minutes,
        "Starting ohduck server on stdio transport"
    );

    let state = Arc::new(state::AppState::from_config(config)?);
    let handler = handler::OhduckServer::new(Arc::clone(&state));
    let server = serve_server(handler, stdio()).await?;

    tokio::select! {
        result = server.waiting() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }

    state.shutdown().await;
    Ok(())
}
