//! Per-request facade over a DuckDB handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use duckdb::Connection;

use super::broker::PoolKey;
use super::connection::DuckHandle;
use super::functions::{FileListingRow, materialize_file_listing};
use super::query::{QueryResult, run_query};
use crate::Error;

/// Connection handed to one caller.
///
/// For pooled connections `close()` only marks this wrapper closed; the
/// underlying handle stays in the pool for the next request on the same key.
/// Ephemeral connections are closed for real.
#[derive(Debug)]
pub struct BrokeredConnection {
    handle: Arc<DuckHandle>,
    pool_key: Option<PoolKey>,
    closed: AtomicBool,
}

impl BrokeredConnection {
    pub(crate) fn pooled(handle: Arc<DuckHandle>, key: PoolKey) -> Self {
        Self { handle, pool_key: Some(key), closed: AtomicBool::new(false) }
    }

    pub(crate) fn ephemeral(handle: Arc<DuckHandle>) -> Self {
        Self { handle, pool_key: None, closed: AtomicBool::new(false) }
    }

    pub fn is_pooled(&self) -> bool {
        self.pool_key.is_some()
    }

    pub fn target(&self) -> &str {
        self.handle.target()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed(format!("connection to {} was closed", self.handle.target())));
        }
        Ok(())
    }

    /// Run `f` against the underlying connection on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_open()?;
        self.handle.run(f).await
    }

    pub async fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        let sql = sql.to_string();
        self.run(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    /// Execute `sql`, returning at most `max_rows` rows.
    pub async fn query(&self, sql: &str, max_rows: usize) -> Result<QueryResult, Error> {
        let sql = sql.to_string();
        self.run(move |conn| run_query(conn, &sql, max_rows)).await
    }

    /// Expose `rows` as temporary table `table` on this connection.
    pub async fn materialize_file_listing(&self, table: &str, rows: Vec<FileListingRow>) -> Result<(), Error> {
        let table = table.to_string();
        self.run(move |conn| materialize_file_listing(conn, &table, &rows)).await
    }

    /// Close this wrapper. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.pool_key {
            Some((principal, target)) => {
                tracing::debug!(principal = %principal, target = %target, "wrapper closed, pooled connection kept");
            }
            None => self.handle.close(),
        }
    }
}
