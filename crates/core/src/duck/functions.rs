//! Catalog functions registered once on every new connection.
//!
//! `get_dataset_file_url(path)` is a scalar function backed by a
//! [`FileUrlSource`]. Every call goes through the source, so URL caching and
//! expiry are the source's business; the connection keeps no copy. DuckDB runs
//! the function on a blocking thread, which waits on the tokio runtime the
//! function was registered with.
//!
//! Dataset listings are materialized per connection with
//! [`materialize_file_listing`] under a caller-chosen temporary table name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::core::{DataChunkHandle, Inserter, LogicalTypeHandle, LogicalTypeId};
use duckdb::ffi::duckdb_string_t;
use duckdb::types::DuckString;
use duckdb::vscalar::{ScalarFunctionSignature, VScalar};
use duckdb::vtab::arrow::WritableVector;
use duckdb::{Connection, params};
use tokio::runtime::Handle;

use super::is_identifier;
use crate::Error;

/// Name of the scalar function exposed to SQL.
pub const FILE_URL_FUNCTION: &str = "get_dataset_file_url";

/// Resolves dataset file paths to download URLs.
#[async_trait]
pub trait FileUrlSource: Send + Sync {
    /// Download URL for `path`, `Ok(None)` when the catalog has none.
    async fn file_url(&self, path: &str) -> Result<Option<String>, Error>;
}

/// State behind [`FILE_URL_FUNCTION`]: the URL source and the runtime its
/// futures run on.
#[derive(Clone)]
pub struct FileUrlFunction {
    source: Arc<dyn FileUrlSource>,
    runtime: Handle,
}

impl FileUrlFunction {
    pub fn new(source: Arc<dyn FileUrlSource>, runtime: Handle) -> Self {
        Self { source, runtime }
    }

    /// Blocking. Must not be called from a runtime worker thread.
    fn resolve(&self, path: &str) -> Result<Option<String>, Error> {
        self.runtime.block_on(self.source.file_url(path))
    }
}

impl std::fmt::Debug for FileUrlFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUrlFunction").finish_non_exhaustive()
    }
}

struct FileUrlScalar;

impl VScalar for FileUrlScalar {
    type State = FileUrlFunction;

    fn invoke(
        state: &Self::State, input: &mut DataChunkHandle, output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let len = input.len();
        let paths = input.flat_vector(0);
        // SAFETY: the only parameter is declared VARCHAR and we read `len` rows.
        let raw = unsafe { paths.as_slice_with_len::<duckdb_string_t>(len) };
        let mut out = output.flat_vector();

        // One lookup per distinct path in the chunk.
        let mut seen: HashMap<String, Option<String>> = HashMap::new();
        for (row, value) in raw.iter().enumerate() {
            if paths.row_is_null(row as u64) {
                out.set_null(row);
                continue;
            }
            let path = DuckString::new(&mut { *value }).as_str().into_owned();
            let url = match seen.get(&path) {
                Some(url) => url.clone(),
                None => {
                    let url = state.resolve(&path)?;
                    seen.insert(path, url.clone());
                    url
                }
            };
            match url {
                Some(url) => out.insert(row, url.as_str()),
                None => out.set_null(row),
            }
        }
        Ok(())
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }

    // Signed URLs change over time; never fold a call into a constant.
    fn volatile() -> bool {
        true
    }
}

/// Register the catalog functions on `conn`. Without a URL source
/// [`FILE_URL_FUNCTION`] is left undefined. Re-registering replaces the previous
/// definition.
pub(crate) fn register_catalog_functions(conn: &Connection, urls: Option<&FileUrlFunction>) -> Result<(), Error> {
    match urls {
        Some(urls) => {
            conn.register_scalar_function_with_state::<FileUrlScalar>(FILE_URL_FUNCTION, urls)?;
            tracing::debug!(function = FILE_URL_FUNCTION, "registered catalog functions");
        }
        None => tracing::debug!(function = FILE_URL_FUNCTION, "no URL source, function not registered"),
    }
    Ok(())
}

/// One row of a materialized dataset listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListingRow {
    pub workspace: String,
    pub dataset: String,
    pub version: String,
    pub filename: String,
    pub file_path: String,
}

/// (Re)create temporary table `table` holding `rows`.
pub fn materialize_file_listing(conn: &Connection, table: &str, rows: &[FileListingRow]) -> Result<(), Error> {
    if !is_identifier(table) {
        return Err(Error::InvalidInput(format!("invalid relation name: {table:?}")));
    }

    conn.execute_batch(&format!(
        "CREATE OR REPLACE TEMP TABLE {table} (
             workspace VARCHAR,
             dataset VARCHAR,
             version VARCHAR,
             filename VARCHAR,
             file_path VARCHAR
         );"
    ))?;

    let mut stmt = conn.prepare(&format!("INSERT INTO {table} VALUES (?, ?, ?, ?, ?)"))?;
    for row in rows {
        stmt.execute(params![row.workspace, row.dataset, row.version, row.filename, row.file_path])?;
    }
    tracing::debug!(relation = table, rows = rows.len(), "materialized dataset listing");
    Ok(())
}
