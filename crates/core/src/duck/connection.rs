//! DuckDB connection handle with construction-time setup.
//!
//! A handle is opened once, configured once (resource limits, HTTP caching,
//! extensions, catalog functions) and then shared by every request routed to
//! its pool key. Statements and liveness checks run on the blocking thread
//! pool; the connection itself is serialized by a mutex inside the handle.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use duckdb::{Config, Connection};

use super::broker::SharedDatabase;
use super::functions::{FileUrlFunction, register_catalog_functions};
use super::is_ephemeral;
use crate::Error;
use crate::config::AppConfig;
use crate::pool::{DEFAULT_PROBE_TIMEOUT, PooledResource};

/// Settings fixed when a connection is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSettings {
    /// DuckDB `memory_limit` (e.g. "4GB").
    pub memory_limit: Option<String>,
    /// DuckDB worker threads.
    pub threads: Option<u32>,
    /// Spill directory for large intermediate results.
    pub temp_directory: Option<PathBuf>,
    /// Extensions installed and loaded on open.
    pub extensions: Vec<String>,
    /// Turn on HTTP keep-alive and the HTTP metadata cache.
    pub http_cache: bool,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            memory_limit: config.memory_limit.clone(),
            threads: config.threads,
            temp_directory: config.temp_directory.clone(),
            extensions: config.extensions.clone(),
            http_cache: config.http_cache,
        }
    }
}

impl EngineSettings {
    fn duckdb_config(&self) -> Result<Config, Error> {
        let mut config = Config::default();
        if let Some(limit) = &self.memory_limit {
            config = config.with("memory_limit", limit)?;
        }
        if let Some(threads) = self.threads {
            config = config.with("threads", &threads.to_string())?;
        }
        if let Some(dir) = &self.temp_directory {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::ConnectFailed(format!("cannot create temp directory {}: {e}", dir.display())))?;
            config = config.with("temp_directory", &dir.to_string_lossy())?;
        }
        Ok(config)
    }
}

/// Open the database behind `target` with the construction-time limits. Blocking.
pub fn open_database(target: &str, settings: &EngineSettings) -> Result<Connection, Error> {
    let config = settings.duckdb_config()?;
    if is_ephemeral(target) {
        tracing::debug!("opening in-memory DuckDB database");
        Ok(Connection::open_in_memory_with_flags(config)?)
    } else {
        tracing::debug!(target = target, "opening DuckDB database");
        Ok(Connection::open_with_flags(target, config)?)
    }
}

/// Marks a handle busy for as long as it lives.
struct BusyMark<'a>(&'a Mutex<Option<Instant>>);

impl<'a> BusyMark<'a> {
    fn start(slot: &'a Mutex<Option<Instant>>) -> Self {
        *lock(slot) = Some(Instant::now());
        Self(slot)
    }
}

impl Drop for BusyMark<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Issue `SELECT 1`, waiting for any statement in flight. Blocking.
fn check_alive(conn: &Mutex<Option<Connection>>, target: &str) -> Result<(), Error> {
    let guard = lock(conn);
    let conn = guard.as_ref().ok_or_else(|| Error::ConnectionClosed(target.to_string()))?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))?;
    Ok(())
}

/// One DuckDB connection and the target it was opened against.
pub struct DuckHandle {
    conn: Arc<Mutex<Option<Connection>>>,
    target: String,
    /// Start of the statement currently holding the connection.
    busy_since: Mutex<Option<Instant>>,
    /// A statement running longer than this makes the handle count as dead.
    stall_limit: Duration,
    /// Keeps the shared database instance open while this session is pooled.
    lease: Mutex<Option<Arc<SharedDatabase>>>,
}

impl DuckHandle {
    /// Open `target` and run the one-time setup. Blocking.
    pub fn open(target: &str, settings: &EngineSettings, urls: Option<&FileUrlFunction>) -> Result<Self, Error> {
        let conn = open_database(target, settings)?;
        Self::from_connection(conn, target, settings, urls)
    }

    /// Run the one-time setup on `conn` and take ownership of it. Blocking.
    pub fn from_connection(
        conn: Connection, target: &str, settings: &EngineSettings, urls: Option<&FileUrlFunction>,
    ) -> Result<Self, Error> {
        Self::initialize(&conn, settings, urls)?;

        tracing::info!(
            target = target,
            extensions = ?settings.extensions,
            http_cache = settings.http_cache,
            file_urls = urls.is_some(),
            "configured DuckDB connection"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            target: target.to_string(),
            busy_since: Mutex::new(None),
            stall_limit: DEFAULT_PROBE_TIMEOUT,
            lease: Mutex::new(None),
        })
    }

    /// Treat the handle as dead once one statement has run for `limit`.
    pub fn with_stall_limit(mut self, limit: Duration) -> Self {
        self.stall_limit = limit;
        self
    }

    pub(crate) fn with_lease(self, lease: Arc<SharedDatabase>) -> Self {
        *lock(&self.lease) = Some(lease);
        self
    }

    fn initialize(conn: &Connection, settings: &EngineSettings, urls: Option<&FileUrlFunction>) -> Result<(), Error> {
        for ext in &settings.extensions {
            if !super::is_identifier(ext) {
                return Err(Error::InvalidInput(format!("invalid extension name: {ext:?}")));
            }
            if let Err(e) = conn.execute_batch(&format!("INSTALL {ext};")) {
                tracing::debug!(extension = %ext, error = %e, "extension install skipped");
            }
            conn.execute_batch(&format!("LOAD {ext};"))
                .map_err(|e| Error::ConnectFailed(format!("failed to load extension {ext}: {e}")))?;
        }

        if settings.http_cache {
            conn.execute_batch("SET http_keep_alive = true; SET enable_http_metadata_cache = true;")?;
        }

        register_catalog_functions(conn, urls)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run `f` against the connection on the calling thread. Blocking.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, Error>) -> Result<T, Error> {
        let guard = lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(|| Error::ConnectionClosed(self.target.clone()))?;
        let _busy = BusyMark::start(&self.busy_since);
        f(conn)
    }

    /// Run `f` against the connection on the blocking thread pool.
    pub async fn run<T, F>(self: &Arc<Self>, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let handle = Arc::clone(self);
        tokio::task::spawn_blocking(move || handle.with_conn(f)).await?
    }

    /// How long the statement in flight has been running, if any.
    pub fn busy_for(&self) -> Option<Duration> {
        let since = *lock(&self.busy_since);
        since.map(|since| since.elapsed())
    }

    /// Close the connection now if nobody is using it; otherwise it closes
    /// when the last reference drops.
    pub fn close(&self) {
        let Ok(mut guard) = self.conn.try_lock() else {
            tracing::debug!(target = %self.target, "connection busy, deferring close to drop");
            return;
        };
        if let Some(conn) = guard.take()
            && let Err((_, e)) = conn.close()
        {
            tracing::warn!(target = %self.target, error = %e, "error closing DuckDB connection");
        }
        drop(guard);
        lock(&self.lease).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.conn).is_none()
    }
}

#[async_trait]
impl PooledResource for DuckHandle {
    /// Fails at once for a stalled statement, otherwise waits for the
    /// connection off the runtime so the pool's timeout bounds the wait.
    async fn probe(&self) -> Result<(), Error> {
        if let Some(busy) = self.busy_for()
            && busy >= self.stall_limit
        {
            return Err(Error::ConnectFailed(format!("{} busy with one statement for {busy:?}", self.target)));
        }
        let conn = Arc::clone(&self.conn);
        let target = self.target.clone();
        tokio::task::spawn_blocking(move || check_alive(&conn, &target)).await?
    }

    async fn release(&self) {
        tracing::debug!(target = %self.target, "releasing DuckDB connection");
        self.close();
    }
}

impl std::fmt::Debug for DuckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckHandle").field("target", &self.target).finish_non_exhaustive()
    }
}
