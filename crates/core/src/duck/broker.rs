//! Pooled connection broker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use duckdb::Connection;
use tokio::runtime::Handle;
use tokio::time::timeout;

use super::connection::{DuckHandle, EngineSettings, open_database};
use super::functions::{FileUrlFunction, FileUrlSource};
use super::options::ConnectOptions;
use super::wrapper::BrokeredConnection;
use super::{MEMORY_TARGET, is_ephemeral};
use crate::Error;
use crate::config::AppConfig;
use crate::pool::{PoolConfig, PoolEntryStatus, ResourcePool};

/// (principal, database target)
pub type PoolKey = (String, String);

/// Source of DuckDB connections for a host.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Connect `principal` to `target`, applying `options` to the returned connection.
    async fn connect(&self, principal: &str, target: &str, options: &ConnectOptions)
    -> Result<BrokeredConnection, Error>;
}

/// Open database instances by file target. Entries die with their last lease.
type Databases = Arc<Mutex<HashMap<String, Weak<SharedDatabase>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One open database instance. Pooled sessions are clones of `root` and each
/// holds a lease; the instance closes when the last lease is dropped.
pub(crate) struct SharedDatabase {
    target: String,
    root: Mutex<Option<Connection>>,
    registry: Weak<Mutex<HashMap<String, Weak<SharedDatabase>>>>,
}

impl SharedDatabase {
    fn session(&self) -> Result<Connection, Error> {
        let root = lock(&self.root);
        let root = root.as_ref().ok_or_else(|| Error::ConnectionClosed(self.target.clone()))?;
        Ok(root.try_clone()?)
    }
}

impl Drop for SharedDatabase {
    fn drop(&mut self) {
        // Close under the registry lock so a concurrent open of the same file
        // waits for this instance to go away.
        let registry = self.registry.upgrade();
        let _databases = registry.as_ref().map(|registry| {
            let mut databases = lock(registry);
            if databases.get(&self.target).is_some_and(|entry| entry.strong_count() == 0) {
                databases.remove(&self.target);
            }
            databases
        });
        if let Some(conn) = lock(&self.root).take()
            && let Err((_, e)) = conn.close()
        {
            tracing::warn!(target = %self.target, error = %e, "error closing DuckDB database");
        }
        tracing::debug!(target = %self.target, "closed DuckDB database");
    }
}

/// Hands out one pooled DuckDB connection per (principal, target).
///
/// In-memory targets bypass the pool and get a fresh connection per call.
pub struct ConnectionBroker {
    pool: ResourcePool<PoolKey, DuckHandle>,
    databases: Databases,
    settings: Arc<EngineSettings>,
    file_urls: Option<Arc<dyn FileUrlSource>>,
}

impl ConnectionBroker {
    pub fn new(settings: EngineSettings, pool_config: PoolConfig) -> Self {
        Self {
            pool: ResourcePool::new(pool_config),
            databases: Arc::new(Mutex::new(HashMap::new())),
            settings: Arc::new(settings),
            file_urls: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let pool_config = PoolConfig {
            ttl: config.connection_ttl(),
            probe_timeout: config.probe_timeout(),
            create_timeout: config.connect_timeout(),
        };
        Self::new(EngineSettings::from(config), pool_config)
    }

    /// Back the dataset file URL function on every new connection with `source`.
    pub fn with_file_url_source(mut self, source: Arc<dyn FileUrlSource>) -> Self {
        self.file_urls = Some(source);
        self
    }

    pub fn pool(&self) -> &ResourcePool<PoolKey, DuckHandle> {
        &self.pool
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn pooled_connections(&self) -> usize {
        self.pool.len().await
    }

    /// Database files currently held open.
    pub fn open_databases(&self) -> usize {
        lock(&self.databases).values().filter(|entry| entry.strong_count() > 0).count()
    }

    pub async fn status(&self) -> Vec<PoolEntryStatus<PoolKey>> {
        self.pool.status().await
    }

    /// Release every pooled connection. Database instances close with their
    /// last session.
    pub async fn shutdown(&self) {
        tracing::info!("closing pooled DuckDB connections");
        self.pool.clear().await;
    }

    fn url_function(&self) -> Option<FileUrlFunction> {
        self.file_urls.as_ref().map(|source| FileUrlFunction::new(Arc::clone(source), Handle::current()))
    }

    /// Current instance for `target`, opening it if none is alive. Blocking.
    fn database(databases: &Databases, target: &str, settings: &EngineSettings) -> Result<Arc<SharedDatabase>, Error> {
        let mut map = lock(databases);
        map.retain(|_, entry| entry.strong_count() > 0);
        if let Some(shared) = map.get(target).and_then(Weak::upgrade) {
            return Ok(shared);
        }
        let shared = Arc::new(SharedDatabase {
            target: target.to_string(),
            root: Mutex::new(Some(open_database(target, settings)?)),
            registry: Arc::downgrade(databases),
        });
        map.insert(target.to_string(), Arc::downgrade(&shared));
        Ok(shared)
    }

    /// Build a new pooled handle for `target`. Blocking.
    fn open_pooled(
        databases: &Databases, target: &str, settings: &EngineSettings, urls: Option<&FileUrlFunction>,
        stall_limit: std::time::Duration,
    ) -> Result<DuckHandle, Error> {
        let shared = Self::database(databases, target, settings)?;
        let conn = shared.session()?;
        Ok(DuckHandle::from_connection(conn, target, settings, urls)?
            .with_stall_limit(stall_limit)
            .with_lease(shared))
    }

    async fn open(&self, target: &str) -> Result<DuckHandle, Error> {
        let databases = Arc::clone(&self.databases);
        let settings = Arc::clone(&self.settings);
        let urls = self.url_function();
        let stall_limit = self.pool.config().probe_timeout;
        let target = target.to_string();
        tokio::task::spawn_blocking(move || {
            Self::open_pooled(&databases, &target, &settings, urls.as_ref(), stall_limit)
        })
        .await?
    }

    async fn open_ephemeral(&self) -> Result<Arc<DuckHandle>, Error> {
        let settings = Arc::clone(&self.settings);
        let urls = self.url_function();
        let limit = self.pool.config().create_timeout;
        let open = tokio::task::spawn_blocking(move || DuckHandle::open(MEMORY_TARGET, &settings, urls.as_ref()));
        match timeout(limit, open).await {
            Ok(handle) => Ok(Arc::new(handle??)),
            Err(_) => Err(Error::ConnectTimeout(format!("opening {MEMORY_TARGET} exceeded {limit:?}"))),
        }
    }
}

impl std::fmt::Debug for ConnectionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBroker")
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionBroker {
    async fn connect(
        &self, principal: &str, target: &str, options: &ConnectOptions,
    ) -> Result<BrokeredConnection, Error> {
        options.validate()?;

        let conn = if is_ephemeral(target) {
            tracing::debug!(principal = principal, "opening unpooled in-memory connection");
            BrokeredConnection::ephemeral(self.open_ephemeral().await?)
        } else {
            let key: PoolKey = (principal.to_string(), target.to_string());
            let handle = self.pool.acquire(&key, || self.open(target)).await?;
            BrokeredConnection::pooled(handle, key)
        };

        if !options.is_empty() {
            let options = options.clone();
            conn.run(move |c| options.apply(c)).await?;
        }

        Ok(conn)
    }
}
