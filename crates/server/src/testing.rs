//! Test doubles shared by the server's unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ohduck_client::{CatalogError, CatalogService, DatasetFileRecord, DatasetFilePath, UrlResolver};
use ohduck_core::duck::EngineSettings;
use ohduck_core::pool::PoolConfig;
use ohduck_core::{AppConfig, BrokeredConnection, ConnectOptions, ConnectionBroker, ConnectionProvider, TtlCache};

/// In-memory catalog with call counters.
#[derive(Default)]
pub struct FakeCatalog {
    files: HashMap<String, String>,
    fail_listing: bool,
    listing_calls: AtomicUsize,
    url_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add `path` with download URL `url`.
    pub fn with_file(self: Arc<Self>, path: &str, url: &str) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).unwrap_or_default();
        inner.files.insert(path.to_string(), url.to_string());
        Arc::new(inner)
    }

    pub fn failing_listing(self: Arc<Self>) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).unwrap_or_default();
        inner.fail_listing = true;
        Arc::new(inner)
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn url_calls(&self) -> usize {
        self.url_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogService for FakeCatalog {
    async fn dataset_files(&self, workspace: Option<&str>) -> Result<Vec<DatasetFileRecord>, CatalogError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(CatalogError::HttpError { status: 503 });
        }

        let mut paths: Vec<&String> = self.files.keys().collect();
        paths.sort();
        Ok(paths
            .into_iter()
            .filter_map(|p| DatasetFilePath::parse(p).ok())
            .filter(|p| workspace.is_none_or(|ws| ws == p.workspace))
            .map(|p| DatasetFileRecord {
                file_path: p.to_string(),
                workspace: p.workspace,
                dataset: p.dataset,
                version: p.version,
                filename: p.filename,
                file_id: String::new(),
            })
            .collect())
    }

    async fn file_download_url(&self, path: &DatasetFilePath) -> Result<Option<String>, CatalogError> {
        self.url_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.get(&path.to_string()).cloned())
    }
}

/// Configuration that opens DuckDB without network extensions.
pub fn offline_config() -> AppConfig {
    AppConfig { extensions: Vec::new(), http_cache: false, threads: Some(1), ..Default::default() }
}

/// A fresh unpooled in-memory connection resolving file URLs through `catalog`.
pub async fn memory_connection(catalog: &Arc<FakeCatalog>) -> BrokeredConnection {
    let settings = EngineSettings { threads: Some(1), ..Default::default() };
    let ttl = Duration::from_secs(60);
    let resolver = UrlResolver::new(Arc::clone(catalog) as Arc<dyn CatalogService>, TtlCache::new(100, ttl), ttl);
    let broker = ConnectionBroker::new(settings, PoolConfig::default()).with_file_url_source(Arc::new(resolver));
    broker.connect("test", ":memory:", &ConnectOptions::default()).await.unwrap()
}
