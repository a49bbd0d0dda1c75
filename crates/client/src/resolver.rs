//! Memoized dataset-file URL resolution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ohduck_core::{AppConfig, Error, FileUrlSource, TtlCache};

use crate::catalog::CatalogService;
use crate::path::DatasetFilePath;

/// Resolves dataset file paths to signed download URLs through a TTL cache.
///
/// Both outcomes of a successful lookup are cached: a URL, and the explicit
/// "no such file" answer. Transient catalog failures are never cached.
pub struct UrlResolver {
    catalog: Arc<dyn CatalogService>,
    cache: TtlCache<String, Option<String>>,
    negative_ttl: Duration,
}

impl UrlResolver {
    pub fn new(catalog: Arc<dyn CatalogService>, cache: TtlCache<String, Option<String>>, negative_ttl: Duration) -> Self {
        Self { catalog, cache, negative_ttl }
    }

    pub fn from_config(catalog: Arc<dyn CatalogService>, config: &AppConfig) -> Self {
        let cache = TtlCache::new(config.url_cache_max_entries, config.url_cache_ttl());
        Self::new(catalog, cache, config.url_cache_negative_ttl())
    }

    pub fn cache(&self) -> &TtlCache<String, Option<String>> {
        &self.cache
    }

    /// Resolve `file_path` to its download URL.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` when `file_path` is not
    /// `workspace/dataset/version/filename`; neither the cache nor the catalog
    /// is consulted in that case. Catalog failures are not errors: they
    /// resolve to `None` and leave the cache untouched.
    pub async fn resolve(&self, file_path: &str) -> Result<Option<String>, Error> {
        let path = DatasetFilePath::parse(file_path)?;
        let key = path.to_string();

        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(path = %key, found = cached.is_some(), "url cache hit");
            return Ok(cached);
        }

        match self.catalog.file_download_url(&path).await {
            Ok(Some(url)) => {
                tracing::debug!(path = %key, "url resolved");
                self.cache.put(key, Some(url.clone()));
                Ok(Some(url))
            }
            Ok(None) => {
                tracing::debug!(path = %key, "file not found, caching negative result");
                self.cache.put_with_ttl(key, None, self.negative_ttl);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "url resolution failed, not caching");
                Ok(None)
            }
        }
    }
}

/// Backs `get_dataset_file_url` in SQL, so every call shares this cache.
#[async_trait]
impl FileUrlSource for UrlResolver {
    async fn file_url(&self, path: &str) -> Result<Option<String>, Error> {
        self.resolve(path).await
    }
}

impl std::fmt::Debug for UrlResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlResolver")
            .field("cache", &self.cache)
            .field("negative_ttl", &self.negative_ttl)
            .finish_non_exhaustive()
    }
}
