//! Fixtures shared by the DuckDB unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::runtime::Handle;

use super::connection::EngineSettings;
use super::functions::{FileUrlFunction, FileUrlSource};
use crate::Error;

/// Fixed path → URL table counting lookups. Paths with fewer than four
/// segments are rejected.
pub struct StaticUrls {
    urls: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticUrls {
    pub fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
        let urls = pairs.iter().map(|(p, u)| (p.to_string(), u.to_string())).collect();
        Arc::new(Self { urls, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileUrlSource for StaticUrls {
    async fn file_url(&self, path: &str) -> Result<Option<String>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if path.splitn(4, '/').count() < 4 {
            return Err(Error::InvalidInput(format!("malformed path: {path}")));
        }
        Ok(self.urls.get(path).cloned())
    }
}

/// Function state bound to the current runtime. Call from async context.
pub fn url_function(source: Arc<StaticUrls>) -> FileUrlFunction {
    FileUrlFunction::new(source, Handle::current())
}

pub fn test_settings() -> EngineSettings {
    EngineSettings { threads: Some(1), ..Default::default() }
}
