//! Process-wide services shared by every tool call.

use std::sync::Arc;

use ohduck_client::{CatalogClient, CatalogService, UrlResolver};
use ohduck_core::{AppConfig, ConnectionBroker, Error};

use crate::rewrite::Rewriter;

/// One instance of each service, built from configuration at startup.
pub struct AppState {
    pub config: AppConfig,
    pub broker: Arc<ConnectionBroker>,
    pub resolver: Arc<UrlResolver>,
    pub rewriter: Rewriter,
    catalog: Arc<dyn CatalogService>,
}

impl AppState {
    /// Wire the services around `catalog`.
    pub fn new(config: AppConfig, catalog: Arc<dyn CatalogService>) -> Self {
        let resolver = Arc::new(UrlResolver::from_config(Arc::clone(&catalog), &config));
        Self::with_resolver(config, catalog, resolver)
    }

    /// Wire the services around `catalog`, resolving file URLs through `resolver`
    /// both in tools and in SQL.
    pub fn with_resolver(config: AppConfig, catalog: Arc<dyn CatalogService>, resolver: Arc<UrlResolver>) -> Self {
        let broker = Arc::new(ConnectionBroker::from_config(&config).with_file_url_source(Arc::<UrlResolver>::clone(&resolver)));
        let rewriter = Rewriter::new(Arc::clone(&catalog));
        Self { config, broker, resolver, rewriter, catalog }
    }

    /// Wire the services around the GraphQL catalog client.
    pub fn from_config(config: AppConfig) -> Result<Self, Error> {
        let catalog = CatalogClient::from_config(&config)?;
        Ok(Self::new(config, Arc::new(catalog)))
    }

    pub fn catalog(&self) -> &dyn CatalogService {
        self.catalog.as_ref()
    }

    /// Principal used when a request names none.
    pub fn principal<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested.map(str::trim) {
            Some(user) if !user.is_empty() => user,
            _ => &self.config.default_principal,
        }
    }

    /// Release pooled connections.
    pub async fn shutdown(&self) {
        self.broker.shutdown().await;
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("broker", &self.broker)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
