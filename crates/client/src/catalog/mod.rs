//! Dataset catalog client.
//!
//! Talks to the catalog's GraphQL endpoint to list dataset files and to fetch
//! signed download URLs.
//!
//! ### Protocol
//!
//! - **Endpoint**: `https://app.openhexa.org/graphql/` by default (POST, JSON body)
//! - **Authentication**: `Authorization: Bearer <token>`; requests go out
//!   unauthenticated (with a warning at startup) when no token is configured.
//! - **Retries**: network errors, timeouts, 429 and 5xx are retried with
//!   exponential backoff; 401/403 and GraphQL errors are not.
//! - **Pagination**: dataset listing follows `totalPages`.

pub mod error;
pub mod request;
pub mod response;
pub mod retry;

pub use error::CatalogError;
pub use request::GraphQlRequest;
pub use response::DatasetFileRecord;
pub use retry::RetryPolicy;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use ohduck_core::AppConfig;
use reqwest::header;
use serde::de::DeserializeOwned;

use crate::path::DatasetFilePath;
use response::{DatasetsData, FileDownloadData, GraphQlResponse};

/// Default GraphQL endpoint.
pub const DEFAULT_GRAPHQL_URL: &str = "https://app.openhexa.org/graphql/";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = concat!("ohduck/", env!("CARGO_PKG_VERSION"));

/// Upper bound on pages fetched by one listing.
const MAX_PAGES: u32 = 100;

/// Remote dataset catalog.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Every file of every dataset version, optionally limited to one workspace.
    async fn dataset_files(&self, workspace: Option<&str>) -> Result<Vec<DatasetFileRecord>, CatalogError>;

    /// Signed download URL for `path`, or `None` when the catalog has no such file.
    async fn file_download_url(&self, path: &DatasetFilePath) -> Result<Option<String>, CatalogError>;
}

/// Catalog client configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// GraphQL endpoint (default: https://app.openhexa.org/graphql/).
    pub graphql_url: String,
    /// Bearer token; requests are sent without one when unset.
    pub api_token: Option<String>,
    /// Per-request timeout (default: 30s).
    pub timeout: Duration,
    /// Retry behavior for transient failures.
    pub retry: RetryPolicy,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
            api_token: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&AppConfig> for CatalogConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            graphql_url: config.graphql_url.clone(),
            api_token: config.api_token.clone(),
            timeout: config.request_timeout(),
            retry: RetryPolicy { max_attempts: config.request_retries, ..RetryPolicy::default() },
            ..Default::default()
        }
    }
}

/// GraphQL client for the dataset catalog.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
}

impl CatalogClient {
    /// Create a new catalog client with the given configuration.
    pub fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        url::Url::parse(&config.graphql_url)
            .map_err(|e| CatalogError::InvalidConfig(format!("graphql_url {:?}: {e}", config.graphql_url)))?;

        if config.api_token.is_none() {
            tracing::warn!("no catalog API token configured, requests may be rejected");
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { http, config })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, CatalogError> {
        Self::new(CatalogConfig::from(config))
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// POST one GraphQL document, retrying transient failures.
    pub async fn execute<T: DeserializeOwned>(&self, name: &str, request: &GraphQlRequest) -> Result<T, CatalogError> {
        retry::retry_transient(name, self.config.retry, || self.send_once(request)).await
    }

    async fn send_once<T: DeserializeOwned>(&self, request: &GraphQlRequest) -> Result<T, CatalogError> {
        let mut builder = self
            .http
            .post(&self.config.graphql_url)
            .header(header::ACCEPT, "application/json")
            .json(request);
        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }

        let http_response = builder.send().await?;
        let status = http_response.status();
        tracing::debug!(status = status.as_u16(), "catalog response");

        if status == 401 || status == 403 {
            return Err(CatalogError::Auth);
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(CatalogError::HttpError { status: status.as_u16() });
        }

        let bytes = http_response.bytes().await?;
        let envelope: GraphQlResponse<T> =
            serde_json::from_slice(&bytes).map_err(|e| CatalogError::Parse(e.to_string()))?;
        envelope.into_data()
    }

    /// Walk every page of the dataset listing for `search`.
    async fn list_datasets(&self, search: &str, workspace: Option<&str>) -> Result<Vec<DatasetFileRecord>, CatalogError> {
        let start = Instant::now();
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let data: DatasetsData = self.execute("datasets", &GraphQlRequest::datasets(search, page)).await?;
            let total_pages = data.datasets.total_pages;
            records.extend(data.datasets.flatten(workspace));

            if page >= total_pages || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        tracing::info!(
            workspace = workspace.unwrap_or("*"),
            files = records.len(),
            pages = page,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "listed dataset files"
        );
        Ok(records)
    }

    /// Signed URL for the file with catalog id `file_id`.
    pub async fn download_url_by_id(&self, file_id: &str) -> Result<Option<String>, CatalogError> {
        let data: FileDownloadData =
            self.execute("datasetVersionFile", &GraphQlRequest::file_download_url(file_id)).await?;
        Ok(data.dataset_version_file.and_then(|f| f.download_url))
    }
}

#[async_trait]
impl CatalogService for CatalogClient {
    async fn dataset_files(&self, workspace: Option<&str>) -> Result<Vec<DatasetFileRecord>, CatalogError> {
        self.list_datasets("", workspace).await
    }

    async fn file_download_url(&self, path: &DatasetFilePath) -> Result<Option<String>, CatalogError> {
        // Paths name files by slug; the download endpoint wants the file id.
        let candidates = self.list_datasets(&path.dataset, Some(&path.workspace)).await?;
        let Some(record) = candidates.iter().find(|r| r.matches(path)) else {
            tracing::debug!(path = %path, "file not found in catalog");
            return Ok(None);
        };

        let url = self.download_url_by_id(&record.file_id).await?;
        if url.is_none() {
            tracing::warn!(path = %path, file_id = %record.file_id, "catalog returned no download URL");
        }
        Ok(url)
    }
}
