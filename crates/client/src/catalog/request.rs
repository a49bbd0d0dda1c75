//! GraphQL request documents and bodies.

use serde::Serialize;
use serde_json::{Value, json};

/// Page size used when listing datasets.
pub const DATASETS_PER_PAGE: u32 = 1000;

/// Lists datasets with their versions and files.
pub const DATASETS_QUERY: &str = r#"
query GetDatasets($query: String!, $page: Int!, $perPage: Int!) {
    datasets(query: $query, page: $page, perPage: $perPage) {
        totalPages
        items {
            id
            slug
            name
            workspace {
                slug
            }
            versions {
                items {
                    name
                    files {
                        items {
                            id
                            filename
                        }
                    }
                }
            }
        }
    }
}
"#;

/// Fetches the signed download URL of one dataset version file.
pub const FILE_DOWNLOAD_URL_QUERY: &str = r#"
query GetFileDownloadUrl($fileId: ID!) {
    datasetVersionFile(id: $fileId) {
        downloadUrl
    }
}
"#;

/// A GraphQL POST body.
#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest {
    pub query: &'static str,
    pub variables: Value,
}

impl GraphQlRequest {
    /// One page of the dataset listing. `search` narrows the listing server-side.
    pub fn datasets(search: &str, page: u32) -> Self {
        Self { query: DATASETS_QUERY, variables: json!({ "query": search, "page": page, "perPage": DATASETS_PER_PAGE }) }
    }

    pub fn file_download_url(file_id: &str) -> Self {
        Self { query: FILE_DOWNLOAD_URL_QUERY, variables: json!({ "fileId": file_id }) }
    }
}
