//! dataset_file_url tool implementation.
//!
//! Resolves one dataset file path through the shared URL cache.

use ohduck_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Parameters for the dataset_file_url tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatasetFileUrlParams {
    /// Path in the form workspace/dataset/version/filename.
    pub file_path: String,
}

/// Output from the dataset_file_url tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatasetFileUrlOutput {
    pub file_path: String,
    /// Signed download URL, or null when the file is unknown or the catalog
    /// could not be reached.
    pub url: Option<String>,
}

/// Implementation of the dataset_file_url tool.
pub async fn dataset_file_url_impl(state: &AppState, params: DatasetFileUrlParams) -> Result<CallToolResult, McpError> {
    let url = state.resolver.resolve(&params.file_path).await?;

    let output = DatasetFileUrlOutput { file_path: params.file_path, url };
    let json =
        serde_json::to_string_pretty(&output).map_err(|e| Error::InvalidInput(format!("Failed to serialize url: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCatalog, offline_config};

    fn output(result: CallToolResult) -> DatasetFileUrlOutput {
        let text = result.content[0].as_text().unwrap().text.clone();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_and_caches() {
        let catalog = FakeCatalog::new().with_file("ws/ds/v1/a.csv", "https://signed/a");
        let state = AppState::new(offline_config(), catalog.clone());
        let params = DatasetFileUrlParams { file_path: "ws/ds/v1/a.csv".into() };

        let out = output(dataset_file_url_impl(&state, params.clone()).await.unwrap());
        assert_eq!(out.url.as_deref(), Some("https://signed/a"));

        dataset_file_url_impl(&state, params).await.unwrap();
        assert_eq!(catalog.url_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_file_is_null() {
        let state = AppState::new(offline_config(), FakeCatalog::new());
        let params = DatasetFileUrlParams { file_path: "ws/ds/v1/missing.csv".into() };
        let out = output(dataset_file_url_impl(&state, params).await.unwrap());
        assert_eq!(out.url, None);
    }

    #[tokio::test]
    async fn test_malformed_path_is_invalid_input() {
        let state = AppState::new(offline_config(), FakeCatalog::new());
        let params = DatasetFileUrlParams { file_path: "onlytwo/parts".into() };
        let err = dataset_file_url_impl(&state, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
