//! dataset_files tool implementation.
//!
//! Lists catalog files without touching DuckDB.

use ohduck_client::DatasetFileRecord;
use ohduck_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Input parameters for dataset_files tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DatasetFilesParams {
    /// Only list files of this workspace slug.
    #[serde(default)]
    pub workspace: Option<String>,
}

/// One listed file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatasetFileEntry {
    pub workspace: String,
    pub dataset: String,
    pub version: String,
    pub filename: String,
    pub file_path: String,
}

impl From<DatasetFileRecord> for DatasetFileEntry {
    fn from(record: DatasetFileRecord) -> Self {
        Self {
            workspace: record.workspace,
            dataset: record.dataset,
            version: record.version,
            filename: record.filename,
            file_path: record.file_path,
        }
    }
}

/// Output structure for dataset_files tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DatasetFilesOutput {
    pub files: Vec<DatasetFileEntry>,
    pub count: usize,
}

/// Implementation of the dataset_files tool.
///
/// Unlike the SQL table function, a catalog failure is reported to the caller.
pub async fn dataset_files_impl(state: &AppState, params: DatasetFilesParams) -> Result<CallToolResult, McpError> {
    let workspace = params.workspace.as_deref().map(str::trim).filter(|w| !w.is_empty());
    let records = state.catalog().dataset_files(workspace).await.map_err(Error::from)?;

    let files: Vec<DatasetFileEntry> = records.into_iter().map(DatasetFileEntry::from).collect();
    let output = DatasetFilesOutput { count: files.len(), files };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize listing: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
