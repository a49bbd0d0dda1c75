//! GraphQL response types and flattening into file records.

use ohduck_core::duck::FileListingRow;
use serde::{Deserialize, Serialize};

use super::CatalogError;
use crate::path::DatasetFilePath;

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlErrorItem {
    pub message: String,
}

impl<T> GraphQlResponse<T> {
    /// Return `data`, turning a non-empty `errors` array into [`CatalogError::GraphQl`].
    pub fn into_data(self) -> Result<T, CatalogError> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(CatalogError::GraphQl(messages.join("; ")));
        }
        self.data.ok_or_else(|| CatalogError::Parse("response has neither data nor errors".into()))
    }
}

#[derive(Debug, Deserialize)]
pub struct DatasetsData {
    pub datasets: DatasetPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetPage {
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub items: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub workspace: Option<WorkspaceRef>,
    #[serde(default)]
    pub versions: Option<Items<DatasetVersion>>,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceRef {
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Deserialize)]
pub struct Items<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct DatasetVersion {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub files: Option<Items<DatasetFile>>,
}

#[derive(Debug, Deserialize)]
pub struct DatasetFile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDownloadData {
    pub dataset_version_file: Option<FileDownload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDownload {
    pub download_url: Option<String>,
}

/// One file of one dataset version, flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFileRecord {
    pub workspace: String,
    pub dataset: String,
    pub version: String,
    pub filename: String,
    /// `workspace/dataset/version/filename`
    pub file_path: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub file_id: String,
}

impl DatasetFileRecord {
    pub fn matches(&self, path: &DatasetFilePath) -> bool {
        self.workspace == path.workspace
            && self.dataset == path.dataset
            && self.version == path.version
            && self.filename == path.filename
    }
}

impl From<DatasetFileRecord> for FileListingRow {
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

impl DatasetPage {
    /// Flatten datasets → versions → files, keeping only `workspace` when given.
    pub fn flatten(self, workspace: Option<&str>) -> Vec<DatasetFileRecord> {
        let mut records = Vec::new();
        for dataset in self.items {
            let workspace_slug = dataset.workspace.map(|w| w.slug).unwrap_or_default();
            if let Some(filter) = workspace
                && workspace_slug != filter
            {
                continue;
            }

            for version in dataset.versions.map(|v| v.items).unwrap_or_default() {
                for file in version.files.map(|f| f.items).unwrap_or_default() {
                    records.push(DatasetFileRecord {
                        file_path: format!("{}/{}/{}/{}", workspace_slug, dataset.slug, version.name, file.filename),
                        workspace: workspace_slug.clone(),
                        dataset: dataset.slug.clone(),
                        version: version.name.clone(),
                        filename: file.filename,
                        file_id: file.id,
                    });
                }
            }
        }
        records
    }
}
