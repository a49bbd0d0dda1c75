//! Dataset file paths: `workspace/dataset/version/filename`.

use std::fmt;
use std::str::FromStr;

use ohduck_core::Error;
use serde::{Deserialize, Serialize};

/// A parsed dataset file path.
///
/// The filename is everything after the third `/` and may itself contain
/// slashes. Every segment is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetFilePath {
    pub workspace: String,
    pub dataset: String,
    pub version: String,
    pub filename: String,
}

impl DatasetFilePath {
    pub fn new(
        workspace: impl Into<String>, dataset: impl Into<String>, version: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self { workspace: workspace.into(), dataset: dataset.into(), version: version.into(), filename: filename.into() }
    }

    /// Parse `raw`, rejecting paths with fewer than four segments or an empty segment.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut parts = raw.splitn(4, '/');
        let (Some(workspace), Some(dataset), Some(version), Some(filename)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidInput(format!(
                "dataset file path must be workspace/dataset/version/filename, got {raw:?}"
            )));
        };

        if [workspace, dataset, version, filename].iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidInput(format!("dataset file path has an empty segment: {raw:?}")));
        }

        Ok(Self::new(workspace, dataset, version, filename))
    }
}

impl FromStr for DatasetFilePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DatasetFilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.workspace, self.dataset, self.version, self.filename)
    }
}
