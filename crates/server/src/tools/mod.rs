//! MCP tool implementations.
//!
//! This module contains all tools exposed by the ohduck server.

pub mod dataset_file_url;
pub mod dataset_files;
pub mod pool_status;
pub mod sql_query;

pub use dataset_file_url::DatasetFileUrlParams;
pub use dataset_files::DatasetFilesParams;
pub use pool_status::PoolStatusParams;
pub use sql_query::SqlQueryParams;
