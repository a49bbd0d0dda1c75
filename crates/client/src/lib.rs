//! Client code for ohduck.
//!
//! This crate provides the dataset catalog client, dataset file path parsing
//! and the cached URL resolver shared by the server.

pub mod catalog;
pub mod path;
pub mod resolver;

pub use catalog::{CatalogClient, CatalogConfig, CatalogError, CatalogService, DatasetFileRecord};
pub use path::DatasetFilePath;
pub use resolver::UrlResolver;
