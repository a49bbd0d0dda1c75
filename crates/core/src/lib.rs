//! Core types and shared functionality for ohduck.
//!
//! This crate provides:
//! - A bounded TTL cache for resolved download URLs
//! - A keyed, liveness-checked resource pool
//! - DuckDB connection brokering on top of that pool
//! - Unified error types and configuration

pub mod cache;
pub mod config;
pub mod duck;
pub mod error;
pub mod pool;

pub use cache::TtlCache;
pub use config::{AppConfig, ConfigError};
pub use duck::{BrokeredConnection, ConnectOptions, ConnectionBroker, ConnectionProvider, FileUrlSource, QueryResult};
pub use error::Error;
pub use pool::{PoolConfig, PooledResource, ResourcePool};
