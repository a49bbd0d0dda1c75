//! DuckDB sessions brokered through the resource pool.
//!
//! - [`DuckHandle`]: one DuckDB connection plus its one-time setup
//! - [`ConnectionBroker`]: per-(principal, database) pooling behind the
//!   [`ConnectionProvider`] trait
//! - [`BrokeredConnection`]: per-request wrapper whose `close()` leaves the
//!   pooled connection alive

pub mod broker;
pub mod connection;
pub mod functions;
pub mod options;
pub mod query;
#[cfg(test)]
mod testing;
pub mod wrapper;

pub use broker::{ConnectionBroker, ConnectionProvider, PoolKey};
pub use connection::{DuckHandle, EngineSettings};
pub use functions::{FILE_URL_FUNCTION, FileListingRow, FileUrlFunction, FileUrlSource};
pub use options::ConnectOptions;
pub use query::QueryResult;
pub use wrapper::BrokeredConnection;

/// Database target that never gets pooled.
pub const MEMORY_TARGET: &str = ":memory:";

/// Whether `target` denotes a throwaway in-memory database.
pub fn is_ephemeral(target: &str) -> bool {
    let target = target.trim();
    target.is_empty() || target == MEMORY_TARGET
}

/// Whether `name` is safe to splice into SQL as a bare identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Quote `value` as a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
