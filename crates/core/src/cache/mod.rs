//! In-memory caches shared across sessions.
//!
//! - Size-bounded TTL cache with insertion-order eviction
//! - Lazy purge of expired entries on read

pub mod ttl;

pub use ttl::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL, TtlCache};
