//! Bounded in-memory cache with per-entry expiry.
//!
//! Entries expire `ttl` after insertion and are purged lazily the next time
//! they are read. When the cache is full, the oldest-inserted entry is evicted
//! to make room for a new key. Reads never refresh an entry's position.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default capacity of a [`TtlCache`].
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default entry lifetime (9 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(9 * 60);

/// Cached value with its insertion metadata.
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Insertion sequence -> key, oldest first.
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

impl<K: Eq + Hash, V> Inner<K, V> {
    fn remove<Q>(&mut self, key: &Q) -> Option<CacheEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Size-bounded, TTL-based key/value cache safe for concurrent use.
///
/// Every operation runs as a single critical section under one mutex, so a
/// `get` that finds a stale entry removes it before any other caller can
/// observe it, and `put` checks capacity, evicts and inserts atomically.
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_entries: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_entries` entries (minimum 1).
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner { entries: HashMap::new(), order: BTreeMap::new(), next_seq: 0 }),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry.
    ///
    /// Returns `None` when the key is absent or its entry is expired; an
    /// expired entry is removed as part of this call.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }

        inner.remove(key);
        None
    }

    /// Insert or overwrite `key` with the cache-wide TTL.
    pub fn put(&self, key: K, value: V) {
        self.put_with_ttl(key, value, self.ttl);
    }

    /// Insert or overwrite `key` with an explicit TTL.
    ///
    /// Overwriting refreshes the entry's timestamp and moves it to the newest
    /// insertion position. Inserting a new key into a full cache first evicts
    /// the oldest-inserted entry.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.lock();

        if inner.remove(&key).is_none() {
            while inner.entries.len() >= self.max_entries {
                if inner.evict_oldest().is_none() {
                    break;
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(key, CacheEntry { value, created_at: Instant::now(), ttl, seq });
    }

    /// Remove `key`, returning its value if it was present and still live.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.remove(key).filter(|e| !e.is_expired(now)).map(|e| e.value)
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();
        let Inner { entries, order, .. } = &mut *inner;
        let before = entries.len();
        entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            if expired {
                order.remove(&entry.seq);
            }
            !expired
        });
        before - entries.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").field("max_entries", &self.max_entries).field("ttl", &self.ttl).finish()
    }
}
