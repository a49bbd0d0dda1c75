//! Keyed pool of long-lived resources with TTL recycling and liveness checks.
//!
//! Each key owns at most one resource. `acquire` hands out the pooled resource
//! while it is younger than the configured TTL and answers its probe;
//! otherwise the entry is released and rebuilt through the caller's factory.
//!
//! Locking is per key: the map of slots is guarded by a short synchronous
//! mutex, and each slot by an async mutex held for the whole
//! lookup/probe/create sequence. Callers racing on the same key observe a
//! single construction; unrelated keys never wait on each other's factory.
//! A slot left empty is removed from the map while its lock is still held, and
//! a caller that wakes on a removed slot starts over with a fresh one.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::Error;

/// Default maximum age of a pooled resource (60 minutes).
pub const DEFAULT_RESOURCE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default bound on a liveness probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on building a new resource.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(60);

/// A resource that can live in a [`ResourcePool`].
#[async_trait]
pub trait PooledResource: Send + Sync + 'static {
    /// Cheap round trip proving the resource is still usable.
    async fn probe(&self) -> Result<(), Error>;

    /// Tear down the underlying resource after the pool dropped it.
    async fn release(&self) {}
}

/// Pool tuning.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Resources at least this old are recycled on the next acquire.
    pub ttl: Duration,
    /// A probe that does not answer in time counts as dead.
    pub probe_timeout: Duration,
    /// A factory that does not finish in time fails the acquire.
    pub create_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_RESOURCE_TTL, probe_timeout: DEFAULT_PROBE_TIMEOUT, create_timeout: DEFAULT_CREATE_TIMEOUT }
    }
}

struct PoolEntry<R> {
    resource: Arc<R>,
    created_at: Instant,
    created_wall: DateTime<Utc>,
}

/// Point-in-time view of one pooled entry.
#[derive(Debug, Clone)]
pub struct PoolEntryStatus<K> {
    pub key: K,
    pub created_at: DateTime<Utc>,
    pub age: Duration,
}

type Slot<R> = Arc<Mutex<Option<PoolEntry<R>>>>;

/// Keyed, liveness-checked resource pool.
pub struct ResourcePool<K, R> {
    slots: SyncMutex<HashMap<K, Slot<R>>>,
    config: PoolConfig,
}

impl<K, R> ResourcePool<K, R>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    R: PooledResource,
{
    pub fn new(config: PoolConfig) -> Self {
        Self { slots: SyncMutex::new(HashMap::new()), config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn slot(&self, key: &K) -> Slot<R> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn is_current(&self, key: &K, slot: &Slot<R>) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Drop `slot` from the map. Call while holding its lock with no entry in it.
    fn forget(&self, key: &K, slot: &Slot<R>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    fn all_slots(&self) -> Vec<(K, Slot<R>)> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.iter().map(|(k, s)| (k.clone(), Arc::clone(s))).collect()
    }

    /// Return the live resource for `key`, building one with `factory` if needed.
    ///
    /// An existing entry is reused only while its age is below the TTL and its
    /// probe succeeds within the probe timeout. Expired or dead entries are
    /// released and replaced. `factory` runs at most once per call and only
    /// when no reusable entry exists.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error, or `Error::ConnectTimeout` when the
    /// factory exceeds the create timeout. No entry is stored in either case.
    pub async fn acquire<F, Fut>(&self, key: &K, factory: F) -> Result<Arc<R>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        let (slot, mut guard) = loop {
            let slot = self.slot(key);
            let guard = Arc::clone(&slot).lock_owned().await;
            if self.is_current(key, &slot) {
                break (slot, guard);
            }
        };

        if let Some(entry) = guard.as_ref()
            && self.is_reusable(key, entry).await
        {
            return Ok(Arc::clone(&entry.resource));
        }

        if let Some(stale) = guard.take() {
            stale.resource.release().await;
        }

        tracing::info!(key = ?key, "creating pooled resource");
        let resource = match timeout(self.config.create_timeout, factory()).await {
            Ok(Ok(resource)) => Arc::new(resource),
            Ok(Err(e)) => {
                tracing::warn!(key = ?key, error = %e, "failed to create pooled resource");
                self.forget(key, &slot);
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(key = ?key, timeout = ?self.config.create_timeout, "pooled resource creation timed out");
                self.forget(key, &slot);
                return Err(Error::ConnectTimeout(format!(
                    "creating resource for {key:?} exceeded {:?}",
                    self.config.create_timeout
                )));
            }
        };

        *guard = Some(PoolEntry { resource: Arc::clone(&resource), created_at: Instant::now(), created_wall: Utc::now() });
        Ok(resource)
    }

    async fn is_reusable(&self, key: &K, entry: &PoolEntry<R>) -> bool {
        let age = entry.created_at.elapsed();
        if age >= self.config.ttl {
            tracing::info!(key = ?key, age_secs = age.as_secs_f64(), ttl_secs = self.config.ttl.as_secs(), "pooled resource expired, recreating");
            return false;
        }

        match timeout(self.config.probe_timeout, entry.resource.probe()).await {
            Ok(Ok(())) => {
                tracing::debug!(key = ?key, age_secs = age.as_secs_f64(), "reusing pooled resource");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(key = ?key, error = %e, "pooled resource dead, removing");
                false
            }
            Err(_) => {
                tracing::warn!(key = ?key, timeout = ?self.config.probe_timeout, "pooled resource probe timed out, removing");
                false
            }
        }
    }

    /// Drop and release the entry for `key`. Returns whether one existed.
    pub async fn evict(&self, key: &K) -> bool {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(key).cloned()
        };
        let Some(slot) = slot else {
            return false;
        };

        let taken = {
            let mut guard = slot.lock().await;
            let taken = guard.take();
            self.forget(key, &slot);
            taken
        };
        match taken {
            Some(entry) => {
                entry.resource.release().await;
                true
            }
            None => false,
        }
    }

    /// Release every pooled resource.
    pub async fn clear(&self) {
        for (key, slot) in self.all_slots() {
            let taken = {
                let mut guard = slot.lock().await;
                let taken = guard.take();
                self.forget(&key, &slot);
                taken
            };
            if let Some(entry) = taken {
                tracing::debug!(key = ?key, "releasing pooled resource");
                entry.resource.release().await;
            }
        }
    }

    /// Number of keys currently holding a resource.
    pub async fn len(&self) -> usize {
        let mut count = 0;
        for (_, slot) in self.all_slots() {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every pooled entry.
    pub async fn status(&self) -> Vec<PoolEntryStatus<K>> {
        let mut out = Vec::new();
        for (key, slot) in self.all_slots() {
            if let Some(entry) = slot.lock().await.as_ref() {
                out.push(PoolEntryStatus { key, created_at: entry.created_wall, age: entry.created_at.elapsed() });
            }
        }
        out
    }
}

#[cfg(test)]
impl<K, R> ResourcePool<K, R> {
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<K, R> Debug for ResourcePool<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool").field("config", &self.config).finish_non_exhaustive()
    }
}
