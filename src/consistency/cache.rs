//! Consistency cache of foreign entities learned from events.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::observability::metrics;

/// Decides which entries to drop after an insert.
///
/// The cache never evicts on its own; a hook is the only way entries leave.
pub trait EvictionHook<V>: Send + Sync {
    /// Called after `key` was written; `len` is the size including it.
    /// Returns the keys to remove.
    fn after_put(&self, key: &str, len: usize, cache: &DashMap<String, Arc<V>>) -> Vec<String>;
}

/// Last-write-wins map from foreign entity id to its latest snapshot.
///
/// Values are stored behind `Arc`, so a reader only ever sees a fully-formed
/// snapshot: a `put` swaps the whole value under the shard lock.
pub struct ConsistencyCache<V> {
    inner: Arc<DashMap<String, Arc<V>>>,
    eviction: Option<Arc<dyn EvictionHook<V>>>,
}

impl<V> Clone for ConsistencyCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            eviction: self.eviction.clone(),
        }
    }
}

impl<V> Default for ConsistencyCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ConsistencyCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistencyCache")
            .field("entries", &self.inner.len())
            .field("eviction", &self.eviction.is_some())
            .finish()
    }
}

impl<V> ConsistencyCache<V> {
    /// Create a new empty, unbounded cache.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            eviction: None,
        }
    }

    pub fn with_eviction(hook: Arc<dyn EvictionHook<V>>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            eviction: Some(hook),
        }
    }

    /// Insert or replace the snapshot for `id`.
    pub fn put(&self, id: impl Into<String>, value: V) {
        let id = id.into();
        self.inner.insert(id.clone(), Arc::new(value));

        if let Some(hook) = &self.eviction {
            for key in hook.after_put(&id, self.inner.len(), &self.inner) {
                self.inner.remove(&key);
            }
        }
        metrics::record_cache_size(self.inner.len());
    }

    pub fn get(&self, id: &str) -> Option<Arc<V>> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    pub fn has(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
