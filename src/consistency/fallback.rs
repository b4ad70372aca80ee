//! Breaker fallback backed by the consistency cache.

use async_trait::async_trait;

use crate::consistency::cache::ConsistencyCache;
use crate::consistency::lookup::Verdict;
use crate::consistency::validator::ReferenceError;
use crate::resilience::{Fallback, FailureCause};

/// Treats an id as valid when it was already learned from events.
pub struct CacheFallback<V> {
    cache: ConsistencyCache<V>,
}

impl<V> CacheFallback<V> {
    pub fn new(cache: ConsistencyCache<V>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<V: Send + Sync + 'static> Fallback<Verdict> for CacheFallback<V> {
    type Error = ReferenceError;

    async fn recover(&self, id: &str, cause: FailureCause) -> Result<Verdict, ReferenceError> {
        if self.cache.has(id) {
            tracing::info!(id, cause = %cause, "Dependency unavailable, entity found in cache");
            return Ok(Verdict::Valid);
        }

        tracing::warn!(id, cause = %cause, "Dependency unavailable and entity not cached");
        Err(ReferenceError::DependencyUnavailable {
            id: id.to_string(),
            reason: cause.to_string(),
        })
    }
}
