//! Dependent-entity validation.
//!
//! # Data Flow
//! ```text
//! write handler
//!     → EntityValidator::validate(id)
//!     → CircuitBreaker::fire(id)
//!         ├─ closed / half-open probe → EntityLookup (retried GET)
//!         └─ open or failed → CacheFallback (cache hit = valid)
//!     → Ok(()) | InvalidEntity (400) | DependencyUnavailable (503)
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::consistency::fallback::CacheFallback;
use crate::consistency::lookup::Verdict;
use crate::observability::metrics;
use crate::resilience::{BreakerSnapshot, CircuitBreaker, GuardedCall};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    /// The live dependency says the entity does not exist.
    #[error("referenced entity {0} does not exist")]
    InvalidEntity(String),

    /// The dependency could not answer and the entity is not cached.
    #[error("dependency unavailable and entity {id} not cached ({reason})")]
    DependencyUnavailable { id: String, reason: String },
}

/// Checks a foreign reference before a write proceeds.
#[async_trait]
pub trait EntityValidator: Send + Sync {
    async fn validate(&self, id: &str) -> Result<(), ReferenceError>;

    /// Breaker view for health reporting.
    fn breaker(&self) -> BreakerSnapshot;
}

/// Validator guarding lookup `G` with a fallback over cached `V` snapshots.
pub struct DependentEntityValidator<G, V> {
    breaker: CircuitBreaker<G, CacheFallback<V>>,
}

impl<G, V> DependentEntityValidator<G, V>
where
    G: GuardedCall<Output = Verdict>,
    V: Send + Sync + 'static,
{
    pub fn new(breaker: CircuitBreaker<G, CacheFallback<V>>) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl<G, V> EntityValidator for DependentEntityValidator<G, V>
where
    G: GuardedCall<Output = Verdict> + 'static,
    V: Send + Sync + 'static,
{
    async fn validate(&self, id: &str) -> Result<(), ReferenceError> {
        match self.breaker.fire(id).await {
            Ok(Verdict::Valid) => {
                metrics::record_reference_check("valid");
                Ok(())
            }
            Ok(Verdict::Invalid) => {
                metrics::record_reference_check("invalid");
                Err(ReferenceError::InvalidEntity(id.to_string()))
            }
            Err(e) => {
                metrics::record_reference_check("unavailable");
                Err(e)
            }
        }
    }

    fn breaker(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::consistency::ConsistencyCache;
    use crate::resilience::{BreakerSettings, BreakerState};

    /// Owning service stub: knows "u-live", fails everything while `down`.
    #[derive(Default)]
    struct Owner {
        down: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl GuardedCall for Arc<Owner> {
        type Output = Verdict;
        type Error = String;

        async fn call(&self, id: &str) -> Result<Verdict, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err("connection refused".into());
            }
            Ok(if id == "u-live" { Verdict::Valid } else { Verdict::Invalid })
        }
    }

    fn validator(owner: &Arc<Owner>, cache: &ConsistencyCache<()>) -> DependentEntityValidator<Arc<Owner>, ()> {
        let settings = BreakerSettings {
            timeout: Duration::from_secs(1),
            reset_timeout: Duration::from_secs(30),
            ..BreakerSettings::default()
        };
        DependentEntityValidator::new(CircuitBreaker::new(
            "users",
            settings,
            owner.clone(),
            CacheFallback::new(cache.clone()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_answers_pass_through() {
        let owner = Arc::new(Owner::default());
        let v = validator(&owner, &ConsistencyCache::new());

        assert_eq!(v.validate("u-live").await, Ok(()));
        assert_eq!(
            v.validate("u-ghost").await,
            Err(ReferenceError::InvalidEntity("u-ghost".into()))
        );
        // A definite negative is not a dependency failure.
        assert_eq!(v.breaker().state, BreakerState::Closed);
        assert_eq!(v.breaker().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_uses_cache_without_calling_owner() {
        let owner = Arc::new(Owner::default());
        let cache = ConsistencyCache::new();
        cache.put("u-cached", ());
        let v = validator(&owner, &cache);

        owner.down.store(true, Ordering::SeqCst);
        assert_eq!(v.validate("u-cached").await, Ok(()));
        assert_eq!(v.breaker().state, BreakerState::Open);

        let calls = owner.calls.load(Ordering::SeqCst);
        assert_eq!(v.validate("u-cached").await, Ok(()));
        assert!(matches!(
            v.validate("u-unknown").await,
            Err(ReferenceError::DependencyUnavailable { .. })
        ));
        assert_eq!(owner.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_reset_timeout() {
        let owner = Arc::new(Owner::default());
        let v = validator(&owner, &ConsistencyCache::new());

        owner.down.store(true, Ordering::SeqCst);
        assert!(v.validate("u-live").await.is_err());
        assert_eq!(v.breaker().state, BreakerState::Open);

        owner.down.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(v.validate("u-live").await, Ok(()));
        assert_eq!(v.breaker().state, BreakerState::Closed);
    }
}
