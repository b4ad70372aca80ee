//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Validation call to the owning service:
//!     → circuit_breaker.rs (admit or short-circuit to fallback)
//!     → timeouts.rs (hard deadline around the whole guarded call)
//!     → retries.rs (retry transient failures with backoff.rs delays)
//!     → circuit_breaker.rs (record outcome, maybe open)
//!
//! Broker bootstrap:
//!     → retries.rs (every failure retryable, long backoff)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every guarded call has a deadline
//! - Client errors bail out of retries immediately
//! - Circuit breaker prevents cascading failures
//! - Breakers and policies are explicit instances, never globals

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffSchedule;
pub use circuit_breaker::{
    BreakerSettings, BreakerSnapshot, BreakerState, CircuitBreaker, Fallback, FailureCause,
    GuardedCall,
};
pub use retries::{execute, Attempt, RetryError, RetryPolicy};
pub use timeouts::{with_deadline, DeadlineExceeded};
