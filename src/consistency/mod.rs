//! Consistency subsystem: the dependent service's view of foreign entities.
//!
//! # Data Flow
//! ```text
//! events (user.created / user.updated)
//!     → EventIngestor → cache.rs put (last write wins)
//!
//! write request referencing a foreign id
//!     → validator.rs → breaker → lookup.rs (live check)
//!                            ↘ fallback.rs (cache.rs has?)
//! ```
//!
//! # Design Decisions
//! - A definite negative from the live dependency is never overridden by the cache
//! - The cache only answers when the dependency cannot
//! - Cache, breaker and lookup are owned instances injected into handlers

pub mod cache;
pub mod fallback;
pub mod lookup;
pub mod validator;

pub use cache::{ConsistencyCache, EvictionHook};
pub use fallback::CacheFallback;
pub use lookup::{EntityLookup, LookupError, LookupSetupError, Verdict};
pub use validator::{DependentEntityValidator, EntityValidator, ReferenceError};
