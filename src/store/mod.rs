//! Record storage collaborator.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → Store::create / update / find_all / find_by_id
//!     → StoreError::{NotFound, Conflict} mapped to 404 / 409 by the http layer
//! ```
//!
//! # Design Decisions
//! - Storage is a trait seam; handlers never know the backend
//! - Unique constraints are declared by the record, enforced by the store
//! - `memory.rs` is the only backend shipped

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Entity;

pub use memory::MemoryStore;

/// A storable record.
pub trait Record: Entity + Clone + Send + Sync + 'static {
    /// Partial update applied by `Store::update`.
    type Patch: Send;

    /// `(field, value)` that must be unique across records, if any.
    fn unique_key(&self) -> Option<(&'static str, &str)> {
        None
    }

    fn apply(&mut self, patch: Self::Patch);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),

    #[error("{field} already exists")]
    Conflict { field: &'static str },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store<R: Record>: Send + Sync {
    async fn create(&self, record: R) -> StoreResult<R>;

    async fn update(&self, id: &str, patch: R::Patch) -> StoreResult<R>;

    async fn find_all(&self) -> StoreResult<Vec<R>>;

    async fn find_by_id(&self, id: &str) -> StoreResult<R>;
}
