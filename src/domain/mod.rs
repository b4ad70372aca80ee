//! Domain records owned by the two services.
//!
//! Users are owned by the users service and replicated to the orders
//! service through `user.*` events, where they are held as opaque
//! snapshots. Orders are owned by the orders service
//! and reference a user by id.

pub mod orders;
pub mod snapshot;
pub mod users;

use thiserror::Error;

pub use orders::{NewOrder, Order, OrderInput, OrderStatus};
pub use snapshot::Snapshot;
pub use users::{User, UserFields, UserInput};

/// Anything addressable by a string id.
pub trait Entity {
    fn id(&self) -> &str;
}

/// Request body failed field validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InputError(pub &'static str);
