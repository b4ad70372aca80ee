//! Domain events exchanged between the services.
//!
//! # Data Flow
//! ```text
//! committed mutation → emitter.rs → Channel::publish(exchange, topic, json, persistent)
//!
//! durable queue → DeliveryStream → ingestor.rs → parse → cache put → ack
//!                                                      ↘ parse error → nack (discard)
//! ```
//!
//! # Design Decisions
//! - Payloads are the JSON form of the record itself
//! - Publication is best-effort and never fails the request that triggered it
//! - Consumption is at-least-once; replays converge because puts overwrite by id

pub mod emitter;
pub mod ingestor;

use serde::Serialize;

pub use emitter::EventEmitter;
pub use ingestor::{EventIngestor, ParseError};

/// Routing keys used on the shared topic exchange.
pub mod routing_keys {
    pub const USER_CREATED: &str = "user.created";
    pub const USER_UPDATED: &str = "user.updated";
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
}

/// An event ready for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub topic: String,
    pub payload: Vec<u8>,
    pub durable: bool,
}

impl DomainEvent {
    /// Durable event carrying `record` as JSON.
    pub fn new<T: Serialize + ?Sized>(topic: &str, record: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic: topic.to_string(),
            payload: serde_json::to_vec(record)?,
            durable: true,
        })
    }
}
