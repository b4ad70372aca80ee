//! Event consumption into the consistency cache.
//!
//! # Responsibilities
//! - Declare the durable queue and bind it to the entity routing keys
//! - Apply each payload to the cache keyed by entity id (last write wins)
//! - Ack applied messages, discard unparseable ones without requeue
//! - Cache whatever shape the producer sent; only the `id` is required
//!
//! # Design Decisions
//! - One message in flight at a time: processing order is delivery order
//! - Redelivery is harmless because a put overwrites by id
//! - No dead-lettering: a malformed payload is logged and dropped

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::broker::{BrokerError, Channel, Delivery, DeliveryStream, ExchangeKind};
use crate::consistency::ConsistencyCache;
use crate::domain::Entity;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event payload has an empty id")]
    MissingId,
}

/// Keeps a cache of `R` warm from broker deliveries.
pub struct EventIngestor<R> {
    cache: ConsistencyCache<R>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for EventIngestor<R> {
    fn clone(&self) -> Self {
        Self::new(self.cache.clone())
    }
}

impl<R> EventIngestor<R> {
    pub fn new(cache: ConsistencyCache<R>) -> Self {
        Self {
            cache,
            _record: PhantomData,
        }
    }

    pub fn cache(&self) -> &ConsistencyCache<R> {
        &self.cache
    }
}

impl<R> EventIngestor<R>
where
    R: DeserializeOwned + Entity + Send + Sync + 'static,
{
    /// Declare topology and attach as the queue's consumer.
    pub async fn bind(
        channel: &dyn Channel,
        exchange: &str,
        kind: ExchangeKind,
        queue: &str,
        routing_keys: &[String],
    ) -> Result<Box<dyn DeliveryStream>, BrokerError> {
        channel.declare_exchange(exchange, kind, true).await?;
        channel.declare_queue(queue, true).await?;
        for key in routing_keys {
            channel.bind(queue, exchange, key).await?;
        }
        let stream = channel.consume(queue).await?;
        tracing::info!(queue, exchange, routing_keys = ?routing_keys, "Event ingestor bound");
        Ok(stream)
    }

    /// Parse and store one payload, returning the entity id.
    pub fn apply(&self, payload: &[u8]) -> Result<String, ParseError> {
        let record: R = serde_json::from_slice(payload)?;
        let id = record.id().to_string();
        if id.is_empty() {
            return Err(ParseError::MissingId);
        }
        self.cache.put(id.clone(), record);
        Ok(id)
    }

    /// Apply and settle one delivery.
    pub async fn handle(&self, delivery: Delivery) {
        let routing_key = delivery.routing_key.clone();
        let tag = delivery.delivery_tag;

        match self.apply(&delivery.payload) {
            Ok(id) => {
                tracing::debug!(
                    routing_key = %routing_key,
                    delivery_tag = tag,
                    redelivered = delivery.redelivered,
                    id = %id,
                    "Event applied to cache"
                );
                metrics::record_event_consumed(&routing_key, "applied");
                if let Err(e) = delivery.ack().await {
                    tracing::warn!(routing_key = %routing_key, delivery_tag = tag, error = %e, "Ack failed");
                }
            }
            Err(e) => {
                tracing::warn!(routing_key = %routing_key, delivery_tag = tag, error = %e, "Discarding malformed event");
                metrics::record_event_consumed(&routing_key, "discarded");
                if let Err(e) = delivery.nack(false).await {
                    tracing::warn!(routing_key = %routing_key, delivery_tag = tag, error = %e, "Nack failed");
                }
            }
        }
    }

    /// Consume until the stream ends or shutdown fires.
    pub async fn run(self, mut stream: Box<dyn DeliveryStream>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Event ingestor stopping");
                    break;
                }
                next = stream.next() => match next {
                    Some(delivery) => self.handle(delivery).await,
                    None => {
                        tracing::warn!("Delivery stream closed, event ingestor stopping");
                        break;
                    }
                },
            }
        }
    }
}
