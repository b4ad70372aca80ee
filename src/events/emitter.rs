//! Best-effort event publication after committed mutations.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;

use crate::broker::{Channel, PublishOptions};
use crate::events::DomainEvent;
use crate::observability::metrics;

/// Publishes domain events to one exchange.
///
/// Starts detached; `attach` plugs in the channel once the broker
/// bootstrap succeeds. Until then events are skipped.
pub struct EventEmitter {
    exchange: String,
    channel: ArcSwapOption<Arc<dyn Channel>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("exchange", &self.exchange)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl EventEmitter {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            channel: ArcSwapOption::empty(),
        }
    }

    pub fn attach(&self, channel: Arc<dyn Channel>) {
        self.channel.store(Some(Arc::new(channel)));
        tracing::info!(exchange = %self.exchange, "Event emitter attached to broker");
    }

    pub fn is_attached(&self) -> bool {
        self.channel.load().is_some()
    }

    /// Publish `record` under `topic`. Failures are logged, never returned.
    pub async fn emit<T>(&self, topic: &str, record: &T)
    where
        T: Serialize + Sync + ?Sized,
    {
        let Some(channel) = self.channel.load_full() else {
            tracing::warn!(topic, "Broker not connected, event skipped");
            metrics::record_event_published(topic, "skipped");
            return;
        };

        let event = match DomainEvent::new(topic, record) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(topic, error = %e, "Failed to serialize event");
                metrics::record_event_published(topic, "failed");
                return;
            }
        };

        let options = PublishOptions {
            persistent: event.durable,
        };
        match channel.publish(&self.exchange, &event.topic, event.payload, options).await {
            Ok(()) => {
                tracing::debug!(exchange = %self.exchange, topic, "Event published");
                metrics::record_event_published(topic, "published");
            }
            Err(e) => {
                tracing::error!(exchange = %self.exchange, topic, error = %e, "Event publish failed");
                metrics::record_event_published(topic, "failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::broker::{ExchangeKind, InMemoryBroker};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::json;

    async fn audit_queue(channel: &Arc<dyn Channel>) {
        channel.declare_exchange("app.topic", ExchangeKind::Topic, true).await.unwrap();
        channel.declare_queue("audit", true).await.unwrap();
        channel.bind("audit", "app.topic", "#").await.unwrap();
    }

    /// Runs one `emit` under a private recorder and renders what it counted.
    fn emit_counted(emitter: &EventEmitter, topic: &str) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        ::metrics::with_local_recorder(&recorder, || {
            runtime.block_on(emitter.emit(topic, &json!({"id": "u1"})))
        });
        handle.render()
    }

    fn outcome_line<'a>(rendered: &'a str, outcome: &str) -> Option<&'a str> {
        let label = format!("outcome=\"{}\"", outcome);
        rendered
            .lines()
            .find(|line| line.starts_with("events_published_total") && line.contains(&label))
    }

    #[tokio::test]
    async fn test_detached_emitter_skips() {
        let broker = InMemoryBroker::new();
        let channel = broker.channel();
        audit_queue(&channel).await;

        let emitter = EventEmitter::new("app.topic");
        assert!(!emitter.is_attached());
        emitter.emit("user.created", &json!({"id": "u1"})).await;

        let mut stream = channel.consume("audit").await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), stream.next()).await.is_err());
    }

    #[test]
    fn test_detached_emit_counted_as_skipped() {
        let rendered = emit_counted(&EventEmitter::new("app.topic"), "user.created");
        assert!(outcome_line(&rendered, "skipped").is_some_and(|l| l.ends_with(" 1")));
        assert!(outcome_line(&rendered, "published").is_none());
    }

    #[tokio::test]
    async fn test_publishes_json_to_bound_queue() {
        let broker = InMemoryBroker::new();
        let channel = broker.channel();
        channel.declare_exchange("app.topic", ExchangeKind::Topic, true).await.unwrap();
        channel.declare_queue("audit", true).await.unwrap();
        channel.bind("audit", "app.topic", "order.*").await.unwrap();

        let emitter = EventEmitter::new("app.topic");
        emitter.attach(channel.clone());
        emitter.emit("order.created", &json!({"id": "o1"})).await;

        let mut stream = channel.consume("audit").await.unwrap();
        let delivery = stream.next().await.unwrap();
        assert_eq!(delivery.routing_key, "order.created");
        let body: serde_json::Value = serde_json::from_slice(&delivery.payload).unwrap();
        assert_eq!(body["id"], "o1");
    }

    #[test]
    fn test_publish_failure_is_swallowed() {
        // Exchange never declared: publish errors, emit still returns.
        let emitter = EventEmitter::new("missing");
        emitter.attach(InMemoryBroker::new().channel());

        let rendered = emit_counted(&emitter, "user.created");
        assert!(outcome_line(&rendered, "failed").is_some_and(|l| l.ends_with(" 1")));
        assert!(outcome_line(&rendered, "published").is_none());
        assert!(emitter.is_attached());
    }
}
