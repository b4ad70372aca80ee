//! In-process broker with topic exchanges and durable queues.
//!
//! # Responsibilities
//! - Declare exchanges and queues, bind them by routing-key pattern
//! - Route published messages to every matching queue (once per queue)
//! - Buffer messages until the queue's single consumer reads them
//! - Requeue nacked or abandoned deliveries as redelivered
//!
//! # Design Decisions
//! - One `InMemoryBroker` is shared by every connection in the process
//! - Unroutable messages are dropped, as an AMQP broker would
//! - A consumer dropping its stream hands the queue back for the next consumer

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::broker::topic::topic_matches;
use crate::broker::{
    Acker, BrokerConnector, BrokerError, Channel, Connection, Delivery, DeliveryStream,
    ExchangeKind, PublishOptions,
};

struct Message {
    exchange: String,
    routing_key: String,
    payload: Vec<u8>,
    redelivered: bool,
}

struct Queue {
    name: String,
    tx: mpsc::UnboundedSender<Message>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl Queue {
    fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    fn push(&self, message: Message) {
        // The queue owns a receiver at all times, so the channel stays open.
        let _ = self.tx.send(message);
    }
}

struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<(String, String)>,
}

impl Exchange {
    fn routes(&self, routing_key: &str, pattern: &str) -> bool {
        match self.kind {
            ExchangeKind::Direct => pattern == routing_key,
            ExchangeKind::Topic => topic_matches(pattern, routing_key),
            ExchangeKind::Fanout => true,
        }
    }
}

#[derive(Default)]
struct BrokerState {
    exchanges: Mutex<HashMap<String, Exchange>>,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    next_tag: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("broker mutex poisoned")
}

/// Shared in-process broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel directly, bypassing connection setup.
    pub fn channel(&self) -> Arc<dyn Channel> {
        Arc::new(MemoryChannel {
            broker: self.clone(),
        })
    }

    fn next_tag(&self) -> u64 {
        self.state.next_tag.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn route(&self, exchange: &str, routing_key: &str) -> Result<Vec<Arc<Queue>>, BrokerError> {
        let mut targets: Vec<String> = Vec::new();
        {
            let exchanges = lock(&self.state.exchanges);
            let ex = exchanges
                .get(exchange)
                .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;
            for (queue, pattern) in &ex.bindings {
                if ex.routes(routing_key, pattern) && !targets.contains(queue) {
                    targets.push(queue.clone());
                }
            }
        }

        let queues = lock(&self.state.queues);
        Ok(targets.iter().filter_map(|name| queues.get(name).cloned()).collect())
    }
}

struct MemoryChannel {
    broker: InMemoryBroker,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, durable: bool) -> Result<(), BrokerError> {
        let mut exchanges = lock(&self.broker.state.exchanges);
        match exchanges.get(name) {
            Some(existing) if existing.kind != kind => {
                return Err(BrokerError::ExchangeMismatch {
                    name: name.to_string(),
                    existing: existing.kind,
                });
            }
            Some(_) => {}
            None => {
                exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                tracing::debug!(exchange = name, kind = %kind, durable, "Exchange declared");
            }
        }
        Ok(())
    }

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), BrokerError> {
        let mut queues = lock(&self.broker.state.queues);
        if !queues.contains_key(name) {
            queues.insert(name.to_string(), Arc::new(Queue::new(name)));
            tracing::debug!(queue = name, durable, "Queue declared");
        }
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), BrokerError> {
        if !lock(&self.broker.state.queues).contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }

        let mut exchanges = lock(&self.broker.state.exchanges);
        let ex = exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;
        let binding = (queue.to_string(), routing_key.to_string());
        if !ex.bindings.contains(&binding) {
            ex.bindings.push(binding);
            tracing::debug!(queue, exchange, routing_key, "Queue bound");
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), BrokerError> {
        let targets = self.broker.route(exchange, routing_key)?;
        if targets.is_empty() {
            tracing::debug!(exchange, routing_key, "Message unroutable, dropped");
            return Ok(());
        }

        for queue in &targets {
            queue.push(Message {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                payload: payload.clone(),
                redelivered: false,
            });
        }
        tracing::trace!(
            exchange,
            routing_key,
            queues = targets.len(),
            persistent = options.persistent,
            "Message routed"
        );
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, BrokerError> {
        let queue = lock(&self.broker.state.queues)
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;

        let rx = lock(&queue.rx)
            .take()
            .ok_or_else(|| BrokerError::ConsumerExists(queue.name.clone()))?;

        Ok(Box::new(MemoryConsumer {
            broker: self.broker.clone(),
            queue,
            rx: Some(rx),
        }))
    }
}

struct MemoryConsumer {
    broker: InMemoryBroker,
    queue: Arc<Queue>,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
}

#[async_trait]
impl DeliveryStream for MemoryConsumer {
    async fn next(&mut self) -> Option<Delivery> {
        let message = self.rx.as_mut()?.recv().await?;
        Some(Delivery::new(
            self.broker.next_tag(),
            message.exchange.clone(),
            message.routing_key.clone(),
            message.payload.clone(),
            message.redelivered,
            Box::new(MemoryAcker {
                queue: self.queue.clone(),
                message: Some(message),
            }),
        ))
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            *lock(&self.queue.rx) = Some(rx);
        }
    }
}

struct MemoryAcker {
    queue: Arc<Queue>,
    message: Option<Message>,
}

impl MemoryAcker {
    fn requeue(&self, message: Message) {
        self.queue.push(Message {
            redelivered: true,
            ..message
        });
    }
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(mut self: Box<Self>) -> Result<(), BrokerError> {
        self.message.take();
        Ok(())
    }

    async fn nack(mut self: Box<Self>, requeue: bool) -> Result<(), BrokerError> {
        if let Some(message) = self.message.take() {
            if requeue {
                self.requeue(message);
            }
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            tracing::debug!(queue = %self.queue.name, "Unsettled delivery requeued");
            self.requeue(message);
        }
    }
}

struct MemoryConnection {
    broker: InMemoryBroker,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn open_channel(&self) -> Result<Arc<dyn Channel>, BrokerError> {
        Ok(self.broker.channel())
    }
}

/// Connector handing out connections to one shared `InMemoryBroker`.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    broker: InMemoryBroker,
}

impl MemoryConnector {
    pub fn new(broker: InMemoryBroker) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Connection>, BrokerError> {
        tracing::debug!(url = %crate::broker::redact_url(url), "Connecting to in-process broker");
        Ok(Arc::new(MemoryConnection {
            broker: self.broker.clone(),
        }))
    }
}
