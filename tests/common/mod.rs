//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use resilient_services::broker::{
    BrokerConnector, Channel, Delivery, DeliveryStream, ExchangeKind, InMemoryBroker, MemoryConnector,
};
use resilient_services::config::{RetryConfig, ServiceConfig};
use resilient_services::lifecycle::{serve_orders, serve_users, ServiceContext, Shutdown};
use services_sdk::{OrdersClient, UsersClient};

/// Start a programmable mock backend on an ephemeral port.
///
/// Every request, whatever its path, is answered with `f()`'s status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// URL of a port nothing listens on.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Defaults with timings shrunk for tests.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.dependency.timeout_ms = 500;
    config.breaker.timeout_ms = 3000;
    config.retries.validation = RetryConfig {
        max_attempts: 3,
        factor: 1.0,
        min_delay_ms: 10,
        max_delay_ms: None,
        randomize: false,
    };
    config.retries.connect = RetryConfig {
        max_attempts: 2,
        factor: 1.0,
        min_delay_ms: 10,
        max_delay_ms: None,
        randomize: false,
    };
    config
}

/// A set of services sharing one in-process broker and one shutdown.
pub struct Harness {
    pub broker: InMemoryBroker,
    pub shutdown: Arc<Shutdown>,
    pub config: Arc<ServiceConfig>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        Self {
            broker: InMemoryBroker::new(),
            shutdown: Arc::new(Shutdown::new()),
            config: Arc::new(config),
        }
    }

    fn context(&self, config: Arc<ServiceConfig>) -> ServiceContext {
        let connector: Arc<dyn BrokerConnector> = Arc::new(MemoryConnector::new(self.broker.clone()));
        ServiceContext {
            config,
            connector,
            shutdown: self.shutdown.clone(),
        }
    }

    /// Start the users service and wait until it publishes events.
    pub async fn start_users(&self) -> (UsersClient, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_users(self.context(self.config.clone()), listener));

        let base = format!("http://{}", addr);
        let client = UsersClient::new(&base);
        let probe = &client;
        wait_until(|| async move { probe.health().await.map(|h| h.broker_connected).unwrap_or(false) }).await;
        (client, base)
    }

    /// Start the orders service validating users against `users_base_url`,
    /// and wait until its ingestor is bound.
    pub async fn start_orders(&self, users_base_url: &str) -> (OrdersClient, String) {
        let mut config = (*self.config).clone();
        config.dependency.base_url = users_base_url.to_string();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_orders(self.context(Arc::new(config)), listener));

        let base = format!("http://{}", addr);
        let client = OrdersClient::new(&base);
        let probe = &client;
        wait_until(|| async move { probe.health().await.map(|h| h.broker_connected).unwrap_or(false) }).await;
        (client, base)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Receive the next event, failing after 2 seconds.
pub async fn next_event(stream: &mut Box<dyn DeliveryStream>) -> Delivery {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("no event within 2s")
        .expect("delivery stream closed")
}

/// Assert no event arrives for 200ms.
pub async fn assert_no_event(stream: &mut Box<dyn DeliveryStream>) {
    let next = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
    assert!(next.is_err(), "unexpected event: {:?}", next.ok().flatten());
}

/// Bind a fresh queue on the shared exchange to `pattern` and consume it.
pub async fn watch(broker: &InMemoryBroker, queue: &str, pattern: &str) -> Box<dyn DeliveryStream> {
    let channel = broker.channel();
    channel.declare_exchange("app.topic", ExchangeKind::Topic, true).await.unwrap();
    channel.declare_queue(queue, true).await.unwrap();
    channel.bind(queue, "app.topic", pattern).await.unwrap();
    channel.consume(queue).await.unwrap()
}

/// Poll `check` for up to 5 seconds.
pub async fn wait_until<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within 5s");
}
