//! Startup orchestration.
//!
//! # Responsibilities
//! - Build each service's state from configuration
//! - Serve HTTP immediately on the given listener
//! - Bootstrap the broker in the background with the connect retry policy
//! - Start the ingestor and attach the emitter once the broker is up
//!
//! # Design Decisions
//! - Construction errors are fatal, broker unavailability is not
//! - Each service gets its own breaker, cache and emitter instance

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::broker::{BrokerConnector, BrokerError, Channel};
use crate::config::{BrokerConfig, RetryConfig, ServiceConfig};
use crate::consistency::{
    CacheFallback, ConsistencyCache, DependentEntityValidator, EntityLookup, LookupSetupError,
};
use crate::domain::{Snapshot, User};
use crate::events::{EventEmitter, EventIngestor};
use crate::http::{orders, users, HttpServer, OrdersState, UsersState};
use crate::lifecycle::Shutdown;
use crate::resilience::{execute, BreakerSettings, CircuitBreaker, RetryError, RetryPolicy};
use crate::store::MemoryStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("dependency lookup setup failed: {0}")]
    Lookup(#[from] LookupSetupError),

    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

/// Everything a service needs from the process around it.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<ServiceConfig>,
    pub connector: Arc<dyn BrokerConnector>,
    pub shutdown: Arc<Shutdown>,
}

/// Connect, open a channel and declare the topic exchange, retrying the lot.
pub async fn connect_broker(
    connector: &dyn BrokerConnector,
    broker: &BrokerConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn Channel>, RetryError<BrokerError>> {
    let policy = RetryPolicy::<BrokerError>::from_config("broker-connect", retry).observe(|attempt| {
        if let Err(e) = attempt.outcome {
            tracing::warn!(
                attempt = attempt.number,
                will_retry = attempt.will_retry,
                error = %e,
                "Broker connection attempt failed"
            );
        }
    });

    execute(&policy, || async move {
        let connection = connector.connect(&broker.url).await?;
        let channel = connection.open_channel().await?;
        channel
            .declare_exchange(&broker.exchange, broker.exchange_kind, true)
            .await?;
        Ok::<_, BrokerError>(channel)
    })
    .await
}

/// Broker bootstrap for `service`; `None` if it gave up or shutdown came first.
async fn bootstrap_broker(
    ctx: &ServiceContext,
    service: &'static str,
    shutdown: &mut broadcast::Receiver<()>,
) -> Option<Arc<dyn Channel>> {
    let config = &ctx.config;
    tokio::select! {
        _ = shutdown.recv() => None,
        result = connect_broker(ctx.connector.as_ref(), &config.broker, &config.retries.connect) => match result {
            Ok(channel) => {
                tracing::info!(service, exchange = %config.broker.exchange, "Broker ready");
                Some(channel)
            }
            Err(e) => {
                tracing::error!(
                    service,
                    attempts = e.attempts(),
                    error = %e,
                    "Broker bootstrap failed, running without events"
                );
                None
            }
        },
    }
}

/// Run the users service until shutdown.
pub async fn serve_users(ctx: ServiceContext, listener: TcpListener) -> Result<(), StartupError> {
    let config = ctx.config.clone();
    let events = Arc::new(EventEmitter::new(config.broker.exchange.clone()));
    let state = UsersState {
        store: Arc::new(MemoryStore::<User>::new()),
        events: events.clone(),
    };

    let mut bootstrap_shutdown = ctx.shutdown.subscribe();
    let bootstrap_ctx = ctx.clone();
    tokio::spawn(async move {
        if let Some(channel) = bootstrap_broker(&bootstrap_ctx, "users", &mut bootstrap_shutdown).await {
            events.attach(channel);
        }
    });

    let server = HttpServer::new("users", users::router(state), &config.timeouts);
    server.run(listener, ctx.shutdown.subscribe()).await?;
    Ok(())
}

/// Bind the orders queue, attach the emitter and consume until shutdown.
///
/// The emitter stays detached if binding fails, so a connected emitter
/// implies a bound queue.
async fn subscribe_orders(
    channel: Arc<dyn Channel>,
    config: &ServiceConfig,
    events: &EventEmitter,
    cache: ConsistencyCache<Snapshot>,
    shutdown: broadcast::Receiver<()>,
) {
    let subscription = &config.orders;
    let bound = EventIngestor::<Snapshot>::bind(
        channel.as_ref(),
        &config.broker.exchange,
        config.broker.exchange_kind,
        &subscription.queue,
        &subscription.routing_keys,
    )
    .await;
    match bound {
        Ok(stream) => {
            events.attach(channel);
            EventIngestor::new(cache).run(stream, shutdown).await
        }
        Err(e) => tracing::error!(
            queue = %subscription.queue,
            error = %e,
            "Failed to bind event ingestor, running without events"
        ),
    }
}

/// Run the orders service until shutdown.
pub async fn serve_orders(ctx: ServiceContext, listener: TcpListener) -> Result<(), StartupError> {
    let config = ctx.config.clone();
    let users_cache = ConsistencyCache::<Snapshot>::new();

    let lookup = EntityLookup::from_config(&config.dependency, &config.retries.validation)?;
    let breaker = CircuitBreaker::new(
        "users",
        BreakerSettings::from(&config.breaker),
        lookup,
        CacheFallback::new(users_cache.clone()),
    );
    let events = Arc::new(EventEmitter::new(config.broker.exchange.clone()));
    let state = OrdersState {
        store: Arc::new(MemoryStore::new()),
        events: events.clone(),
        validator: Arc::new(DependentEntityValidator::new(breaker)),
        users: users_cache.clone(),
    };

    let mut bootstrap_shutdown = ctx.shutdown.subscribe();
    let bootstrap_ctx = ctx.clone();
    tokio::spawn(async move {
        let Some(channel) = bootstrap_broker(&bootstrap_ctx, "orders", &mut bootstrap_shutdown).await else {
            return;
        };
        subscribe_orders(channel, &bootstrap_ctx.config, &events, users_cache, bootstrap_shutdown).await;
    });

    let server = HttpServer::new("orders", orders::router(state), &config.timeouts);
    server.run(listener, ctx.shutdown.subscribe()).await?;
    Ok(())
}
