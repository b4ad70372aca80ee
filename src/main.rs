//! Resilient services (v1)
//!
//! Runs the users service, the orders service, or both in one process.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────┐   GET /{id} (breaker + retries)   ┌──────────────────┐
//!   POST /orders  │  orders service  │──────────────────────────────────▶│  users service   │
//!  ──────────────▶│                  │                                   │                  │
//!                 │  validator       │                                   │  store (users)   │
//!                 │  cache ◀── ingestor ◀── orders.q ◀── app.topic ◀──────│  emitter         │
//!                 │  emitter ───────────────────────────▶ app.topic       └──────────────────┘
//!                 └──────────────────┘
//! ```
//!
//! The broker is in-process: events only flow between services sharing a
//! process, which is what `all` runs.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use resilient_services::broker::{redact_url, BrokerConnector, MemoryConnector};
use resilient_services::config::loader;
use resilient_services::lifecycle::{serve_orders, serve_users, signals, ServiceContext, Shutdown};
use resilient_services::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "resilient-services", version, about = "Users and orders services")]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Run the users service.
    Users,
    /// Run the orders service.
    Orders,
    /// Run both services sharing one broker.
    All,
}

impl Role {
    /// Whether both services share this process's in-memory broker.
    fn shares_broker(self) -> bool {
        matches!(self, Role::All)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = loader::load(cli.config.as_deref())?;
    logging::init_logging(&config.observability)?;

    tracing::info!("resilient-services v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        users = %config.users.bind_address,
        orders = %config.orders.bind_address,
        dependency = %config.dependency.base_url,
        exchange = %config.broker.exchange,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    if !cli.role.shares_broker() {
        tracing::warn!(
            broker = %redact_url(&config.broker.url),
            "Broker is in-process: events will not reach a service in another process, \
             the orders cache stays cold unless both run under `all`"
        );
    }

    let connector: Arc<dyn BrokerConnector> = Arc::new(MemoryConnector::default());
    let ctx = ServiceContext {
        config: Arc::new(config),
        connector,
        shutdown,
    };

    match cli.role {
        Role::Users => {
            let listener = TcpListener::bind(&ctx.config.users.bind_address).await?;
            serve_users(ctx, listener).await?;
        }
        Role::Orders => {
            let listener = TcpListener::bind(&ctx.config.orders.bind_address).await?;
            serve_orders(ctx, listener).await?;
        }
        Role::All => {
            let users = TcpListener::bind(&ctx.config.users.bind_address).await?;
            let orders = TcpListener::bind(&ctx.config.orders.bind_address).await?;
            tokio::try_join!(serve_users(ctx.clone(), users), serve_orders(ctx, orders))?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
