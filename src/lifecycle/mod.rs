//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build service state → Bind HTTP → Background broker bootstrap (retried)
//!         → attach emitter → bind + run ingestor (orders only)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → HTTP servers drain → ingestor loop exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - HTTP is served before the broker is up; events are skipped until then
//! - Broker bootstrap exhaustion is logged, not fatal
//! - Every long-running task subscribes to the same `Shutdown`

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{connect_broker, serve_orders, serve_users, ServiceContext, StartupError};
