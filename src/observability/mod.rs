//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, opt-in)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never interpolated strings, for anything queryable
//! - Request ID (x-request-id) flows through the HTTP trace spans
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
