//! Resilient services library: a users service, an orders service, and the
//! resilience and consistency layer between them.

pub mod broker;
pub mod config;
pub mod consistency;
pub mod domain;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod store;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{ServiceContext, Shutdown};
