//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace span, timeout)
//!     → users.rs | orders.rs (handlers over store, validator, emitter)
//!     → response.rs (ApiError → status + {"error": ..})
//! ```

pub mod orders;
pub mod request;
pub mod response;
pub mod server;
pub mod users;

pub use orders::OrdersState;
pub use request::X_REQUEST_ID;
pub use response::ApiError;
pub use server::HttpServer;
pub use users::UsersState;
