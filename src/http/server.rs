//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap a service's routes with the shared middleware stack
//! - Bind server to listener
//! - Drain in-flight requests on shutdown
//!
//! # Middleware (outermost first)
//! ```text
//! SetRequestId → Trace (span per request) → PropagateRequestId → Timeout → routes
//! ```

use std::io;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::TimeoutConfig;
use crate::http::request::{make_span, X_REQUEST_ID};

/// HTTP server for one service.
pub struct HttpServer {
    name: &'static str,
    router: Router,
}

impl HttpServer {
    pub fn new(name: &'static str, routes: Router, timeouts: &TimeoutConfig) -> Self {
        Self {
            name,
            router: Self::build_router(routes, timeouts),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(routes: Router, timeouts: &TimeoutConfig) -> Router {
        routes.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()))
                .layer(TimeoutLayer::new(Duration::from_secs(timeouts.request_secs))),
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The fully layered router, for driving the service without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(service = self.name, address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(service = self.name, "HTTP server stopped");
        Ok(())
    }
}
