//! HTTP server hosting throttled routes.

use axum::{extract::Request, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{protect, ThrottleState};
use crate::error::{FloodgateError, Result};

/// The service's router: a health probe plus a catch-all handler, all behind
/// the throttling middleware.
pub fn app(state: ThrottleState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .fallback(echo);
    protect(router, state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn echo(request: Request) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "method": request.method().as_str(),
        "path": request.uri().path(),
    }))
}

/// HTTP server for the throttled application.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Routes to serve
    router: Router,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self { addr, router }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                FloodgateError::Io(e)
            })
    }
}
