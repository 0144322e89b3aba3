//! HTTP exporter that reads live counters from a session handle.
//!
//! Every scrape asks the controller for a fresh [`SessionStats`] snapshot,
//! so there is no polling task. The server holds a [`CameraSession`]
//! clone, which keeps the controller alive; stop it through the shutdown
//! future passed to [`MetricsServer::serve`] before dropping the last
//! handle elsewhere.

use crate::metrics::MetricsRegistry;
use crate::session::{CameraSession, SessionStats};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Errors from running the exporter.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind metrics address: {0}")]
    Bind(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("metrics server error: {0}")]
    Server(String),
}

/// Where the exporter listens.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind to. Loopback only by default.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(9090)
    }
}

impl MetricsServerConfig {
    /// Loopback address on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], port).into(),
        }
    }
}

#[derive(Clone)]
struct Exporter {
    registry: Arc<MetricsRegistry>,
    session: CameraSession,
}

impl Exporter {
    async fn snapshot(&self) -> Option<SessionStats> {
        let stats = self.session.stats().await.ok()?;
        self.registry.update(&stats);
        Some(stats)
    }
}

/// Serves `/metrics`, `/session` and `/health` for one controller.
pub struct MetricsServer {
    config: MetricsServerConfig,
    exporter: Exporter,
}

impl MetricsServer {
    /// Creates an exporter over `session`.
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry, session: CameraSession) -> Self {
        Self {
            config,
            exporter: Exporter {
                registry: Arc::new(registry),
                session,
            },
        }
    }

    fn router(self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/session", get(session_handler))
            .route("/health", get(health_handler))
            .with_state(self.exporter)
    }

    /// Binds and serves until `shutdown` resolves.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.config.bind_addr;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "metrics exporter listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::info!("metrics exporter stopped");
        Ok(())
    }
}

/// Prometheus text exposition.
async fn metrics_handler(State(exporter): State<Exporter>) -> impl IntoResponse {
    if exporter.snapshot().await.is_none() {
        tracing::debug!("controller gone, serving last known counters");
    }
    match exporter.registry.encode() {
        Ok(body) => (StatusCode::OK, [("content-type", TEXT_FORMAT)], body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Raw counters as JSON.
async fn session_handler(State(exporter): State<Exporter>) -> impl IntoResponse {
    match exporter.snapshot().await {
        Some(stats) => Ok(Json(stats)),
        None => Err((StatusCode::SERVICE_UNAVAILABLE, "camera controller stopped")),
    }
}

async fn health_handler(State(exporter): State<Exporter>) -> impl IntoResponse {
    let state = exporter.session.state().await;
    (StatusCode::OK, format!("OK session={state}"))
}
