//! HTTP/WebSocket gateway for the ArchaeoScan daemon.
//!
//! The server:
//! - Accepts dashboard WebSockets on `/ws` and registers each one
//! - Serves the auxiliary REST endpoints (health, stream status, ESP32 ingestion)
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  DaemonServer   │
//! │  TcpListener    │
//! │  axum::Router   │
//! └───────┬─────────┘
//!         │ upgrade /ws
//!         ▼
//! ┌─────────────────┐     ┌─────────────────────┐
//! │ stream handler  │────▶│ ConnectionRegistry  │◀──── BroadcastLoop
//! │  (per client)   │     └─────────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Handler errors become JSON error responses, never panics

mod routes;
mod stream;

pub use routes::ApiError;

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::broadcast::BroadcastStatus;
use crate::config::ScandConfig;
use crate::ingest::Esp32Store;
use crate::monitor::ProcessMetrics;
use crate::registry::ConnectionRegistry;

/// Everything request handlers need. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ScandConfig>,
    pub registry: ConnectionRegistry,
    pub broadcast: BroadcastStatus,
    pub esp32: Esp32Store,
    pub metrics: watch::Receiver<ProcessMetrics>,
    /// Source of connection ids
    pub connection_counter: Arc<AtomicU64>,
    /// Cancelled on daemon shutdown; open streams close when it fires
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<ScandConfig>,
        registry: ConnectionRegistry,
        broadcast: BroadcastStatus,
        metrics: watch::Receiver<ProcessMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        let esp32 = Esp32Store::new(config.esp32.online_window_secs);
        Self {
            config,
            registry,
            broadcast,
            esp32,
            metrics,
            connection_counter: Arc::new(AtomicU64::new(0)),
            shutdown,
        }
    }
}

/// Builds the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/ws", get(stream::ws_handler))
        .route("/api/stream/status", get(routes::stream_status))
        .route("/api/stream/latest", get(routes::stream_latest))
        .route("/api/system/status", get(routes::system_status))
        .route("/api/esp32/data", post(routes::esp32_ingest))
        .route("/api/esp32/data/latest", get(routes::esp32_latest))
        .route("/api/esp32/status", get(routes::esp32_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The HTTP/WebSocket gateway.
pub struct DaemonServer {
    bind: SocketAddr,
    state: AppState,
}

impl DaemonServer {
    pub fn new(bind: SocketAddr, state: AppState) -> Self {
        Self { bind, state }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.bind,
                source,
            })?;
        self.serve(listener).await
    }

    /// Serves on an already-bound listener until the shutdown token fires.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener.local_addr().map_err(ServerError::Io)?;
        info!(addr = %local, "Daemon server listening");

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(ServerError::Io)?;

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[source] std::io::Error),
}
