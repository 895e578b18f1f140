//! HTTP API
//!
//! JSON and CSV read endpoints over the recorded series, plus health,
//! status and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /api/realtime/{symbol}` - latest stored observation
//! - `GET /api/realtime-history/{symbol}` - full stored series
//! - `GET /api/historical/{symbol}?start=&end=` - stored series in a range
//! - `GET /api/historical-upstream/{symbol}?start=&end=` - bars fetched
//!   from the exchange (alias `/api/historical-binance/{symbol}`)
//! - `GET /api/health` - liveness and feed state
//! - `GET /api/status` - store status and counts (alias `/api/database-status`)
//! - `GET /metrics` - Prometheus metrics
//!
//! Series endpoints accept `download=csv` for a CSV attachment.

mod error;
mod handlers;
mod params;
mod render;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use params::{Bound, parse_time_param};
pub use render::{ObservationRow, to_csv};

use crate::application::services::QueryService;
use crate::infrastructure::binance::FeedState;

// =============================================================================
// State
// =============================================================================

/// Shared handler state.
#[derive(Debug)]
pub struct AppState {
    /// Read facade.
    pub query: Arc<QueryService>,
    /// Live feed state, for health and status.
    pub feed: Arc<FeedState>,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub const fn new(query: Arc<QueryService>, feed: Arc<FeedState>) -> Self {
        Self { query, feed }
    }
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/realtime/{symbol}", get(handlers::realtime))
        .route(
            "/api/realtime-history/{symbol}",
            get(handlers::realtime_history),
        )
        .route("/api/historical/{symbol}", get(handlers::historical))
        .route(
            "/api/historical-upstream/{symbol}",
            get(handlers::historical_upstream),
        )
        .route(
            "/api/historical-binance/{symbol}",
            get(handlers::historical_upstream),
        )
        .route("/api/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route("/api/database-status", get(handlers::status))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// HTTP API server.
pub struct ApiServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind all interfaces and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if binding fails or the server hits a fatal
    /// error while running.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError::ServerFailed` on a fatal server error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ApiServerError> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "HTTP API listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP API stopped");
        Ok(())
    }
}

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
