//! Route handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use super::AppState;
use super::error::ApiError;
use super::params::{DownloadParams, RangeParams, parse_symbol};
use super::render::{ObservationRow, csv_attachment, rows};
use crate::application::services::{DatabaseStatus, SeriesStatus};
use crate::domain::connection::ConnectionState;
use crate::infrastructure::binance::FeedSnapshot;
use crate::infrastructure::metrics::get_metrics_handle;

const NO_DATA: &str = "No data available";
const NO_REALTIME_DATA: &str = "No real-time data available";
const NO_PERIOD_DATA: &str = "No data available for this period";

/// Run a store read on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))
}

/// Seconds since the epoch as a float.
fn unix_timestamp() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let ms = Utc::now().timestamp_millis() as f64;
    ms / 1000.0
}

// =============================================================================
// Stored data
// =============================================================================

/// `GET /api/realtime/{symbol}`
pub async fn realtime(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<ObservationRow>, ApiError> {
    let symbol = parse_symbol(&raw)?;
    let query = Arc::clone(&state.query);
    let latest = blocking(move || query.latest(&symbol))
        .await?
        .map_err(|e| ApiError::from_query(e, NO_DATA))?;
    Ok(Json(ObservationRow::from(&latest)))
}

/// `GET /api/realtime-history/{symbol}`
pub async fn realtime_history(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let symbol = parse_symbol(&raw)?;
    let query = Arc::clone(&state.query);
    let lookup = symbol.clone();
    let series = blocking(move || query.history(&lookup))
        .await?
        .map_err(|e| ApiError::from_query(e, NO_REALTIME_DATA))?;

    if params.wants_csv() {
        return Ok(csv_attachment(
            &format!("{symbol}_realtime_data.csv"),
            &series,
        ));
    }
    Ok(Json(rows(&series)).into_response())
}

/// `GET /api/historical/{symbol}`
pub async fn historical(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Response, ApiError> {
    let symbol = parse_symbol(&raw)?;
    let (start, end) = params.bounds()?;
    let query = Arc::clone(&state.query);
    let lookup = symbol.clone();
    let series = blocking(move || query.range(&lookup, start, end))
        .await?
        .map_err(|e| ApiError::from_query(e, NO_DATA))?;

    if params.wants_csv() {
        let filename = format!(
            "{symbol}_{}_{}.csv",
            params.start_raw().unwrap_or("begin"),
            params.end_raw().unwrap_or("now")
        );
        return Ok(csv_attachment(&filename, &series));
    }
    Ok(Json(rows(&series)).into_response())
}

/// `GET /api/historical-upstream/{symbol}`
pub async fn historical_upstream(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Response, ApiError> {
    let symbol = parse_symbol(&raw)?;
    let (start, end) = params.bounds()?;
    let bars = state
        .query
        .upstream(&symbol, start, end)
        .await
        .map_err(|e| ApiError::from_query(e, NO_PERIOD_DATA))?;

    if params.wants_csv() {
        let filename = format!(
            "{symbol}_historical_{}_{}.csv",
            params.start_raw().unwrap_or_default(),
            params.end_raw().unwrap_or_default()
        );
        return Ok(csv_attachment(&filename, &bars));
    }
    Ok(Json(rows(&bars)).into_response())
}

// =============================================================================
// Health and status
// =============================================================================

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: &'static str,
    /// Seconds since the epoch.
    pub timestamp: f64,
    /// Feed connection state.
    pub stream: ConnectionState,
}

/// `GET /api/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: unix_timestamp(),
        stream: state.feed.get_state(),
    })
}

/// Store and feed status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Store reachability.
    pub database: DatabaseStatus,
    /// Per-symbol record counts.
    pub coins: BTreeMap<String, SeriesStatus>,
    /// Feed counters.
    pub feed: FeedSnapshot,
    /// Seconds since the epoch.
    pub timestamp: f64,
}

/// `GET /api/status`
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let query = Arc::clone(&state.query);
    let report = blocking(move || query.status()).await?;

    Ok(Json(StatusResponse {
        database: report.database,
        coins: report
            .symbols
            .into_iter()
            .map(|(symbol, status)| (symbol.to_string(), status))
            .collect(),
        feed: state.feed.snapshot(),
        timestamp: unix_timestamp(),
    }))
}

/// `GET /metrics`
pub async fn metrics() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}
