//! Kline Recorder Binary
//!
//! Starts the feed connection and the HTTP API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin kline-recorder
//! ```
//!
//! # Environment Variables
//!
//! - `RECORDER_SYMBOLS`: Comma-separated symbols (default: BTCUSDT,ETHUSDT,BNBUSDT)
//! - `RECORDER_STREAM_INTERVAL`: Subscribed kline interval (default: 1m)
//! - `RECORDER_STREAM_URL`: WebSocket base URL (default: wss://stream.binance.com:9443)
//! - `RECORDER_THROTTLE_WINDOW_SECS`: Min spacing per symbol (default: 10)
//! - `RECORDER_READ_TIMEOUT_SECS`: Reconnect after this much silence (default: 60)
//! - `RECORDER_RECONNECT_*`: Backoff tuning
//! - `RECORDER_DB_PATH`: SQLite file, or `:memory:` (default: recorder.db)
//! - `RECORDER_REST_URL`: REST base URL (default: https://api.binance.com)
//! - `RECORDER_UPSTREAM_INTERVAL`: Interval for upstream history (default: 1d)
//! - `RECORDER_HTTP_TIMEOUT_SECS`: Upstream request timeout (default: 10)
//! - `RECORDER_HTTP_PORT`: HTTP API port (default: 5000)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use kline_recorder::infrastructure::telemetry;
use kline_recorder::{
    ApiServer, AppState, BinanceKlineFetcher, ExponentialBackoff, FeedState, IngestPipeline,
    QueryService, RecorderConfig, StreamConnection, StreamConnectionConfig, SystemClock,
    ThrottleState, init_metrics, open_store,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Kline Recorder");

    let _metrics_handle = init_metrics();

    let config = RecorderConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store = open_store(&config.storage)?;
    let fetcher = Arc::new(BinanceKlineFetcher::new(
        &config.upstream.rest_base_url,
        config.upstream.timeout,
    )?);
    let query = Arc::new(QueryService::new(
        Arc::clone(&store),
        fetcher,
        config.upstream.interval,
        config.feed.symbols.clone(),
    ));

    let pipeline = IngestPipeline::new(
        store,
        Arc::new(SystemClock),
        config.feed.throttle_window,
        ThrottleState::new(),
    );
    let feed_state = Arc::new(FeedState::new());
    let stream_config = StreamConnectionConfig {
        read_timeout: config.feed.read_timeout,
        ..StreamConnectionConfig::new(config.stream_url())
    };
    let connection = StreamConnection::new(
        stream_config,
        pipeline,
        Arc::new(ExponentialBackoff::from_settings(&config.reconnect)),
        Arc::clone(&feed_state),
        shutdown_token.clone(),
    );

    let api_state = Arc::new(AppState::new(query, Arc::clone(&feed_state)));
    let api_server = ApiServer::new(config.server.http_port, api_state, shutdown_token.clone());

    let feed_task = tokio::spawn(connection.run());

    let api_shutdown = shutdown_token.clone();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "HTTP API error");
            api_shutdown.cancel();
        }
    });

    tracing::info!("Kline recorder ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = feed_task.await;
        let _ = api_task.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, exiting anyway"
        );
    }

    tracing::info!("Kline recorder stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RecorderConfig) {
    let symbols: Vec<&str> = config.feed.symbols.iter().map(|s| s.as_str()).collect();
    tracing::info!(
        symbols = ?symbols,
        stream_interval = %config.feed.stream_interval,
        throttle_window_secs = config.feed.throttle_window.as_secs(),
        storage = ?config.storage,
        http_port = config.server.http_port,
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.stream_url(),
        rest_url = %config.upstream.rest_base_url,
        upstream_interval = %config.upstream.interval,
        "Upstream endpoints"
    );
}

fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT, SIGTERM or an internal cancellation.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Internal shutdown requested");
        }
    }

    shutdown_token.cancel();
}
