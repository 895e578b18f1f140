//! Kline Stream Connection
//!
//! Maintains the combined-stream WebSocket to Binance and drives every text
//! frame through the [`IngestPipeline`].
//!
//! # Stream URL
//!
//! `wss://stream.binance.com:9443/stream?streams=btcusdt@kline_1m/ethusdt@kline_1m`
//!
//! # Lifecycle
//!
//! The connection never gives up: any read error, close frame, end of
//! stream or read-idle timeout drops back to `Disconnected`, waits for the
//! backoff delay and reconnects. Cancellation is honoured in every state and
//! ends in `Terminated`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::ports::BackoffPolicy;
use crate::application::services::{IngestOutcome, IngestPipeline};
use crate::domain::connection::ConnectionState;
use crate::domain::market::{KlineInterval, Symbol};
use crate::infrastructure::metrics;

/// Build the combined-stream URL for `symbols` at `interval`.
#[must_use]
pub fn combined_stream_url(base: &str, symbols: &[Symbol], interval: KlineInterval) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@kline_{interval}", s.stream_name()))
        .collect();
    format!(
        "{}/stream?streams={}",
        base.trim_end_matches('/'),
        streams.join("/")
    )
}

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a stream session ended.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// WebSocket protocol or transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Handshake did not complete in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No frame arrived within the read timeout.
    #[error("no frame received for {0:?}")]
    ReadTimeout(Duration),

    /// Server sent a close frame.
    #[error("server closed connection: {0}")]
    ClosedByServer(String),

    /// Stream ended without a close frame.
    #[error("stream ended")]
    StreamEnded,
}

impl StreamError {
    /// Label used in metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "websocket",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::ReadTimeout(_) => "read_timeout",
            Self::ClosedByServer(_) => "closed_by_server",
            Self::StreamEnded => "stream_ended",
        }
    }
}

// =============================================================================
// Feed State Tracking
// =============================================================================

/// Point-in-time copy of [`FeedState`].
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Last successful connect.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Reason the last session ended.
    pub last_error: Option<String>,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Text frames received.
    pub frames_received: u64,
    /// Observations appended.
    pub observations_stored: u64,
    /// Updates dropped by the throttle.
    pub updates_throttled: u64,
    /// Frames that failed to decode.
    pub decode_failures: u64,
    /// Admitted updates whose append failed.
    pub store_failures: u64,
}

/// Connection status shared between the stream task and readers.
#[derive(Debug)]
pub struct FeedState {
    state: watch::Sender<ConnectionState>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_error: parking_lot::RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    frames_received: AtomicU64,
    observations_stored: AtomicU64,
    updates_throttled: AtomicU64,
    decode_failures: AtomicU64,
    store_failures: AtomicU64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedState {
    /// Create state in `Disconnected`.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            last_connected_at: parking_lot::RwLock::new(None),
            last_error: parking_lot::RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            frames_received: AtomicU64::new(0),
            observations_stored: AtomicU64::new(0),
            updates_throttled: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
        }
    }

    /// Set the connection state and notify watchers.
    pub fn set_state(&self, next: ConnectionState) {
        let previous = *self.state.borrow();
        if previous != next && !previous.can_transition_to(next) {
            tracing::warn!(from = %previous, to = %next, "Unexpected connection state transition");
        }
        if next == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            self.reconnect_attempts.store(0, Ordering::Relaxed);
            *self.last_error.write() = None;
        }
        self.state.send_replace(next);
        metrics::set_connection_state(next);
    }

    /// Record why the last session ended.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Increment reconnect attempts, returning the previous count.
    pub fn increment_reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed)
    }

    /// Count a received text frame.
    pub fn increment_frames(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an ingestion outcome.
    pub fn record_outcome(&self, outcome: &IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Stored(_) => &self.observations_stored,
            IngestOutcome::Throttled(_) => &self.updates_throttled,
            IngestOutcome::DecodeFailed => &self.decode_failures,
            IngestOutcome::StoreFailed(_) => &self.store_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn get_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Reconnect attempts since the last successful connect.
    #[must_use]
    pub fn get_reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Observations appended so far.
    #[must_use]
    pub fn get_observations_stored(&self) -> u64 {
        self.observations_stored.load(Ordering::Relaxed)
    }

    /// Copy every field.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            state: self.get_state(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            reconnect_attempts: self.get_reconnect_attempts(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            observations_stored: self.get_observations_stored(),
            updates_throttled: self.updates_throttled.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Stream Connection
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone)]
pub struct StreamConnectionConfig {
    /// Full combined-stream URL.
    pub url: String,
    /// Handshake deadline.
    pub connect_timeout: Duration,
    /// Maximum silence before the connection is considered dead.
    pub read_timeout: Duration,
}

impl StreamConnectionConfig {
    /// Create a configuration with the default timeouts.
    #[must_use]
    pub const fn new(url: String) -> Self {
        Self {
            url,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Long-lived feed connection.
///
/// Manages the connection lifecycle including:
/// - Handshake with cancellation and timeout
/// - Read-idle detection
/// - Automatic reconnection through a [`BackoffPolicy`]
/// - Clean close on shutdown
pub struct StreamConnection {
    config: StreamConnectionConfig,
    pipeline: IngestPipeline,
    backoff: Arc<dyn BackoffPolicy>,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl StreamConnection {
    /// Create a connection; nothing happens until [`Self::run`].
    #[must_use]
    pub fn new(
        config: StreamConnectionConfig,
        pipeline: IngestPipeline,
        backoff: Arc<dyn BackoffPolicy>,
        state: Arc<FeedState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            pipeline,
            backoff,
            state,
            cancel,
        }
    }

    /// Shared state handle.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run until cancelled.
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.connect_and_run(&cancel).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Kline stream session ended");
                    metrics::record_stream_error(e.kind());
                    self.state.set_error(e.to_string());
                    self.state.set_state(ConnectionState::Disconnected);

                    let attempt = self.state.increment_reconnect_attempts();
                    let delay = self.backoff.delay(attempt);
                    metrics::record_reconnect();
                    tracing::info!(
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Reconnecting to kline stream"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => {
                            tracing::info!("Kline stream cancelled during reconnect delay");
                            break;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if self.state.get_state() != ConnectionState::Closing {
            self.state.set_state(ConnectionState::Closing);
        }
        self.state.set_state(ConnectionState::Terminated);
        tracing::info!("Kline stream terminated");
    }

    /// One session: connect, then read until failure or cancellation.
    /// `Ok` means cancelled.
    async fn connect_and_run(&mut self, cancel: &CancellationToken) -> Result<(), StreamError> {
        self.state.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to kline stream");

        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(self.config.url.as_str()),
        );
        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = connect => result
                .map_err(|_| StreamError::ConnectTimeout(self.config.connect_timeout))??,
        };

        self.state.set_state(ConnectionState::Connected);
        tracing::info!("Kline stream connected");

        let (mut write, mut read) = ws_stream.split();
        let read_timeout = self.config.read_timeout;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.state.set_state(ConnectionState::Closing);
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Close frame not sent");
                    }
                    return Ok(());
                }
                next = tokio::time::timeout(read_timeout, read.next()) => {
                    match next {
                        Err(_) => return Err(StreamError::ReadTimeout(read_timeout)),
                        Ok(Some(Ok(Message::Text(text)))) => {
                            self.state.increment_frames();
                            metrics::record_frame_received();
                            let outcome =
                                run_blocking(|| self.pipeline.process_frame(text.as_str()));
                            self.state.record_outcome(&outcome);
                            metrics::record_ingest_outcome(&outcome);
                        }
                        Ok(Some(Ok(Message::Ping(data)))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Ok(Some(Ok(Message::Close(frame)))) => {
                            let reason = frame.map_or_else(
                                || "no reason".to_string(),
                                |f| format!("{} {}", f.code, f.reason.as_str()),
                            );
                            return Err(StreamError::ClosedByServer(reason));
                        }
                        Ok(Some(Ok(_))) => {
                            // Binary, pong and raw frames carry nothing for us.
                        }
                        Ok(Some(Err(e))) => return Err(e.into()),
                        Ok(None) => return Err(StreamError::StreamEnded),
                    }
                }
            }
        }
    }
}

/// Runs a synchronous store write without parking the other tasks on this worker.
///
/// `block_in_place` only exists on the multi-thread scheduler; a current-thread
/// runtime runs the closure inline.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(tokio::runtime::RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}
