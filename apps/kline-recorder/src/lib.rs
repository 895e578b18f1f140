#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Kline Recorder - Market Data Recorder
//!
//! Holds one connection to Binance's combined kline WebSocket stream,
//! persists at most one observation per symbol per throttle window, and
//! serves the recorded series (and on-demand upstream history) over HTTP.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `market`: Symbols, intervals, updates, observations
//!   - `feed`: Kline stream frame decoding
//!   - `throttle`: Per-symbol write-rate gate
//!   - `connection`: Feed connection state machine
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Series store, historical fetcher, clock, backoff
//!   - `services`: Ingestion pipeline, query service
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket connection, REST history
//!   - `persistence`: SQLite and in-memory stores
//!   - `http`: Query API, health, status, metrics
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Binance WS ──► decode ──► throttle ──► SeriesStore ◄── QueryService ◄── HTTP
//!                                                            │
//!                                     Binance REST ◄─────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::feed::{DecodeError, MessageDecoder};
pub use domain::market::{KlineInterval, Observation, Symbol, SymbolError, Update};
pub use domain::throttle::{ThrottleGate, ThrottleOutcome, ThrottleState};

// Application
pub use application::ports::{
    BackoffPolicy, Clock, HistoricalFetcher, ManualClock, SeriesStore, StorageError, SystemClock,
    UpstreamFetchError,
};
pub use application::services::{IngestOutcome, IngestPipeline, QueryError, QueryService};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FeedSettings, ReconnectSettings, RecorderConfig, ServerSettings,
    StorageLocation, UpstreamSettings,
};

// Feed and history adapters
pub use infrastructure::binance::{
    BinanceKlineFetcher, ExponentialBackoff, FeedState, FixedDelay, StreamConnection,
    StreamConnectionConfig,
};

// Stores
pub use infrastructure::persistence::{InMemorySeriesStore, SqliteSeriesStore, open_store};

// HTTP API
pub use infrastructure::http::{ApiServer, ApiServerError, AppState, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
