//! Recorder Configuration Settings
//!
//! Configuration types for the recorder, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::market::{KlineInterval, Symbol, SymbolError};
use crate::domain::throttle::DEFAULT_THROTTLE_WINDOW;
use crate::infrastructure::binance::stream::combined_stream_url;

/// Symbols recorded when `RECORDER_SYMBOLS` is unset.
pub const DEFAULT_SYMBOLS: [&str; 3] = ["BTCUSDT", "ETHUSDT", "BNBUSDT"];

/// Value of `RECORDER_DB_PATH` that selects the in-memory store.
pub const IN_MEMORY_DB_PATH: &str = ":memory:";

/// Feed subscription and ingestion settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Tracked symbols, deduplicated, in configuration order.
    pub symbols: Vec<Symbol>,
    /// Kline interval subscribed on the stream.
    pub stream_interval: KlineInterval,
    /// WebSocket base URL (scheme, host, port).
    pub stream_base_url: String,
    /// Minimum spacing between persisted observations per symbol.
    pub throttle_window: Duration,
    /// Reconnect when no frame arrives for this long.
    pub read_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS
                .iter()
                .filter_map(|s| Symbol::parse(s).ok())
                .collect(),
            stream_interval: KlineInterval::OneMinute,
            stream_base_url: "wss://stream.binance.com:9443".to_string(),
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub delay_multiplier: f64,
    /// Jitter as a fraction of the delay.
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_secs(1),
            delay_max: Duration::from_secs(60),
            delay_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Where observations are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// SQLite database file.
    File(PathBuf),
    /// Process-local memory; lost on exit.
    Memory,
}

impl StorageLocation {
    /// Interpret a `RECORDER_DB_PATH` value.
    #[must_use]
    pub fn from_path_str(path: &str) -> Self {
        if path.trim() == IN_MEMORY_DB_PATH {
            Self::Memory
        } else {
            Self::File(PathBuf::from(path))
        }
    }
}

impl Default for StorageLocation {
    fn default() -> Self {
        Self::File(PathBuf::from("recorder.db"))
    }
}

/// Upstream REST settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// REST base URL.
    pub rest_base_url: String,
    /// Bar interval requested for upstream history.
    pub interval: KlineInterval,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            rest_base_url: "https://api.binance.com".to_string(),
            interval: KlineInterval::OneDay,
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP API port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 5000 }
    }
}

/// Complete recorder configuration.
#[derive(Debug, Clone, Default)]
pub struct RecorderConfig {
    /// Feed settings.
    pub feed: FeedSettings,
    /// Reconnect settings.
    pub reconnect: ReconnectSettings,
    /// Storage location.
    pub storage: StorageLocation,
    /// Upstream REST settings.
    pub upstream: UpstreamSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl RecorderConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a symbol or interval variable is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a symbol or interval value is invalid, or a URL
    /// is set to an empty string.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let feed_defaults = FeedSettings::default();
        let symbols = match lookup("RECORDER_SYMBOLS") {
            Some(raw) => parse_symbols(&raw)?,
            None => feed_defaults.symbols,
        };

        let feed = FeedSettings {
            symbols,
            stream_interval: parse_env_interval(
                lookup,
                "RECORDER_STREAM_INTERVAL",
                feed_defaults.stream_interval,
            )?,
            stream_base_url: parse_env_url(
                lookup,
                "RECORDER_STREAM_URL",
                feed_defaults.stream_base_url,
            )?,
            throttle_window: parse_env_duration_secs(
                lookup,
                "RECORDER_THROTTLE_WINDOW_SECS",
                feed_defaults.throttle_window,
            ),
            read_timeout: parse_env_duration_secs(
                lookup,
                "RECORDER_READ_TIMEOUT_SECS",
                feed_defaults.read_timeout,
            ),
        };

        let reconnect = ReconnectSettings {
            delay_initial: parse_env_duration_millis(
                lookup,
                "RECORDER_RECONNECT_DELAY_INITIAL_MS",
                ReconnectSettings::default().delay_initial,
            ),
            delay_max: parse_env_duration_secs(
                lookup,
                "RECORDER_RECONNECT_DELAY_MAX_SECS",
                ReconnectSettings::default().delay_max,
            ),
            delay_multiplier: parse_env_f64(
                lookup,
                "RECORDER_RECONNECT_DELAY_MULTIPLIER",
                ReconnectSettings::default().delay_multiplier,
            ),
            jitter_factor: parse_env_f64(
                lookup,
                "RECORDER_RECONNECT_JITTER",
                ReconnectSettings::default().jitter_factor,
            ),
        };

        let storage = lookup("RECORDER_DB_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(|path| StorageLocation::from_path_str(&path))
            .unwrap_or_default();

        let upstream_defaults = UpstreamSettings::default();
        let upstream = UpstreamSettings {
            rest_base_url: parse_env_url(
                lookup,
                "RECORDER_REST_URL",
                upstream_defaults.rest_base_url,
            )?,
            interval: parse_env_interval(
                lookup,
                "RECORDER_UPSTREAM_INTERVAL",
                upstream_defaults.interval,
            )?,
            timeout: parse_env_duration_secs(
                lookup,
                "RECORDER_HTTP_TIMEOUT_SECS",
                upstream_defaults.timeout,
            ),
        };

        let server = ServerSettings {
            http_port: parse_env_u16(
                lookup,
                "RECORDER_HTTP_PORT",
                ServerSettings::default().http_port,
            ),
        };

        Ok(Self {
            feed,
            reconnect,
            storage,
            upstream,
            server,
        })
    }

    /// Combined-stream URL covering every tracked symbol.
    #[must_use]
    pub fn stream_url(&self) -> String {
        combined_stream_url(
            &self.feed.stream_base_url,
            &self.feed.symbols,
            self.feed.stream_interval,
        )
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configured symbol failed validation.
    #[error("invalid symbol {value:?} in RECORDER_SYMBOLS: {source}")]
    InvalidSymbol {
        /// Raw entry.
        value: String,
        /// Validation failure.
        source: SymbolError,
    },
    /// The symbol list is empty.
    #[error("RECORDER_SYMBOLS must name at least one symbol")]
    NoSymbols,
    /// Unknown interval code.
    #[error("environment variable {key} has unknown kline interval {value:?}")]
    InvalidInterval {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_symbols(raw: &str) -> Result<Vec<Symbol>, ConfigError> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for entry in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let symbol = Symbol::parse(entry).map_err(|source| ConfigError::InvalidSymbol {
            value: entry.trim().to_string(),
            source,
        })?;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    if symbols.is_empty() {
        return Err(ConfigError::NoSymbols);
    }
    Ok(symbols)
}

fn parse_env_interval(
    lookup: Lookup<'_>,
    key: &str,
    default: KlineInterval,
) -> Result<KlineInterval, ConfigError> {
    match lookup(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidInterval {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_env_url(lookup: Lookup<'_>, key: &str, default: String) -> Result<String, ConfigError> {
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(value) => Ok(value.trim().trim_end_matches('/').to_string()),
        None => Ok(default),
    }
}

fn parse_env_u16(lookup: Lookup<'_>, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(lookup: Lookup<'_>, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
}

fn parse_env_duration_secs(lookup: Lookup<'_>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(lookup: Lookup<'_>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
