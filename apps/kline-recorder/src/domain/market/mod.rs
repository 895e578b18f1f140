//! Market Data Types
//!
//! Core domain types for recorded market data: validated symbols, kline
//! intervals, decoded feed updates and persisted observations.
//!
//! # Symbols
//!
//! A [`Symbol`] is the only way a ticker reaches the store or an upstream
//! URL. Parsing normalizes to uppercase and rejects anything that is not
//! 1 to 20 ASCII alphanumerics, so path parameters can never smuggle SQL or
//! URL fragments through.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum accepted symbol length.
pub const MAX_SYMBOL_LEN: usize = 20;

// =============================================================================
// Symbol
// =============================================================================

/// An exchange-traded instrument identifier (e.g. `BTCUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError`] if the input is empty, too long, or contains
    /// anything other than ASCII letters and digits.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }
        if trimmed.len() > MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong(trimmed.len()));
        }
        if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(SymbolError::InvalidCharacter(c));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Uppercase form, as stored and served.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used in Binance stream names.
    #[must_use]
    pub fn stream_name(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Symbol validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Empty or whitespace-only input.
    #[error("symbol is empty")]
    Empty,
    /// Longer than [`MAX_SYMBOL_LEN`].
    #[error("symbol is {0} characters long (max {MAX_SYMBOL_LEN})")]
    TooLong(usize),
    /// Contains a non-alphanumeric character.
    #[error("symbol contains invalid character {0:?}")]
    InvalidCharacter(char),
}

// =============================================================================
// Kline Interval
// =============================================================================

/// Binance kline interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KlineInterval {
    /// 1 second.
    OneSecond,
    /// 1 minute.
    #[default]
    OneMinute,
    /// 3 minutes.
    ThreeMinutes,
    /// 5 minutes.
    FiveMinutes,
    /// 15 minutes.
    FifteenMinutes,
    /// 30 minutes.
    ThirtyMinutes,
    /// 1 hour.
    OneHour,
    /// 2 hours.
    TwoHours,
    /// 4 hours.
    FourHours,
    /// 6 hours.
    SixHours,
    /// 8 hours.
    EightHours,
    /// 12 hours.
    TwelveHours,
    /// 1 day.
    OneDay,
    /// 3 days.
    ThreeDays,
    /// 1 week.
    OneWeek,
    /// 1 month.
    OneMonth,
}

impl KlineInterval {
    /// Wire code used by Binance (`1m`, `1d`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneSecond => "1s",
            Self::OneMinute => "1m",
            Self::ThreeMinutes => "3m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::TwoHours => "2h",
            Self::FourHours => "4h",
            Self::SixHours => "6h",
            Self::EightHours => "8h",
            Self::TwelveHours => "12h",
            Self::OneDay => "1d",
            Self::ThreeDays => "3d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1M",
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KlineInterval {
    type Err = IntervalError;

    // Case-sensitive: `1m` is a minute, `1M` a month.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = match s.trim() {
            "1s" => Self::OneSecond,
            "1m" => Self::OneMinute,
            "3m" => Self::ThreeMinutes,
            "5m" => Self::FiveMinutes,
            "15m" => Self::FifteenMinutes,
            "30m" => Self::ThirtyMinutes,
            "1h" => Self::OneHour,
            "2h" => Self::TwoHours,
            "4h" => Self::FourHours,
            "6h" => Self::SixHours,
            "8h" => Self::EightHours,
            "12h" => Self::TwelveHours,
            "1d" => Self::OneDay,
            "3d" => Self::ThreeDays,
            "1w" => Self::OneWeek,
            "1M" => Self::OneMonth,
            other => return Err(IntervalError(other.to_string())),
        };
        Ok(interval)
    }
}

/// Unknown interval code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown kline interval: {0:?}")]
pub struct IntervalError(pub String);

// =============================================================================
// Update / Observation
// =============================================================================

/// Decoded form of one feed message, prior to throttling.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Instrument.
    pub symbol: Symbol,
    /// Event time reported by the feed.
    pub event_time: DateTime<Utc>,
    /// Kline interval the figures belong to, when the feed reports it.
    pub interval: Option<KlineInterval>,
    /// Whether the kline is final for its interval.
    pub closed: bool,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close (latest) price.
    pub close: f64,
    /// Base asset volume.
    pub volume: f64,
}

impl Update {
    /// The observation persisted when this update is admitted.
    #[must_use]
    pub fn to_observation(&self) -> Observation {
        Observation {
            symbol: self.symbol.clone(),
            time: self.event_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// One persisted sample for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Instrument.
    pub symbol: Symbol,
    /// Event time, millisecond precision. Ordering key.
    pub time: DateTime<Utc>,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: f64,
}

impl Observation {
    /// Event time as milliseconds since the Unix epoch.
    #[must_use]
    pub fn time_ms(&self) -> i64 {
        self.time.timestamp_millis()
    }

    /// Whether every field satisfies the stored-data invariants.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
            && self.volume >= 0.0
    }
}

/// Convert epoch milliseconds to a UTC timestamp.
#[must_use]
pub fn datetime_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}
