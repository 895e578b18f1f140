//! Historical Fetcher Port (Driven Port)
//!
//! Interface for pulling historical bars from an upstream market-data API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::market::{KlineInterval, Observation, Symbol};

/// Upstream source of historical bars.
#[async_trait]
pub trait HistoricalFetcher: Send + Sync {
    /// Bars for `symbol` at `interval` opening within `[start, end]`,
    /// ascending by open time.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFetchError`] if the upstream is unreachable, answers
    /// with a non-success status, or returns an unreadable body.
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, UpstreamFetchError>;
}

/// Upstream fetch failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamFetchError {
    /// Network or timeout failure.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("upstream returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The range needs more pages than one request may fetch.
    #[error("requested range exceeds {pages} upstream pages; narrow the range")]
    RangeTooLarge {
        /// Pages fetched before giving up.
        pages: usize,
    },

    /// Body did not have the expected shape.
    #[error("unexpected upstream payload: {0}")]
    Malformed(String),
}
