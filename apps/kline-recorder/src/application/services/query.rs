//! Query Service
//!
//! Read-side facade over the series store and the upstream historical
//! source. Store reads are synchronous; HTTP handlers run them on the
//! blocking pool. Nothing is cached.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::ports::{HistoricalFetcher, SeriesStore, StorageError, UpstreamFetchError};
use crate::domain::market::{KlineInterval, Observation, Symbol};

/// Query-path failure.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A required request parameter is absent.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// `start` is after `end`.
    #[error("start {start} is after end {end}")]
    InvalidRange {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested end.
        end: DateTime<Utc>,
    },

    /// Nothing to return for the symbol or period.
    #[error("no data available for {0}")]
    NoData(Symbol),

    /// Store read failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Upstream fetch failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamFetchError),
}

/// Per-symbol line of the status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesStatus {
    /// Stored observation count.
    pub records: u64,
    /// `ok` or `error: <reason>`.
    pub status: String,
}

/// Store reachability in the status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    /// Store answered the probe.
    Connected,
    /// Store probe failed.
    Unavailable,
}

/// Store status across the tracked symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Store reachability.
    pub database: DatabaseStatus,
    /// Per-symbol counts, in tracked order.
    pub symbols: Vec<(Symbol, SeriesStatus)>,
}

/// Read-only query facade.
pub struct QueryService {
    store: Arc<dyn SeriesStore>,
    fetcher: Arc<dyn HistoricalFetcher>,
    upstream_interval: KlineInterval,
    tracked: Vec<Symbol>,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("upstream_interval", &self.upstream_interval)
            .field("tracked", &self.tracked)
            .finish_non_exhaustive()
    }
}

impl QueryService {
    /// Create a query service.
    #[must_use]
    pub fn new(
        store: Arc<dyn SeriesStore>,
        fetcher: Arc<dyn HistoricalFetcher>,
        upstream_interval: KlineInterval,
        tracked: Vec<Symbol>,
    ) -> Self {
        Self {
            store,
            fetcher,
            upstream_interval,
            tracked,
        }
    }

    /// Symbols reported by [`Self::status`].
    #[must_use]
    pub fn tracked(&self) -> &[Symbol] {
        &self.tracked
    }

    /// Most recently stored observation.
    ///
    /// # Errors
    ///
    /// [`QueryError::NoData`] when the series is empty, [`QueryError::Storage`]
    /// when the read fails.
    pub fn latest(&self, symbol: &Symbol) -> Result<Observation, QueryError> {
        self.store
            .latest(symbol)?
            .ok_or_else(|| QueryError::NoData(symbol.clone()))
    }

    /// Full stored series, ascending.
    ///
    /// # Errors
    ///
    /// [`QueryError::NoData`] when the series is empty, [`QueryError::Storage`]
    /// when the read fails.
    pub fn history(&self, symbol: &Symbol) -> Result<Vec<Observation>, QueryError> {
        let series = self.store.range(symbol, None, None)?;
        if series.is_empty() {
            return Err(QueryError::NoData(symbol.clone()));
        }
        Ok(series)
    }

    /// Stored observations within optional inclusive bounds. An empty result
    /// is not an error.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidRange`] when both bounds are given and reversed,
    /// [`QueryError::Storage`] when the read fails.
    pub fn range(
        &self,
        symbol: &Symbol,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, QueryError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(QueryError::InvalidRange { start, end });
            }
        }
        Ok(self.store.range(symbol, start, end)?)
    }

    /// Store reachability and per-symbol counts for the tracked symbols.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        let database = match self.store.ping() {
            Ok(()) => DatabaseStatus::Connected,
            Err(e) => {
                tracing::warn!(error = %e, "Store ping failed");
                DatabaseStatus::Unavailable
            }
        };

        let symbols = self
            .tracked
            .iter()
            .map(|symbol| {
                let status = match self.store.count(symbol) {
                    Ok(records) => SeriesStatus {
                        records,
                        status: "ok".to_string(),
                    },
                    Err(e) => SeriesStatus {
                        records: 0,
                        status: format!("error: {e}"),
                    },
                };
                (symbol.clone(), status)
            })
            .collect();

        StatusReport { database, symbols }
    }

    /// Historical bars from the upstream source. Both bounds are required and
    /// validated before any upstream call.
    ///
    /// # Errors
    ///
    /// [`QueryError::MissingParameter`] or [`QueryError::InvalidRange`] for a
    /// bad request, [`QueryError::NoData`] when the upstream has nothing,
    /// [`QueryError::Upstream`] when the fetch fails.
    pub async fn upstream(
        &self,
        symbol: &Symbol,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, QueryError> {
        let start = start.ok_or(QueryError::MissingParameter("start"))?;
        let end = end.ok_or(QueryError::MissingParameter("end"))?;
        if start > end {
            return Err(QueryError::InvalidRange { start, end });
        }

        tracing::info!(
            symbol = %symbol,
            interval = %self.upstream_interval,
            %start,
            %end,
            "Fetching upstream history"
        );
        let bars = self
            .fetcher
            .fetch_bars(symbol, self.upstream_interval, start, end)
            .await?;

        if bars.is_empty() {
            tracing::warn!(symbol = %symbol, %start, %end, "Upstream returned no bars");
            return Err(QueryError::NoData(symbol.clone()));
        }
        tracing::info!(symbol = %symbol, bars = bars.len(), "Fetched upstream history");
        Ok(bars)
    }
}
