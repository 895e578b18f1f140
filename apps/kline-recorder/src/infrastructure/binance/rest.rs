//! Binance REST History Adapter
//!
//! Implements [`HistoricalFetcher`] over `GET /api/v3/klines`, paging through
//! ranges longer than one response.
//!
//! # Response Rows
//!
//! ```json
//! [[1699920000000, "36500.00", "37200.00", "36100.00", "37050.10", "25432.1", 1700006399999, ...]]
//! ```
//!
//! Only the open time and the five OHLCV columns are used.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::application::ports::{HistoricalFetcher, UpstreamFetchError};
use crate::domain::market::{KlineInterval, Observation, Symbol, datetime_from_millis};
use crate::infrastructure::metrics::{self, FetchOutcome};

/// Largest page Binance serves.
pub const MAX_PAGE_LIMIT: u16 = 1000;

// Hard stop against an upstream that keeps returning full pages.
const MAX_PAGES: usize = 500;

/// Binance kline history client.
#[derive(Debug, Clone)]
pub struct BinanceKlineFetcher {
    client: reqwest::Client,
    base_url: String,
    page_limit: u16,
}

impl BinanceKlineFetcher {
    /// Create a client for `base_url` (e.g. `https://api.binance.com`).
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFetchError::Transport`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamFetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_limit: MAX_PAGE_LIMIT,
        })
    }

    /// Override the page size (clamped to `1..=1000`).
    #[must_use]
    pub fn with_page_limit(mut self, limit: u16) -> Self {
        self.page_limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    async fn fetch_page(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Vec<Value>>, UpstreamFetchError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.as_str().to_string()),
                ("interval", interval.as_str().to_string()),
                ("startTime", start_ms.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", self.page_limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| UpstreamFetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamFetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamFetchError::Malformed(e.to_string()))
    }

    async fn fetch_all(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, UpstreamFetchError> {
        let end_ms = end.timestamp_millis();
        let mut cursor = start.timestamp_millis();
        let mut bars = Vec::new();

        for _ in 0..MAX_PAGES {
            if cursor > end_ms {
                return Ok(bars);
            }
            let page = self.fetch_page(symbol, interval, cursor, end_ms).await?;
            let page_len = page.len();

            let mut last_open_ms = None;
            for row in &page {
                let bar = parse_row(symbol, row)?;
                last_open_ms = Some(bar.time_ms());
                bars.push(bar);
            }

            match last_open_ms {
                Some(last) if page_len >= usize::from(self.page_limit) && last >= cursor => {
                    cursor = last + 1;
                }
                _ => return Ok(bars),
            }
        }

        // Budget spent with the range still open.
        if cursor > end_ms {
            return Ok(bars);
        }
        Err(UpstreamFetchError::RangeTooLarge { pages: MAX_PAGES })
    }
}

#[async_trait]
impl HistoricalFetcher for BinanceKlineFetcher {
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        interval: KlineInterval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, UpstreamFetchError> {
        let started = Instant::now();
        let result = self.fetch_all(symbol, interval, start, end).await;

        let outcome = match &result {
            Ok(_) => FetchOutcome::Success,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "Upstream kline fetch failed");
                FetchOutcome::Failure
            }
        };
        metrics::record_upstream_fetch(outcome, started.elapsed());
        result
    }
}

fn parse_row(symbol: &Symbol, row: &[Value]) -> Result<Observation, UpstreamFetchError> {
    if row.len() < 6 {
        return Err(UpstreamFetchError::Malformed(format!(
            "kline row has {} columns, expected at least 6",
            row.len()
        )));
    }

    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| UpstreamFetchError::Malformed(format!("bad open time {}", row[0])))?;
    let time = datetime_from_millis(open_ms)
        .ok_or_else(|| UpstreamFetchError::Malformed(format!("open time {open_ms} out of range")))?;

    Ok(Observation {
        symbol: symbol.clone(),
        time,
        open: column(row, 1)?,
        high: column(row, 2)?,
        low: column(row, 3)?,
        close: column(row, 4)?,
        volume: column(row, 5)?,
    })
}

fn column(row: &[Value], index: usize) -> Result<f64, UpstreamFetchError> {
    let value = &row[index];
    match value {
        Value::String(text) => text.parse::<f64>().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .ok_or_else(|| UpstreamFetchError::Malformed(format!("column {index} is not a number: {value}")))
}
