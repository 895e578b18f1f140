//! Query parameter parsing: symbols, time bounds, download flags.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;

use super::error::ApiError;
use crate::domain::market::Symbol;

/// `?start=&end=&download=` query string.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    /// Lower bound, inclusive.
    pub start: Option<String>,
    /// Upper bound, inclusive.
    pub end: Option<String>,
    /// `csv` selects a CSV attachment.
    pub download: Option<String>,
}

impl RangeParams {
    /// Whether a CSV attachment was requested.
    #[must_use]
    pub fn wants_csv(&self) -> bool {
        wants_csv(self.download.as_deref())
    }

    /// Raw `start`, treating an empty value as absent.
    #[must_use]
    pub fn start_raw(&self) -> Option<&str> {
        non_empty(self.start.as_deref())
    }

    /// Raw `end`, treating an empty value as absent.
    #[must_use]
    pub fn end_raw(&self) -> Option<&str> {
        non_empty(self.end.as_deref())
    }

    /// Parsed `(start, end)` bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadRequest`] if a present bound does not parse.
    pub fn bounds(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), ApiError> {
        let start = self
            .start_raw()
            .map(|raw| parse_time_param(raw, Bound::Start))
            .transpose()?;
        let end = self
            .end_raw()
            .map(|raw| parse_time_param(raw, Bound::End))
            .transpose()?;
        Ok((start, end))
    }
}

/// `?download=` query string.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    /// `csv` selects a CSV attachment.
    pub download: Option<String>,
}

impl DownloadParams {
    /// Whether a CSV attachment was requested.
    #[must_use]
    pub fn wants_csv(&self) -> bool {
        wants_csv(self.download.as_deref())
    }
}

fn wants_csv(download: Option<&str>) -> bool {
    download.is_some_and(|d| d.eq_ignore_ascii_case("csv"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Which end of a range a date-only value stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Midnight at the start of the day.
    Start,
    /// Last millisecond of the day.
    End,
}

/// Validate a symbol path segment.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] if the symbol is invalid.
pub fn parse_symbol(raw: &str) -> Result<Symbol, ApiError> {
    Symbol::parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid symbol: {e}")))
}

/// Parse a time bound. Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.fff]`,
/// `YYYY-MM-DD HH:MM:SS[.fff]` (UTC) or a bare date.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] if no format matches.
pub fn parse_time_param(raw: &str, bound: Bound) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = match bound {
            Bound::Start => NaiveTime::MIN,
            Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
        };
        return Ok(date.and_time(time).and_utc());
    }

    Err(ApiError::BadRequest(format!(
        "Invalid date {raw:?}; expected YYYY-MM-DD, YYYY-MM-DD HH:MM:SS or RFC 3339"
    )))
}
