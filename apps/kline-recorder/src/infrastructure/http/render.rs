//! Response bodies: JSON rows and CSV attachments.

use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::market::Observation;

/// Naive UTC timestamp with millisecond precision, as served in JSON.
pub const JSON_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Timestamp format in CSV exports.
pub const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const CSV_HEADER: &str = "Time,Open,High,Low,Close,Volume";

/// One observation as served to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObservationRow {
    /// UTC time without offset suffix.
    pub time: String,
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

impl From<&Observation> for ObservationRow {
    fn from(obs: &Observation) -> Self {
        Self {
            time: obs.time.format(JSON_TIME_FORMAT).to_string(),
            open: obs.open,
            high: obs.high,
            low: obs.low,
            close: obs.close,
            volume: obs.volume,
        }
    }
}

/// Convert a series to JSON rows.
#[must_use]
pub fn rows(observations: &[Observation]) -> Vec<ObservationRow> {
    observations.iter().map(ObservationRow::from).collect()
}

/// Render observations as CSV with a header row.
#[must_use]
pub fn to_csv(observations: &[Observation]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + observations.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for obs in observations {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            obs.time.format(CSV_TIME_FORMAT),
            obs.open,
            obs.high,
            obs.low,
            obs.close,
            obs.volume
        ));
    }
    out
}

/// CSV attachment response.
#[must_use]
pub fn csv_attachment(filename: &str, observations: &[Observation]) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", sanitize_filename(filename));
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        to_csv(observations),
    )
        .into_response()
}

/// Keep filename characters that are safe in a quoted header value and on
/// common filesystems.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
