//! Kline Message Decoder
//!
//! Turns raw Binance WebSocket text frames into [`Update`]s.
//!
//! # Wire Format
//!
//! Combined streams wrap each event in an envelope:
//!
//! ```json
//! {"stream":"btcusdt@kline_1m","data":{"e":"kline","E":1700000000123,"s":"BTCUSDT",
//!   "k":{"i":"1m","o":"37000.1","h":"37010.0","l":"36990.5","c":"37005.2","v":"12.5","x":false}}}
//! ```
//!
//! Single-stream connections deliver the `data` object on its own; both forms
//! are accepted. Prices and volume arrive as decimal strings but plain JSON
//! numbers are tolerated.

use serde_json::Value;

use super::market::{Symbol, SymbolError, Update, datetime_from_millis};

/// Frame decoding failure. Never fatal to the stream.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Frame is not valid JSON.
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is JSON but not a kline event object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Event type present but not `kline`.
    #[error("unexpected event type: {0}")]
    UnexpectedEvent(String),

    /// Required field absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Field present but not a number or numeric string.
    #[error("field {field} is not numeric: {value}")]
    InvalidNumber {
        /// Wire field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// Numeric field is NaN or infinite.
    #[error("field {0} is not finite")]
    NonFinite(&'static str),

    /// Volume below zero.
    #[error("negative volume: {0}")]
    NegativeVolume(f64),

    /// Event time outside the representable range.
    #[error("event time out of range: {0}")]
    InvalidTimestamp(i64),

    /// Symbol failed validation.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(#[from] SymbolError),
}

/// Decoder for Binance kline events.
#[derive(Debug, Default, Clone)]
pub struct MessageDecoder;

impl MessageDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the frame is not a well-formed kline event.
    pub fn decode(&self, raw: &str) -> Result<Update, DecodeError> {
        let root: Value = serde_json::from_str(raw.trim())?;
        let event = Self::unwrap_envelope(&root)?;

        if let Some(kind) = event.get("e") {
            let kind = kind.as_str().unwrap_or_default();
            if kind != "kline" {
                return Err(DecodeError::UnexpectedEvent(kind.to_string()));
            }
        }

        let symbol = event
            .get("s")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField("s"))?;
        let symbol = Symbol::parse(symbol)?;

        let event_ms = Self::integer(event, "E")?;
        let event_time =
            datetime_from_millis(event_ms).ok_or(DecodeError::InvalidTimestamp(event_ms))?;

        let kline = event
            .get("k")
            .filter(|k| k.is_object())
            .ok_or(DecodeError::MissingField("k"))?;

        let open = Self::number(kline, "o")?;
        let high = Self::number(kline, "h")?;
        let low = Self::number(kline, "l")?;
        let close = Self::number(kline, "c")?;
        let volume = Self::number(kline, "v")?;
        if volume < 0.0 {
            return Err(DecodeError::NegativeVolume(volume));
        }

        let interval = kline
            .get("i")
            .and_then(Value::as_str)
            .and_then(|code| code.parse().ok());
        let closed = kline.get("x").and_then(Value::as_bool).unwrap_or(false);

        Ok(Update {
            symbol,
            event_time,
            interval,
            closed,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    fn unwrap_envelope(root: &Value) -> Result<&Value, DecodeError> {
        if !root.is_object() {
            return Err(DecodeError::InvalidFormat(format!(
                "expected JSON object, got {}",
                json_kind(root)
            )));
        }
        match root.get("data") {
            Some(data) if data.is_object() => Ok(data),
            Some(other) => Err(DecodeError::InvalidFormat(format!(
                "envelope data is {}",
                json_kind(other)
            ))),
            None => Ok(root),
        }
    }

    fn number(object: &Value, field: &'static str) -> Result<f64, DecodeError> {
        let value = object.get(field).ok_or(DecodeError::MissingField(field))?;
        let parsed = match value {
            Value::String(text) => text.trim().parse::<f64>().ok(),
            Value::Number(number) => number.as_f64(),
            _ => None,
        }
        .ok_or_else(|| DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        })?;

        if parsed.is_finite() {
            Ok(parsed)
        } else {
            Err(DecodeError::NonFinite(field))
        }
    }

    fn integer(object: &Value, field: &'static str) -> Result<i64, DecodeError> {
        let value = object.get(field).ok_or(DecodeError::MissingField(field))?;
        match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        })
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::KlineInterval;
    use test_case::test_case;

    const COMBINED: &str = r#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","E":1700000000123,"s":"BTCUSDT","k":{"t":1699999980000,"T":1700000039999,"s":"BTCUSDT","i":"1m","o":"37000.10","c":"37005.20","h":"37010.00","l":"36990.50","v":"12.5","n":42,"x":false,"q":"462500.0"}}}"#;

    #[test]
    fn decodes_combined_stream_envelope() {
        let update = MessageDecoder::new().decode(COMBINED).unwrap();

        assert_eq!(update.symbol.as_str(), "BTCUSDT");
        assert_eq!(update.event_time.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(update.interval, Some(KlineInterval::OneMinute));
        assert!(!update.closed);
        assert_eq!(update.open, 37000.10);
        assert_eq!(update.high, 37010.0);
        assert_eq!(update.low, 36990.5);
        assert_eq!(update.close, 37005.2);
        assert_eq!(update.volume, 12.5);
    }

    #[test]
    fn decodes_bare_event_with_numeric_fields() {
        let raw = r#"{"e":"kline","E":1700000000000,"s":"ethusdt","k":{"o":2000,"h":2001.5,"l":1999,"c":2000.25,"v":0,"x":true}}"#;
        let update = MessageDecoder::new().decode(raw).unwrap();

        assert_eq!(update.symbol.as_str(), "ETHUSDT");
        assert_eq!(update.close, 2000.25);
        assert_eq!(update.volume, 0.0);
        assert!(update.closed);
        assert_eq!(update.interval, None);
    }

    #[test]
    fn missing_event_type_is_tolerated() {
        let raw = r#"{"data":{"E":1700000000000,"s":"BNBUSDT","k":{"o":"1","h":"1","l":"1","c":"1","v":"1"}}}"#;
        assert!(MessageDecoder::new().decode(raw).is_ok());
    }

    #[test_case("not json" ; "garbage")]
    #[test_case("[1,2,3]" ; "array root")]
    #[test_case(r#"{"data":"x"}"# ; "non-object data")]
    #[test_case(r#"{"result":null,"id":1}"# ; "subscription ack")]
    fn rejects_malformed_frames(raw: &str) {
        assert!(MessageDecoder::new().decode(raw).is_err());
    }

    #[test_case("o", r#""abc""# ; "non-numeric open")]
    #[test_case("c", "null" ; "null close")]
    #[test_case("h", "true" ; "boolean high")]
    fn rejects_non_numeric_price(field: &str, value: &str) {
        let raw = COMBINED.replacen(
            &format!(r#""{field}":"#),
            &format!(r#""{field}":{value},"_{field}":"#),
            1,
        );
        match MessageDecoder::new().decode(&raw) {
            Err(DecodeError::InvalidNumber { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected InvalidNumber, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_volume() {
        let raw = r#"{"e":"kline","E":1,"s":"BTCUSDT","k":{"o":"1","h":"1","l":"1","c":"1"}}"#;
        assert!(matches!(
            MessageDecoder::new().decode(raw),
            Err(DecodeError::MissingField("v"))
        ));
    }

    #[test]
    fn rejects_missing_kline_object() {
        let raw = r#"{"e":"kline","E":1,"s":"BTCUSDT"}"#;
        assert!(matches!(
            MessageDecoder::new().decode(raw),
            Err(DecodeError::MissingField("k"))
        ));
    }

    #[test]
    fn rejects_other_event_types() {
        let raw = r#"{"stream":"btcusdt@trade","data":{"e":"trade","E":1,"s":"BTCUSDT","p":"1"}}"#;
        match MessageDecoder::new().decode(raw) {
            Err(DecodeError::UnexpectedEvent(kind)) => assert_eq!(kind, "trade"),
            other => panic!("expected UnexpectedEvent, got {other:?}"),
        }
    }

    #[test_case(r#""NaN""# ; "nan")]
    #[test_case(r#""inf""# ; "infinity")]
    fn rejects_non_finite(value: &str) {
        let raw = format!(
            r#"{{"e":"kline","E":1,"s":"BTCUSDT","k":{{"o":"1","h":"1","l":"1","c":{value},"v":"1"}}}}"#
        );
        assert!(matches!(
            MessageDecoder::new().decode(&raw),
            Err(DecodeError::NonFinite("c"))
        ));
    }

    #[test]
    fn rejects_negative_volume() {
        let raw = r#"{"e":"kline","E":1,"s":"BTCUSDT","k":{"o":"1","h":"1","l":"1","c":"1","v":"-2"}}"#;
        assert!(matches!(
            MessageDecoder::new().decode(raw),
            Err(DecodeError::NegativeVolume(_))
        ));
    }

    #[test]
    fn rejects_invalid_symbol() {
        let raw = r#"{"e":"kline","E":1,"s":"BTC/USDT","k":{"o":"1","h":"1","l":"1","c":"1","v":"1"}}"#;
        assert!(matches!(
            MessageDecoder::new().decode(raw),
            Err(DecodeError::InvalidSymbol(_))
        ));
    }
}
