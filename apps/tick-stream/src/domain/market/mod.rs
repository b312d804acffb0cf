//! Market Tick Types
//!
//! `Tick` is the one record that flows from the generator through the log to
//! every consumer. It is validated at the transport boundary so consumers
//! never see half-formed data.
//!
//! `WindowEntry` is the serialized form held by the windowed store. Its JSON
//! encoding is also its identity inside a symbol's keyspace, so two identical
//! ticks collapse into one entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Tick
// =============================================================================

/// One synthetic trade event.
///
/// Wire format:
///
/// ```json
/// { "symbol": "AAPL", "price": 190.12, "volume": 950, "timestamp": 1700000000.123 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument symbol.
    pub symbol: String,
    /// Trade price, rounded to cents by the generator.
    pub price: f64,
    /// Trade volume (always at least 1).
    pub volume: u64,
    /// Fractional seconds since the Unix epoch.
    pub timestamp: f64,
}

impl Tick {
    /// Create a new tick.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: f64, volume: u64, timestamp: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume,
            timestamp,
        }
    }

    /// Decode and validate a tick from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `TickDecodeError` if the payload is not a tick object or if
    /// any field violates the tick invariants.
    pub fn from_json(payload: &[u8]) -> Result<Self, TickDecodeError> {
        // Field names are required; serde would also take a positional array.
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(TickDecodeError::NotAnObject);
        }
        let tick: Self = serde_json::from_value(value)?;
        tick.validate()?;
        Ok(tick)
    }

    /// Encode the tick to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `TickDecodeError::Json` if a float field cannot be encoded.
    pub fn to_json(&self) -> Result<String, TickDecodeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check the tick invariants.
    ///
    /// # Errors
    ///
    /// Returns the first invariant that does not hold.
    pub fn validate(&self) -> Result<(), TickDecodeError> {
        if self.symbol.trim().is_empty() {
            return Err(TickDecodeError::EmptySymbol);
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(TickDecodeError::InvalidPrice(self.price));
        }
        if self.volume == 0 {
            return Err(TickDecodeError::ZeroVolume);
        }
        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return Err(TickDecodeError::InvalidTimestamp(self.timestamp));
        }
        Ok(())
    }

    /// Timestamp in whole milliseconds (truncated).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn timestamp_ms(&self) -> i64 {
        (self.timestamp * 1000.0).floor() as i64
    }

    /// Timestamp as a UTC datetime with microsecond precision.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros((self.timestamp * 1_000_000.0).round() as i64)
    }
}

/// Convert a UTC datetime into fractional epoch seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Errors raised when a payload is not a valid tick.
#[derive(Debug, thiserror::Error)]
pub enum TickDecodeError {
    /// Payload is not JSON or does not have the tick shape.
    #[error("malformed tick payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object.
    #[error("tick payload must be a JSON object")]
    NotAnObject,

    /// Symbol is empty or whitespace.
    #[error("tick symbol is empty")]
    EmptySymbol,

    /// Price is not a positive finite number.
    #[error("tick price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    /// Volume is zero.
    #[error("tick volume must be at least 1")]
    ZeroVolume,

    /// Timestamp is negative or not finite.
    #[error("tick timestamp must be a non-negative finite number, got {0}")]
    InvalidTimestamp(f64),
}

// =============================================================================
// Window Entry
// =============================================================================

/// A tick as stored in the windowed store and returned by the query surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    /// Instrument symbol.
    pub symbol: String,
    /// Trade price.
    pub price: f64,
    /// Trade volume.
    pub volume: u64,
    /// Millisecond timestamp; also the ordering score.
    pub timestamp_ms: i64,
}

impl From<&Tick> for WindowEntry {
    fn from(tick: &Tick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            price: tick.price,
            volume: tick.volume,
            timestamp_ms: tick.timestamp_ms(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn wire_format_round_trips_field_names() {
        let tick = Tick::new("AAPL", 191.23, 1040, 1_700_000_000.5);
        let json = tick.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"symbol":"AAPL","price":191.23,"volume":1040,"timestamp":1700000000.5}"#
        );
        assert_eq!(Tick::from_json(json.as_bytes()).unwrap(), tick);
    }

    #[test]
    fn integer_timestamp_is_accepted() {
        let tick =
            Tick::from_json(br#"{"symbol":"MSFT","price":380.0,"volume":5,"timestamp":1700000000}"#)
                .unwrap();
        assert_eq!(tick.timestamp_ms(), 1_700_000_000_000);
    }

    #[test_case(br#"not json"# ; "not json")]
    #[test_case(br#"{"symbol":"AAPL","price":1.0,"volume":1}"# ; "missing timestamp")]
    #[test_case(br#"{"symbol":"","price":1.0,"volume":1,"timestamp":1.0}"# ; "empty symbol")]
    #[test_case(br#"{"symbol":"AAPL","price":-1.0,"volume":1,"timestamp":1.0}"# ; "negative price")]
    #[test_case(br#"{"symbol":"AAPL","price":1.0,"volume":0,"timestamp":1.0}"# ; "zero volume")]
    #[test_case(br#"{"symbol":"AAPL","price":1.0,"volume":-3,"timestamp":1.0}"# ; "negative volume")]
    #[test_case(br#"{"symbol":"AAPL","price":1.0,"volume":1,"timestamp":-5.0}"# ; "negative timestamp")]
    #[test_case(br#"["AAPL",1.0,1,1.0]"# ; "array payload")]
    fn malformed_payloads_are_rejected(payload: &[u8]) {
        assert!(Tick::from_json(payload).is_err());
    }

    #[test_case(br#"["AAPL",1.0,1,1.0]"# ; "positional array")]
    #[test_case(br#""AAPL""# ; "bare string")]
    #[test_case(br#"42"# ; "bare number")]
    #[test_case(br#"null"# ; "null")]
    fn non_object_payloads_are_rejected_before_decoding(payload: &[u8]) {
        assert!(matches!(
            Tick::from_json(payload),
            Err(TickDecodeError::NotAnObject)
        ));
    }

    #[test]
    fn millisecond_timestamp_truncates() {
        let tick = Tick::new("AAPL", 1.0, 1, 1_700_000_000.123_9);
        assert_eq!(tick.timestamp_ms(), 1_700_000_000_123);
    }

    #[test]
    fn datetime_matches_epoch_seconds() {
        let tick = Tick::new("AAPL", 1.0, 1, 1_700_000_000.25);
        let at = tick.datetime().unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert_eq!(at.timestamp_subsec_millis(), 250);
        assert!((epoch_seconds(at) - tick.timestamp).abs() < 1e-6);
    }

    #[test]
    fn window_entry_uses_millisecond_score() {
        let tick = Tick::new("AAPL", 190.5, 1000, 1_700_000_000.75);
        let entry = WindowEntry::from(&tick);
        assert_eq!(entry.timestamp_ms, 1_700_000_000_750);
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"symbol":"AAPL","price":190.5,"volume":1000,"timestamp_ms":1700000000750}"#
        );
    }
}
