//! Transaction preprocessor (C1).
//!
//! Validates, coerces and normalizes a raw JSON record into an immutable
//! `Event`. Pure: never mutates its argument, and is idempotent — running
//! `preprocess` again on an already-preprocessed `Event` (re-serialized to
//! JSON) yields a bit-identical record.

use chrono::{NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::error::PreprocessError;
use crate::event::{Event, RawEvent};

const MIN_TIMESTAMP: i64 = 946_684_800; // 2000-01-01T00:00:00Z
const MAX_TIMESTAMP: i64 = 4_102_444_800; // 2100-01-01T00:00:00Z

const REQUIRED_FIELDS: &[&str] = &["transaction_id", "card_id", "amount", "merchant_id", "timestamp"];

pub struct Preprocessor {
    amount_clip_value: f64,
}

impl Preprocessor {
    pub fn new(config: &Config) -> Self {
        Self {
            amount_clip_value: config.amount_clip_value,
        }
    }

    /// Validate, coerce and normalize a raw record into an `Event`.
    pub fn preprocess(&self, raw: &RawEvent) -> Result<Event, PreprocessError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| PreprocessError::Schema("transaction must be an object".to_string()))?;

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .filter(|f| !matches!(obj.get(**f), Some(v) if !v.is_null()))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(PreprocessError::Schema(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let transaction_id = coerce_string(&obj["transaction_id"]);
        let card_id = coerce_string(&obj["card_id"]);
        let merchant_id = coerce_string(&obj["merchant_id"]);
        let merchant_category = obj
            .get("merchant_category")
            .filter(|v| !v.is_null())
            .map(coerce_string)
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let city = obj
            .get("city")
            .filter(|v| !v.is_null())
            .map(coerce_string)
            .unwrap_or_default();
        let state = obj
            .get("state")
            .filter(|v| !v.is_null())
            .map(coerce_string)
            .unwrap_or_default();
        let user_id = obj
            .get("user_id")
            .filter(|v| !v.is_null())
            .map(coerce_string)
            .unwrap_or_default();

        let raw_amount = coerce_f64(&obj["amount"])
            .ok_or_else(|| PreprocessError::Schema("amount is not numeric".to_string()))?;
        let amount = self.normalize_amount(raw_amount);

        let timestamp = parse_timestamp(&obj["timestamp"])?;

        let location_lat = match obj.get("location_lat").filter(|v| !v.is_null()) {
            Some(v) => Some(
                coerce_f64(v).ok_or_else(|| PreprocessError::Schema("location_lat is not numeric".to_string()))?,
            ),
            None => None,
        };
        let location_lon = match obj.get("location_lon").filter(|v| !v.is_null()) {
            Some(v) => Some(
                coerce_f64(v).ok_or_else(|| PreprocessError::Schema("location_lon is not numeric".to_string()))?,
            ),
            None => None,
        };

        validate_ranges(amount, timestamp, location_lat, location_lon)?;

        Ok(Event {
            transaction_id,
            card_id,
            amount,
            merchant_id,
            timestamp,
            merchant_category,
            location_lat,
            location_lon,
            city,
            state,
            user_id,
        })
    }

    /// Ensure positive, clip at `amount_clip_value`, round half-away-from-zero
    /// to 2 decimals.
    fn normalize_amount(&self, amount: f64) -> f64 {
        let amount = amount.abs();
        let amount = amount.min(self.amount_clip_value);
        (amount * 100.0).round() / 100.0
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse a timestamp field into Unix epoch seconds.
///
/// Accepts, in order: a direct numeric cast, an ISO-8601 string (with a
/// trailing `Z` treated as UTC), or a naive `YYYY-MM-DD HH:MM:SS` string
/// interpreted in UTC (the engine's single fixed zone; see SPEC_FULL.md §4.4).
fn parse_timestamp(value: &Value) -> Result<i64, PreprocessError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f as i64)
            } else {
                Err(PreprocessError::Range("timestamp is not a finite number".to_string()))
            }
        }
        Value::String(s) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                return Ok(dt.timestamp());
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Ok(Utc.from_utc_datetime(&naive).timestamp());
            }
            Err(PreprocessError::Range(format!("unable to parse timestamp: {s}")))
        }
        _ => Err(PreprocessError::Range("invalid timestamp type".to_string())),
    }
}

fn validate_ranges(
    amount: f64,
    timestamp: i64,
    location_lat: Option<f64>,
    location_lon: Option<f64>,
) -> Result<(), PreprocessError> {
    if !(amount > 0.0) {
        return Err(PreprocessError::Range(format!("amount must be positive: {amount}")));
    }
    if !(MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(&timestamp) {
        return Err(PreprocessError::Range(format!("timestamp out of range: {timestamp}")));
    }
    if let Some(lat) = location_lat {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(PreprocessError::Range(format!("invalid latitude: {lat}")));
        }
    }
    if let Some(lon) = location_lon {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(PreprocessError::Range(format!("invalid longitude: {lon}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(&Config::from_env())
    }

    fn base_event() -> Value {
        json!({
            "transaction_id": "tx-1",
            "card_id": "card-1",
            "amount": 100.0,
            "merchant_id": "m-1",
            "timestamp": 1_707_580_000,
        })
    }

    #[test]
    fn rejects_non_record_input() {
        let p = preprocessor();
        let err = p.preprocess(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, PreprocessError::Schema(_)));
    }

    #[test]
    fn rejects_missing_required_field() {
        let p = preprocessor();
        let mut raw = base_event();
        raw.as_object_mut().unwrap().remove("card_id");
        let err = p.preprocess(&raw).unwrap_err();
        assert!(matches!(err, PreprocessError::Schema(_)));
    }

    #[test]
    fn fills_optional_defaults() {
        let p = preprocessor();
        let event = p.preprocess(&base_event()).unwrap();
        assert_eq!(event.merchant_category, "UNKNOWN");
        assert_eq!(event.location_lat, None);
        assert_eq!(event.city, "");
    }

    #[test]
    fn negative_amount_becomes_positive() {
        let p = preprocessor();
        let mut raw = base_event();
        raw["amount"] = json!(-42.5);
        let event = p.preprocess(&raw).unwrap();
        assert_eq!(event.amount, 42.5);
    }

    #[test]
    fn zero_amount_is_a_range_error() {
        let p = preprocessor();
        let mut raw = base_event();
        raw["amount"] = json!(0.0);
        let err = p.preprocess(&raw).unwrap_err();
        assert!(matches!(err, PreprocessError::Range(_)));
    }

    #[test]
    fn amount_above_clip_is_clipped() {
        let p = preprocessor();
        let mut raw = base_event();
        raw["amount"] = json!(50_000.0);
        let event = p.preprocess(&raw).unwrap();
        assert_eq!(event.amount, 10_000.0);
    }

    #[test]
    fn latitude_boundary() {
        let p = preprocessor();
        let mut raw = base_event();
        raw["location_lat"] = json!(90.0);
        assert!(p.preprocess(&raw).is_ok());

        raw["location_lat"] = json!(90.0001);
        assert!(matches!(p.preprocess(&raw), Err(PreprocessError::Range(_))));
    }

    #[test]
    fn timestamp_boundary() {
        let p = preprocessor();
        let mut raw = base_event();
        raw["timestamp"] = json!(MIN_TIMESTAMP);
        assert!(p.preprocess(&raw).is_ok());

        raw["timestamp"] = json!(MIN_TIMESTAMP - 1);
        assert!(matches!(p.preprocess(&raw), Err(PreprocessError::Range(_))));
    }

    #[test]
    fn iso8601_with_z_suffix_is_accepted() {
        let p = preprocessor();
        let mut raw = base_event();
        raw["timestamp"] = json!("2024-02-10T12:26:40Z");
        let event = p.preprocess(&raw).unwrap();
        assert_eq!(event.timestamp, 1_707_580_000);
    }

    #[test]
    fn preprocess_is_idempotent() {
        let p = preprocessor();
        let once = p.preprocess(&base_event()).unwrap();
        let reprocessed_raw = serde_json::to_value(&once).unwrap();
        let twice = p.preprocess(&reprocessed_raw).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn preprocess_does_not_mutate_input() {
        let p = preprocessor();
        let raw = base_event();
        let before = raw.clone();
        let _ = p.preprocess(&raw);
        assert_eq!(raw, before);
    }

    #[test]
    fn unicode_fields_round_trip() {
        let p = preprocessor();
        let mut raw = base_event();
        raw["merchant_id"] = json!("北京_店");
        raw["merchant_category"] = json!("food_🍕");
        let event = p.preprocess(&raw).unwrap();
        assert_eq!(event.merchant_id, "北京_店");
        assert_eq!(event.merchant_category, "food_🍕");
    }
}
