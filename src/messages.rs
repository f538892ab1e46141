//! Telemetry wire format.
//!
//! Outbound telemetry is a flat UTF-8 JSON object mapping sensor keys to
//! numbers. Whole values are written as JSON integers so a reading of
//! `428.0` goes out as `428`, matching what dashboards expect from an
//! integer RPM.
//!
//! # Example
//!
//! ```
//! use rs_buggy::messages::encode_telemetry;
//! use rs_buggy::traits::Telemetry;
//!
//! let mut reading = Telemetry::new();
//! reading.insert("rpm1i".into(), 120.0);
//! reading.insert("rpm2i".into(), 0.0);
//!
//! assert_eq!(encode_telemetry(&reading), br#"{"rpm1i":120,"rpm2i":0}"#);
//! ```

use serde_json::{Map, Number, Value};

use crate::traits::Telemetry;

/// Largest magnitude written as an integer; beyond this f64 loses precision.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

// ============================================================================
// Encoding
// ============================================================================

/// JSON value for one reading.
///
/// Non-finite readings have no JSON form and become `null`.
pub fn telemetry_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INT {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

/// Serialize a reading to a JSON object payload.
pub fn encode_telemetry(telemetry: &Telemetry) -> Vec<u8> {
    let object: Map<String, Value> = telemetry
        .iter()
        .map(|(k, v)| (k.clone(), telemetry_value(*v)))
        .collect();
    Value::Object(object).to_string().into_bytes()
}

// ============================================================================
// Decoding
// ============================================================================

/// Parse a telemetry payload back into readings.
///
/// Returns `None` unless the payload is a JSON object of numbers.
pub fn decode_telemetry(payload: &[u8]) -> Option<Telemetry> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    value
        .as_object()?
        .iter()
        .map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
        .collect()
}
