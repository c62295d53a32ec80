//! Scalar value types for feature records
//!
//! The `Value` enum represents every cell a record column can hold. Feature
//! pipelines only deal in scalars, so there are no nested arrays or objects.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar cell value
///
/// Serialized untagged; timestamps use RFC 3339 and are tried before plain
/// strings when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// Number value (f64 handles both integers and floats)
    Number(f64),
    /// Point in time, always UTC
    Timestamp(DateTime<Utc>),
    /// String value
    String(String),
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl Value {
    /// Name of the variant, used in error messages and schema inference
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Timestamp(_) => "timestamp",
            Value::String(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value. Booleans count as 1/0.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as a lookup key (entity keys, vocabulary entries,
    /// substitution tables).
    ///
    /// Integral numbers render without a fractional part so that `3.0`
    /// matches the vocabulary entry `"3"`. `Null` has no key.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Timestamp(ts) => Some(ts.to_rfc3339()),
            Value::String(s) => Some(s.clone()),
        }
    }

    /// Coerce the value into a UTC timestamp.
    ///
    /// Accepts timestamps, RFC 3339 strings, `YYYY-MM-DD HH:MM:SS[.f]`
    /// strings (read as UTC), bare dates, and epoch seconds.
    pub fn to_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::String(s) => parse_timestamp(s),
            Value::Number(n) if n.is_finite() => {
                let secs = n.trunc() as i64;
                let nanos = ((n - n.trunc()) * 1e9).round() as u32;
                DateTime::from_timestamp(secs, nanos)
            }
            _ => None,
        }
    }
}

/// Parse a timestamp string in any of the accepted layouts.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_key_rendering() {
        assert_eq!(Value::Number(3.0).as_key(), Some("3".to_string()));
        assert_eq!(Value::Number(2.5).as_key(), Some("2.5".to_string()));
        assert_eq!(Value::from("es_food").as_key(), Some("es_food".to_string()));
        assert_eq!(Value::Bool(true).as_key(), Some("true".to_string()));
        assert_eq!(Value::Null.as_key(), None);
    }

    #[test]
    fn test_value_numeric_view() {
        assert_eq!(Value::Number(4.5).as_f64(), Some(4.5));
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::from("4.5").as_f64(), None);
    }

    #[test]
    fn test_timestamp_coercion() {
        let expected = Utc.with_ymd_and_hms(2023, 1, 14, 8, 30, 0).unwrap();

        assert_eq!(
            Value::from("2023-01-14T08:30:00Z").to_timestamp(),
            Some(expected)
        );
        assert_eq!(
            Value::from("2023-01-14 08:30:00").to_timestamp(),
            Some(expected)
        );
        assert_eq!(
            Value::from("2023-01-14 08:30:00.000000").to_timestamp(),
            Some(expected)
        );
        assert_eq!(
            Value::Number(expected.timestamp() as f64).to_timestamp(),
            Some(expected)
        );
        assert_eq!(
            Value::from("2023-01-14").to_timestamp(),
            Some(Utc.with_ymd_and_hms(2023, 1, 14, 0, 0, 0).unwrap())
        );
        assert_eq!(Value::from("yesterday").to_timestamp(), None);
        assert_eq!(Value::Null.to_timestamp(), None);
    }

    #[test]
    fn test_value_serde_json() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 14, 8, 30, 0).unwrap();
        let values = vec![
            Value::Null,
            Value::Bool(false),
            Value::Number(42.0),
            Value::Timestamp(ts),
            Value::String("M".to_string()),
        ];

        let json = serde_json::to_string(&values).unwrap();
        let restored: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(values, restored);
    }
}
