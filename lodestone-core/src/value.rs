//! Dynamic metadata values.
//!
//! Chunk and document metadata is a free-form map from string keys to
//! JSON-scalar values or arrays thereof. Filtering dispatches over the
//! tagged [`Value`] variant; comparisons define an order only within a
//! tag, and cross-tag comparisons yield `None` (so range filters on
//! incomparable values evaluate to false).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Free-form metadata attached to documents and chunks.
pub type Metadata = HashMap<String, Value>;

/// A metadata value: a JSON scalar or an array of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    /// Numeric view, `None` for non-numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// String view, `None` for non-strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Boolean view, `None` for non-bools.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Array view, `None` for non-arrays.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Parse a string value as an ISO-8601 date or datetime.
    ///
    /// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight
    /// UTC). Non-strings and unparseable strings yield `None`.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        let s = self.as_str()?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
        Some(DateTime::from_naive_utc_and_offset(
            date.and_hms_opt(0, 0, 0)?,
            Utc,
        ))
    }

    /// Whether this value is a scalar (everything but `Array`).
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Array(_))
    }

    /// Ordering comparison for range filters.
    ///
    /// Numbers compare numerically; strings compare only when both parse
    /// as ISO dates. Every other pairing is incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(_), Value::String(_)) => {
                let a = self.as_date()?;
                let b = other.as_date()?;
                Some(a.cmp(&b))
            }
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
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

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_serde_roundtrip() {
        let json = r#"{"topic":"rust","stars":4.5,"archived":false,"tags":["a","b"],"nothing":null}"#;
        let meta: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta["topic"], Value::from("rust"));
        assert_eq!(meta["stars"], Value::Number(4.5));
        assert_eq!(meta["archived"], Value::Bool(false));
        assert_eq!(meta["tags"], Value::from(vec!["a", "b"]));
        assert_eq!(meta["nothing"], Value::Null);

        let back = serde_json::to_value(&meta).unwrap();
        let again: Metadata = serde_json::from_value(back).unwrap();
        assert_eq!(meta, again);
    }

    #[test]
    fn test_integers_land_as_numbers() {
        let v: Value = serde_json::from_str("42").unwrap();
        assert_eq!(v.as_f64(), Some(42.0));
    }

    #[test]
    fn test_numeric_compare() {
        let a = Value::Number(1.0);
        let b = Value::Number(2.0);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(b.compare(&a), Some(Ordering::Greater));
        assert_eq!(a.compare(&Value::Number(1.0)), Some(Ordering::Equal));
    }

    #[test]
    fn test_date_compare() {
        let a = Value::from("2024-01-01");
        let b = Value::from("2024-06-15T12:30:00Z");
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        // Plain strings are not ordered
        let x = Value::from("alpha");
        let y = Value::from("beta");
        assert_eq!(x.compare(&y), None);
    }

    #[test]
    fn test_cross_tag_incomparable() {
        assert_eq!(Value::Number(1.0).compare(&Value::from("1")), None);
        assert_eq!(Value::Bool(true).compare(&Value::Bool(false)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }
}
