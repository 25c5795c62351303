//! Canonical parameter value representation handed to the database driver.
//!
//! The target database distinguishes integer and float representations
//! precisely, so values stay typed all the way to the driver instead of
//! collapsing into JSON numbers. Temporal values use the `time` crate's
//! native types and serialize as RFC 3339 text.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

/// Typed value tagged with explicit type information so the wire format
/// remains unambiguous across driver bindings.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "t", content = "v")]
pub enum CypherValue {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Calendar date without time-of-day.
    #[serde(serialize_with = "serialize_date")]
    Date(Date),
    /// Instant with UTC offset.
    #[serde(serialize_with = "serialize_datetime")]
    DateTime(OffsetDateTime),
    /// Ordered list of values.
    List(Vec<CypherValue>),
    /// String-keyed map of values.
    Map(BTreeMap<String, CypherValue>),
}

fn serialize_date<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.to_string())
}

fn serialize_datetime<S: Serializer>(
    datetime: &OffsetDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let text = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

impl CypherValue {
    /// Converts a JSON value (GraphQL variable payload) into a typed value.
    ///
    /// Integers are kept exact; anything JSON represents as a non-integral
    /// number becomes a float.
    pub fn from_json(value: &serde_json::Value) -> CypherValue {
        match value {
            serde_json::Value::Null => CypherValue::Null,
            serde_json::Value::Bool(b) => CypherValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CypherValue::Int(i)
                } else {
                    CypherValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => CypherValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                CypherValue::List(items.iter().map(CypherValue::from_json).collect())
            }
            serde_json::Value::Object(map) => CypherValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), CypherValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Returns the integer payload if this value is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CypherValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string payload if this value is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CypherValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// True when the value is the `Null` literal.
    pub fn is_null(&self) -> bool {
        matches!(self, CypherValue::Null)
    }
}

impl From<&str> for CypherValue {
    fn from(value: &str) -> Self {
        CypherValue::String(value.to_owned())
    }
}

impl From<String> for CypherValue {
    fn from(value: String) -> Self {
        CypherValue::String(value)
    }
}

impl From<bool> for CypherValue {
    fn from(value: bool) -> Self {
        CypherValue::Bool(value)
    }
}

impl From<i64> for CypherValue {
    fn from(value: i64) -> Self {
        CypherValue::Int(value)
    }
}

impl From<f64> for CypherValue {
    fn from(value: f64) -> Self {
        CypherValue::Float(value)
    }
}

impl From<Vec<CypherValue>> for CypherValue {
    fn from(value: Vec<CypherValue>) -> Self {
        CypherValue::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_integers_stay_exact() {
        let value = CypherValue::from_json(&serde_json::json!(9007199254740993_i64));
        assert_eq!(value, CypherValue::Int(9007199254740993));
    }

    #[test]
    fn json_floats_stay_floats() {
        let value = CypherValue::from_json(&serde_json::json!(1.5));
        assert_eq!(value, CypherValue::Float(1.5));
    }

    #[test]
    fn serde_tag_distinguishes_int_and_float() {
        let int = serde_json::to_string(&CypherValue::Int(1)).unwrap();
        let float = serde_json::to_string(&CypherValue::Float(1.0)).unwrap();
        assert!(int.contains("\"Int\""));
        assert!(float.contains("\"Float\""));
    }
}
