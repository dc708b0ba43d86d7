// src/params/mod.rs

//! Parameter values supplied by callers and their coercion into the types a
//! script declares.

pub mod validator;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

pub use validator::{MAX_STRING_LENGTH, validate};

/// Canonical rendering of date-time parameters.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// One caller-supplied value. After validation, the variant matches the
/// declared parameter type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    DateTime(NaiveDateTime),
    String(String),
}

/// Name to value mapping. Sorted so serialised history rows are stable.
pub type ParameterBag = BTreeMap<String, ParamValue>;

impl ParamValue {
    /// Absent-equivalent: null or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            ParamValue::Null => true,
            ParamValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn to_int(&self) -> Result<i64, String> {
        match self {
            ParamValue::Int(i) => Ok(*i),
            ParamValue::Bool(b) => Ok(i64::from(*b)),
            ParamValue::Decimal(d) => {
                if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 {
                    Ok(*d as i64)
                } else {
                    Err(format!("{d} is not a whole number"))
                }
            }
            ParamValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| format!("'{s}' is not an integer: {e}")),
            ParamValue::DateTime(_) => Err("a date-time is not an integer".to_string()),
            ParamValue::Null => Err("value is null".to_string()),
        }
    }

    pub fn to_decimal(&self) -> Result<f64, String> {
        let value = match self {
            ParamValue::Decimal(d) => *d,
            ParamValue::Int(i) => *i as f64,
            ParamValue::Bool(b) => f64::from(u8::from(*b)),
            ParamValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("'{s}' is not a number: {e}"))?,
            ParamValue::DateTime(_) => return Err("a date-time is not a number".to_string()),
            ParamValue::Null => return Err("value is null".to_string()),
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("{value} is not a finite number"))
        }
    }

    pub fn to_bool(&self) -> Result<bool, String> {
        match self {
            ParamValue::Bool(b) => Ok(*b),
            ParamValue::Int(i) => Ok(*i != 0),
            ParamValue::Decimal(d) => Ok(*d != 0.0),
            ParamValue::String(s) => parse_bool(s),
            ParamValue::DateTime(_) => Err("a date-time is not a boolean".to_string()),
            ParamValue::Null => Err("value is null".to_string()),
        }
    }

    pub fn to_datetime(&self) -> Result<NaiveDateTime, String> {
        match self {
            ParamValue::DateTime(dt) => Ok(*dt),
            ParamValue::String(s) => parse_datetime(s),
            other => Err(format!("{other} is not a date-time")),
        }
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("'{s}' is not a boolean")),
    }
}

/// Accepts RFC 3339 (normalised to UTC), naive `T`/space separated
/// date-times with optional seconds and fraction, and bare dates.
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("'{s}' is not a recognised date-time"))
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => Ok(()),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Decimal(d) => write!(f, "{d}"),
            ParamValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Decimal(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<NaiveDateTime> for ParamValue {
    fn from(value: NaiveDateTime) -> Self {
        ParamValue::DateTime(value)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => n
                    .as_f64()
                    .map(ParamValue::Decimal)
                    .unwrap_or_else(|| ParamValue::String(n.to_string())),
            },
            Value::String(s) => ParamValue::String(s),
            other => ParamValue::String(other.to_string()),
        }
    }
}

/// Build a bag from a JSON object, e.g. a request body.
pub fn bag_from_json(map: serde_json::Map<String, serde_json::Value>) -> ParameterBag {
    map.into_iter().map(|(k, v)| (k, ParamValue::from(v))).collect()
}

/// Serialise a bag as the JSON object stored with each history record.
pub fn bag_to_json(bag: &ParameterBag) -> serde_json::Result<String> {
    serde_json::to_string(bag)
}

/// Parse a `NAME=VALUE` pair as given on the command line.
pub fn parse_assignment(s: &str) -> Result<(String, ParamValue), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name missing in '{s}'"));
    }
    Ok((name.to_string(), ParamValue::String(value.to_string())))
}
