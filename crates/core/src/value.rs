//! Payload value extraction and type coercion.
//!
//! A payload becomes a stored value in three steps:
//! 1. extract: raw text, or the single JSON node selected by a JSONPath query
//! 2. coerce: convert that node to the configured [`ValueType`]
//! 3. scale: multiply doubles by the configured factor

use std::fmt;

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::error::{Error, Result};
use crate::topic::ValueType;

/// Relative tolerance used when comparing doubles, at `f32` precision.
const FUZZY_FACTOR: f32 = 100_000.0;

/// A typed sensor value.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    String(String),
    Bool(bool),
    Integer(i64),
    Double(f64),
}

impl SampleValue {
    /// Returns the type this value is stored as.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Bool(_) => ValueType::Bool,
            Self::Integer(_) => ValueType::Integer,
            Self::Double(_) => ValueType::Double,
        }
    }

    /// Coerces an extracted JSON node to the given type.
    pub fn coerce(raw: &Value, value_type: ValueType) -> Result<Self> {
        let coerced = match value_type {
            ValueType::String => match raw {
                Value::String(s) => Some(Self::String(s.clone())),
                Value::Number(n) => Some(Self::String(n.to_string())),
                Value::Bool(b) => Some(Self::String(b.to_string())),
                _ => None,
            },
            ValueType::Bool => match raw {
                Value::Bool(b) => Some(Self::Bool(*b)),
                Value::Number(n) => n.as_f64().map(|f| Self::Bool(f != 0.0)),
                Value::String(s) => parse_bool(s).map(Self::Bool),
                _ => None,
            },
            ValueType::Integer => match raw {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().and_then(round_to_i64))
                    .map(Self::Integer),
                Value::String(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .ok()
                        .or_else(|| s.parse::<f64>().ok().and_then(round_to_i64))
                        .map(Self::Integer)
                }
                Value::Bool(b) => Some(Self::Integer(i64::from(*b))),
                _ => None,
            },
            ValueType::Double => match raw {
                Value::Number(n) => n.as_f64().map(Self::Double),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Self::Double),
                Value::Bool(b) => Some(Self::Double(if *b { 1.0 } else { 0.0 })),
                _ => None,
            },
        };

        coerced.ok_or_else(|| Error::coercion(describe(raw), value_type))
    }

    /// Multiplies a double by `factor`. Other types are returned unchanged.
    pub fn scaled(self, factor: f64) -> Self {
        match self {
            Self::Double(v) => Self::Double(v * factor),
            other => other,
        }
    }

    /// Compares two values the way change detection does.
    ///
    /// Doubles use a relative tolerance at single precision, every other
    /// type compares exactly. Values of different types never match.
    pub fn equivalent(&self, other: &SampleValue) -> bool {
        match (self, other) {
            (Self::Double(a), Self::Double(b)) => floats_equivalent(*a, *b),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Double(d) => write!(f, "{}", d),
        }
    }
}

/// Fuzzy float comparison at `f32` precision.
///
/// Two values match when they are identical after narrowing to `f32`, or
/// when their difference is within 1/100000 of the smaller magnitude.
pub fn floats_equivalent(a: f64, b: f64) -> bool {
    let (a, b) = (a as f32, b as f32);
    a == b || (a - b).abs() * FUZZY_FACTOR <= a.abs().min(b.abs())
}

/// A compiled JSONPath query together with its source text.
#[derive(Debug, Clone)]
pub struct ValueQuery {
    source: String,
    path: JsonPath,
}

impl ValueQuery {
    /// Parses a JSONPath expression such as `$.state.temperature`.
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        let path = JsonPath::parse(source)
            .map_err(|e| Error::config(format!("invalid JSONPath '{}': {}", source, e)))?;

        Ok(Self {
            source: source.to_string(),
            path,
        })
    }

    /// The query as written in the configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Selects exactly one scalar node from a document.
    pub fn select(&self, doc: &Value) -> Result<Value> {
        let nodes = self.path.query(doc).all();

        match nodes.as_slice() {
            [] | [Value::Null] => Err(Error::QueryMiss {
                query: self.source.clone(),
            }),
            [Value::Array(_) | Value::Object(_)] => Err(Error::NotScalar {
                query: self.source.clone(),
            }),
            [node] => Ok((*node).clone()),
            many => Err(Error::QueryAmbiguous {
                query: self.source.clone(),
                found: many.len(),
            }),
        }
    }
}

/// Extracts the raw value from a payload.
///
/// Without a query the payload is returned as text. With a query the
/// payload must be JSON and the query must select a single scalar.
pub fn extract(payload: &[u8], query: Option<&ValueQuery>) -> Result<Value> {
    match query {
        None => {
            let text = std::str::from_utf8(payload).map_err(|_| Error::PayloadEncoding)?;
            Ok(Value::String(text.to_string()))
        }
        Some(query) => {
            let doc: Value = serde_json::from_slice(payload)?;
            query.select(&doc)
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn round_to_i64(f: f64) -> Option<i64> {
    let rounded = f.round();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
        Some(rounded as i64)
    } else {
        None
    }
}

fn describe(raw: &Value) -> String {
    match raw {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}
