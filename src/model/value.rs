//! Parameter value type matching Neo4j's type system.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, ParseResult, Utc};
use serde::{Deserialize, Serialize};

use crate::model::field::TemporalType;
use crate::{Error, Result};

/// A value that can be sent to Neo4j as a query parameter or inlined
/// as a Cypher literal.
///
/// Covers the subset of the Neo4j type system a translated query needs:
/// - Scalars: Bool, Int, Float, String
/// - Containers: List, Map
/// - Temporal: Date, Time, LocalTime, DateTime, LocalDateTime, Duration
/// - Spatial: Point2D, Point3D
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),

    // Temporal types
    Date(NaiveDate),
    /// Offset in seconds east of UTC.
    Time { time: NaiveTime, offset_seconds: i32 },
    LocalTime(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    LocalDateTime(NaiveDateTime),
    Duration(String),

    // Spatial types
    Point2D { srid: i32, x: f64, y: f64 },
    Point3D { srid: i32, x: f64, y: f64, z: f64 },
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Date(_) => "DATE",
            Value::Time { .. } => "TIME",
            Value::LocalTime(_) => "LOCAL_TIME",
            Value::DateTime(_) => "DATETIME",
            Value::LocalDateTime(_) => "LOCAL_DATETIME",
            Value::Duration(_) => "DURATION",
            Value::Point2D { .. } => "POINT",
            Value::Point3D { .. } => "POINT",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    /// Attempt to extract as &str
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a GraphQL temporal scalar into the matching Neo4j value.
    ///
    /// Lists are coerced element-wise so `_IN` filters keep their shape.
    pub fn coerce_temporal(self, kind: TemporalType) -> Result<Value> {
        let raw = match self {
            Value::String(s) => s,
            Value::List(items) => {
                return items
                    .into_iter()
                    .map(|v| v.coerce_temporal(kind))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List);
            }
            other => return Ok(other),
        };

        let invalid = |e: &dyn fmt::Display| {
            Error::InvalidArgument(format!("invalid {kind:?} value '{raw}': {e}"))
        };

        match kind {
            TemporalType::DateTime => DateTime::parse_from_rfc3339(&raw)
                .map(Value::DateTime)
                .map_err(|e| invalid(&e)),
            TemporalType::LocalDateTime => NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
                .map(Value::LocalDateTime)
                .map_err(|e| invalid(&e)),
            TemporalType::Date => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| invalid(&e)),
            TemporalType::Time => parse_offset_time(&raw)
                .map(|(time, offset)| Value::Time { time, offset_seconds: offset.local_minus_utc() })
                .map_err(|e| invalid(&e)),
            TemporalType::LocalTime => NaiveTime::parse_from_str(&raw, "%H:%M:%S%.f")
                .map(Value::LocalTime)
                .map_err(|e| invalid(&e)),
            TemporalType::Duration => {
                if raw.starts_with('P') {
                    Ok(Value::Duration(raw.clone()))
                } else {
                    Err(invalid(&"durations must be ISO 8601 (P...)"))
                }
            }
        }
    }
}

/// `12:00:00`, `12:00:00Z` or `12:00:00.5+01:00`. No offset means UTC.
fn parse_offset_time(raw: &str) -> ParseResult<(NaiveTime, FixedOffset)> {
    let (clock, offset) = if let Some(clock) = raw.strip_suffix('Z') {
        (clock, Utc.fix())
    } else if let Some(at) = raw.rfind(['+', '-']) {
        (&raw[..at], raw[at..].parse::<FixedOffset>()?)
    } else {
        (raw, Utc.fix())
    };
    Ok((NaiveTime::parse_from_str(clock, "%H:%M:%S%.f")?, offset))
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self { Value::List(v.into_iter().map(Into::into).collect()) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

/// GraphQL arguments arrive as JSON; integers stay integers.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self { Value::from(v.clone()) }
}

// ============================================================================
// Display: renders a Cypher literal
// ============================================================================

/// Quote a string as a Cypher string literal.
pub(crate) fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::String(s) => write!(f, "{}", quote(s)),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                if m.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, " }}")
            }
            Value::Date(d) => write!(f, "date(\"{d}\")"),
            Value::Time { time, offset_seconds: 0 } => write!(f, "time(\"{time}Z\")"),
            Value::Time { time, offset_seconds } => match FixedOffset::east_opt(*offset_seconds) {
                Some(offset) => write!(f, "time(\"{time}{offset}\")"),
                None => Err(fmt::Error),
            },
            Value::LocalTime(t) => write!(f, "localtime(\"{t}\")"),
            Value::DateTime(dt) => write!(f, "datetime(\"{}\")", dt.to_rfc3339()),
            Value::LocalDateTime(dt) => write!(f, "localdatetime(\"{}\")", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Duration(d) => write!(f, "duration(\"{d}\")"),
            Value::Point2D { x, y, srid } => write!(f, "point({{ srid: {srid}, x: {x:?}, y: {y:?} }})"),
            Value::Point3D { x, y, z, srid } => {
                write!(f, "point({{ srid: {srid}, x: {x:?}, y: {y:?}, z: {z:?} }})")
            }
        }
    }
}
