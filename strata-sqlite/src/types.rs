//! Type conversion between strata values and SQLite storage classes.

use chrono::SecondsFormat;
use rusqlite::types::{Value as SqliteValue, ValueRef};

use strata_query::Value;

/// Convert a bound [`Value`] to a SQLite value.
///
/// Booleans are stored as integers, timestamps as RFC 3339 text and JSON as
/// its serialized text. Lists never reach the driver expanded; a stray one
/// is stored as a JSON array.
pub fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Timestamp(t) => SqliteValue::Text(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Json(j) => SqliteValue::Text(j.to_string()),
        Value::List(items) => {
            let array: Vec<serde_json::Value> = items.iter().map(to_json).collect();
            SqliteValue::Text(serde_json::Value::Array(array).to_string())
        }
    }
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        Value::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
        Value::Json(j) => j.clone(),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
    }
}

/// Convert a column read from SQLite into a [`Value`].
///
/// Text stays text; field conversions parse timestamps and JSON on demand.
pub fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}
