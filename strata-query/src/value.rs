//! Bound values, statement arguments and embeddable SQL expressions.
//!
//! [`Value`] is what travels to the driver for each placeholder and what comes
//! back in a [`Row`](crate::Row). [`Arg`] is what callers hand to chaining
//! methods: either a plain value (lists expand to `IN (...)` placeholders) or
//! a [`SqlExpr`] whose text and values are spliced in place.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A value bound to a placeholder or read from a result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// JSON value.
    Json(serde_json::Value),
    /// List of values (expanded into one placeholder per element).
    List(Vec<Value>),
}

impl Value {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is the zero value of its kind.
    ///
    /// Zero primary keys mean "not yet persisted"; zero fields are skipped by
    /// record conditions and record-shaped updates.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::String(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::Timestamp(t) => t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0,
            Self::Json(j) => j.is_null(),
            Self::List(l) => l.is_empty(),
        }
    }

    /// A normalized key used to match related rows to their owners.
    ///
    /// Booleans and integers share a key space since most engines hand
    /// booleans back as integers.
    pub fn to_key(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(format!("i{}", i64::from(*b))),
            Self::Int(i) => Some(format!("i{}", i)),
            Self::Float(f) if f.fract() == 0.0 => Some(format!("i{}", *f as i64)),
            Self::Float(f) => Some(format!("f{}", f)),
            Self::String(s) => Some(format!("s{}", s)),
            Self::Bytes(b) => Some(format!("b{:?}", b)),
            Self::Timestamp(t) => Some(format!("t{}", t.timestamp_micros())),
            Self::Json(j) => Some(format!("j{}", j)),
            Self::List(_) => None,
        }
    }

    /// Get the value as an integer if it is integer-like.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Get the value as a string slice if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Json(_) => "json",
            Self::List(_) => "list",
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Int(v as i64)
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Reads a field into a [`Value`]. Implemented for every storable field type.
pub trait ToValue {
    /// Produce the value bound for this field.
    fn to_value(&self) -> Value;
}

/// Converts a column [`Value`] back into a field type.
pub trait FromValue: Sized {
    /// Convert, reporting the mismatch on failure.
    fn from_value(value: Value) -> Result<Self, String>;
}

macro_rules! int_conversions {
    ($($t:ty),*) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Value {
                    Value::Int(*self as i64)
                }
            }

            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self, String> {
                    let kind = value.kind();
                    let wide = value
                        .as_i64()
                        .ok_or_else(|| format!("expected integer, got {}", kind))?;
                    <$t>::try_from(wide).map_err(|e| e.to_string())
                }
            }
        )*
    };
}

int_conversions!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            Value::String(s) => match s.as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                other => Err(format!("expected bool, got {:?}", other)),
            },
            other => Err(format!("expected bool, got {}", other.kind())),
        }
    }
}

macro_rules! float_conversions {
    ($($t:ty),*) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Value {
                    Value::Float(f64::from(*self))
                }
            }

            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self, String> {
                    match value {
                        Value::Float(f) => Ok(f as $t),
                        Value::Int(i) => Ok(i as $t),
                        Value::String(s) => s.parse().map_err(|e| format!("{}", e)),
                        other => Err(format!("expected float, got {}", other.kind())),
                    }
                }
            }
        )*
    };
}

float_conversions!(f32, f64);

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(s),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bytes(b) => String::from_utf8(b).map_err(|e| e.to_string()),
            Value::Timestamp(t) => Ok(t.to_rfc3339()),
            Value::Json(j) => Ok(j.to_string()),
            other => Err(format!("expected string, got {}", other.kind())),
        }
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.into_bytes()),
            other => Err(format!("expected bytes, got {}", other.kind())),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Timestamp(t) => Ok(t),
            Value::String(s) => parse_timestamp(&s),
            Value::Int(secs) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| format!("timestamp {} out of range", secs)),
            other => Err(format!("expected timestamp, got {}", other.kind())),
        }
    }
}

/// Parse the textual timestamp forms engines hand back.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(t) = DateTime::parse_from_str(s, format) {
            return Ok(t.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(t.and_utc());
        }
    }
    Err(format!("unrecognized timestamp {:?}", s))
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Json(j) => Ok(j),
            Value::Null => Ok(serde_json::Value::Null),
            Value::String(s) => serde_json::from_str(&s).map_err(|e| e.to_string()),
            Value::Bytes(b) => serde_json::from_slice(&b).map_err(|e| e.to_string()),
            other => Err(format!("expected json, got {}", other.kind())),
        }
    }
}

impl ToValue for uuid::Uuid {
    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::String(s) => uuid::Uuid::parse_str(&s).map_err(|e| e.to_string()),
            Value::Bytes(b) => uuid::Uuid::from_slice(&b).map_err(|e| e.to_string()),
            other => Err(format!("expected uuid, got {}", other.kind())),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

/// An SQL fragment with neutral `?` placeholders and its bound values.
///
/// Expressions are produced by [`Db::expr`](crate::Db::expr) and
/// [`Db::query_expr`](crate::Db::query_expr) and may be passed anywhere an
/// [`Arg`] is accepted; their placeholders keep their textual position when
/// spliced, so values stay in left-to-right order across nesting levels.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlExpr {
    /// SQL text using `?` for every placeholder.
    pub sql: String,
    /// Values in placeholder order.
    pub values: Vec<Value>,
}

impl SqlExpr {
    /// Create an expression from pre-rendered parts.
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    /// Wrap the expression in parentheses, as a sub-query.
    pub fn parenthesized(self) -> Self {
        Self {
            sql: format!("({})", self.sql),
            values: self.values,
        }
    }
}

impl std::fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.sql, self.values)
    }
}

/// One argument to a condition or raw statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A bound value; lists expand to one placeholder per element.
    Value(Value),
    /// An expression spliced in place of its placeholder.
    Expr(SqlExpr),
}

macro_rules! arg_from_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Arg {
                fn from(v: $t) -> Self {
                    Self::Value(Value::from(v))
                }
            }
        )*
    };
}

arg_from_value!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, &str, &String,
    DateTime<Utc>, serde_json::Value, uuid::Uuid
);

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<SqlExpr> for Arg {
    fn from(v: SqlExpr) -> Self {
        Self::Expr(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        Self::Value(Value::from(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Arg {
    fn from(v: Vec<T>) -> Self {
        Self::Value(Value::List(v.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Arg {
    fn from(v: [T; N]) -> Self {
        Self::Value(Value::List(v.into_iter().map(Into::into).collect()))
    }
}

/// A set of positional arguments.
///
/// Implemented for `()`, tuples of up to eight [`Arg`]-convertible values,
/// `Vec<Arg>`, and single scalar values.
pub trait IntoArgs {
    /// Convert into the ordered argument list.
    fn into_args(self) -> Vec<Arg>;
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<Arg> {
        Vec::new()
    }
}

impl IntoArgs for Vec<Arg> {
    fn into_args(self) -> Vec<Arg> {
        self
    }
}

macro_rules! single_arg {
    ($($t:ty),*) => {
        $(
            impl IntoArgs for $t {
                fn into_args(self) -> Vec<Arg> {
                    vec![Arg::from(self)]
                }
            }
        )*
    };
}

single_arg!(bool, i32, i64, u32, u64, f64, String, &str, Value, SqlExpr, DateTime<Utc>);

macro_rules! tuple_args {
    ($($name:ident),+) => {
        impl<$($name: Into<Arg>),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Arg> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

tuple_args!(A);
tuple_args!(A, B);
tuple_args!(A, B, C);
tuple_args!(A, B, C, D);
tuple_args!(A, B, C, D, E);
tuple_args!(A, B, C, D, E, F);
tuple_args!(A, B, C, D, E, F, G);
tuple_args!(A, B, C, D, E, F, G, H);
