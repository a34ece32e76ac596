//! Typed parameter values and the JSON conversions that feed them.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::StorageError;

/// Storage type of a saga field.
///
/// Drives typed binding of nulls, conversion of serialized field values, and
/// the implicit value used by bare field filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    BigInt,
    Float,
    Text,
    Uuid,
    Datetime,
    /// Date and time without an offset.
    Timestamp,
    Json,
}

impl FieldType {
    /// Reference-like types compare against `NULL` when used as a bare filter.
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Json)
    }

    /// The zero value of a value type, `None` for reference types.
    pub fn default_value(&self) -> Option<Value> {
        match self {
            FieldType::Bool => Some(Value::Bool(false)),
            FieldType::Int | FieldType::BigInt => Some(Value::Int(0)),
            FieldType::Float => Some(Value::Float(0.0)),
            FieldType::Uuid => Some(Value::Uuid(Uuid::nil())),
            FieldType::Datetime => Some(Value::Datetime(DateTime::<Utc>::default())),
            FieldType::Timestamp => {
                Some(Value::Timestamp(DateTime::<Utc>::default().naive_utc()))
            }
            FieldType::Text | FieldType::Json => None,
        }
    }
}

/// A value that can be bound to a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Uuid(Uuid),
    Datetime(DateTime<Utc>),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a serialized field value into a typed parameter value.
    pub fn from_json(json: &serde_json::Value, field_type: FieldType) -> Result<Self, StorageError> {
        use serde_json::Value as Json;

        let value = match (field_type, json) {
            (_, Json::Null) => Value::Null,
            (FieldType::Bool, Json::Bool(b)) => Value::Bool(*b),
            (FieldType::Int | FieldType::BigInt, Json::Number(n)) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            (FieldType::Float, Json::Number(n)) => Value::Float(n.as_f64().unwrap_or_default()),
            (FieldType::Uuid, Json::String(s)) => Value::Uuid(
                Uuid::parse_str(s)
                    .map_err(|e| invalid_value(format!("Invalid uuid {s}: {e}")))?,
            ),
            (FieldType::Datetime, Json::String(s)) => Value::Datetime(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|e| invalid_value(format!("Invalid datetime {s}: {e}")))?
                    .with_timezone(&Utc),
            ),
            (FieldType::Timestamp, Json::String(s)) => Value::Timestamp(
                s.parse::<NaiveDateTime>()
                    .map_err(|e| invalid_value(format!("Invalid timestamp {s}: {e}")))?,
            ),
            (FieldType::Text, Json::String(s)) => Value::String(s.clone()),
            (FieldType::Text, Json::Bool(b)) => Value::String(b.to_string()),
            (FieldType::Text, Json::Number(n)) => Value::String(n.to_string()),
            (_, other) => Value::Json(other.clone()),
        };

        Ok(value)
    }

    /// Convert a serialized value whose storage type is unknown.
    pub fn infer(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => Value::String(s.clone()),
            other => Value::Json(other.clone()),
        }
    }
}

fn invalid_value(message: String) -> StorageError {
    StorageError::SerializationError(serde::de::Error::custom(message))
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

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Value::Uuid(id)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::Datetime(dt)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::Timestamp(dt)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
