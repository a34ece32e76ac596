//! Parameter binding for PostgreSQL statements.
//!
//! Parameters are bound by position, using the field type to pick the wire
//! type of nulls and of values whose serialized form is ambiguous.

use chrono::{DateTime, NaiveDateTime, Utc};
use saga_storage::{FieldType, ParameterKey, SqlParameter, StorageError, Value};
use sqlx::Arguments;
use sqlx::postgres::PgArguments;
use uuid::Uuid;

/// Bind parameters in `$n` order.
///
/// Fails when a parameter is named or the positions are not `1..=n`.
pub fn bind_parameters(parameters: &[SqlParameter]) -> Result<PgArguments, StorageError> {
    let mut ordered = parameters
        .iter()
        .map(|parameter| match &parameter.key {
            ParameterKey::Positional(position) => Ok((*position, parameter)),
            ParameterKey::Named(name) => Err(StorageError::configuration(format!(
                "PostgreSQL requires positional parameters, got @{}",
                name
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    ordered.sort_by_key(|(position, _)| *position);

    let mut args = PgArguments::default();
    for (expected, (position, parameter)) in ordered.into_iter().enumerate() {
        if position != expected + 1 {
            return Err(StorageError::configuration(format!(
                "Parameter ${} is missing or bound twice",
                expected + 1
            )));
        }
        bind_value(&mut args, &parameter.value, parameter.field_type)?;
    }

    Ok(args)
}

/// Bind a Value to PgArguments.
fn bind_value(
    args: &mut PgArguments,
    value: &Value,
    field_type: Option<FieldType>,
) -> Result<(), StorageError> {
    match value {
        Value::String(s) => match field_type {
            Some(FieldType::Uuid) => {
                let id = Uuid::parse_str(s).map_err(StorageError::driver)?;
                args.add(id)
            }
            Some(FieldType::Json) => args.add(serde_json::Value::String(s.clone())),
            _ => args.add(s.as_str()),
        },
        Value::Int(n) => match field_type {
            Some(FieldType::Int) => args.add(i32::try_from(*n).map_err(StorageError::driver)?),
            Some(FieldType::Float) => args.add(*n as f64),
            _ => args.add(*n),
        },
        Value::Float(n) => args.add(*n),
        Value::Bool(b) => args.add(*b),
        Value::Uuid(id) => args.add(*id),
        Value::Datetime(dt) => args.add(*dt),
        Value::Timestamp(dt) => args.add(*dt),
        Value::Json(json) => args.add(json.clone()),
        // Use the field type to bind the correct null type
        Value::Null => match field_type {
            Some(FieldType::Bool) => args.add(None::<bool>),
            Some(FieldType::Int) => args.add(None::<i32>),
            Some(FieldType::BigInt) => args.add(None::<i64>),
            Some(FieldType::Float) => args.add(None::<f64>),
            Some(FieldType::Uuid) => args.add(None::<Uuid>),
            Some(FieldType::Datetime) => args.add(None::<DateTime<Utc>>),
            Some(FieldType::Timestamp) => args.add(None::<NaiveDateTime>),
            Some(FieldType::Json) => args.add(None::<serde_json::Value>),
            Some(FieldType::Text) | None => args.add(None::<String>), // text and default
        },
    }
    .map_err(StorageError::Driver)
}
