//! Row decoding into column-keyed JSON records.

use saga_storage::{Record, StorageError};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

/// Decode every column of a row.
pub fn record_from_row(row: &PgRow) -> Result<Record, StorageError> {
    let mut record = Record::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let value = extract_column_value(row, idx)?;
        record.insert(column.name().to_string(), value);
    }

    Ok(record)
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<Option<T>, StorageError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
        .map_err(StorageError::driver)
}

/// Extract a column value from a row as JSON
fn extract_column_value(row: &PgRow, idx: usize) -> Result<Value, StorageError> {
    let type_name = row.columns()[idx].type_info().name();

    // Handle based on PostgreSQL type
    let value = match type_name {
        "BOOL" => get::<bool>(row, idx)?.map(Value::Bool),
        "INT2" => get::<i16>(row, idx)?.map(Value::from),
        "INT4" => get::<i32>(row, idx)?.map(Value::from),
        "INT8" => get::<i64>(row, idx)?.map(Value::from),
        "FLOAT4" => get::<f32>(row, idx)?
            .and_then(|n| serde_json::Number::from_f64(f64::from(n)).map(Value::Number)),
        "FLOAT8" => get::<f64>(row, idx)?
            .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number)),
        "UUID" => get::<uuid::Uuid>(row, idx)?.map(|id| Value::String(id.to_string())),
        "TIMESTAMPTZ" => get::<chrono::DateTime<chrono::Utc>>(row, idx)?
            .map(|dt| Value::String(dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))),
        // Serde's own text form for NaiveDateTime, no offset.
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, idx)?
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => get::<chrono::NaiveDate>(row, idx)?.map(|d| Value::String(d.to_string())),
        "JSONB" | "JSON" => get::<Value>(row, idx)?,
        // Default: treat as string (VARCHAR, TEXT, CHAR, etc.)
        _ => get::<String>(row, idx)?.map(Value::String),
    };

    Ok(value.unwrap_or(Value::Null))
}
