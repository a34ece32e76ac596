//! Unit-of-work context over one open transaction.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::StorageError;
use crate::error::SagaOperation;
use crate::executor::{Record, SagaTransaction};
use crate::filter::Filter;
use crate::formatter::SagaSqlFormatter;
use crate::saga::Saga;
use crate::statement::{BindingSource, SqlCommand, SqlParameter, SqlStatement};
use crate::value::{FieldType, Value};

/// Saga operations scoped to one transaction.
///
/// A context is used by one task at a time. `commit` and `rollback` consume
/// it; dropping it without either rolls the transaction back.
#[async_trait]
pub trait DatabaseContext<S: Saga>: Send {
    /// Fetch one instance by id, locking its row until the transaction ends.
    async fn load(&mut self, correlation_id: Uuid) -> Result<Option<S>, StorageError>;

    /// Fetch every instance matching `filter`, locking the rows.
    async fn query(&mut self, filter: &Filter) -> Result<Vec<S>, StorageError>;

    async fn insert(&mut self, instance: &mut S) -> Result<(), StorageError>;

    async fn update(&mut self, instance: &mut S) -> Result<(), StorageError>;

    async fn delete(&mut self, instance: &mut S) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Formatter-driven context over a [`SagaTransaction`].
pub struct SagaDatabaseContext<S, T> {
    transaction: T,
    formatter: Arc<dyn SagaSqlFormatter>,
    _saga: PhantomData<fn() -> S>,
}

impl<S: Saga, T: SagaTransaction> SagaDatabaseContext<S, T> {
    pub fn new(transaction: T, formatter: Arc<dyn SagaSqlFormatter>) -> Self {
        Self {
            transaction,
            formatter,
            _saga: PhantomData,
        }
    }

    /// Attach concrete values to a statement's binding plan.
    fn bind(
        &self,
        statement: SqlStatement,
        correlation_id: Uuid,
        version: Option<i32>,
        instance: Option<&Json>,
    ) -> Result<SqlCommand, StorageError> {
        let metadata = self.formatter.metadata();
        let mut parameters = Vec::with_capacity(statement.bindings.len());

        for binding in statement.bindings {
            let (value, field_type) = match binding.source {
                BindingSource::CorrelationId => (Value::Uuid(correlation_id), Some(FieldType::Uuid)),
                BindingSource::Version => {
                    (Value::from(version.map(i64::from)), Some(FieldType::Int))
                }
                BindingSource::Field(path) => {
                    let field_type = metadata.field_type(&path);
                    let value = match (instance.and_then(|json| lookup(json, &path)), field_type) {
                        (None, _) => Value::Null,
                        (Some(json), Some(field_type)) => Value::from_json(json, field_type)?,
                        (Some(json), None) => Value::infer(json),
                    };
                    (value, field_type)
                }
            };

            parameters.push(SqlParameter {
                key: binding.key,
                value,
                field_type,
            });
        }

        Ok(SqlCommand {
            sql: statement.sql,
            parameters,
        })
    }

    /// Rebuild an instance from a row by walking the declared fields.
    fn materialize(&self, record: &Record) -> Result<S, StorageError> {
        let metadata = self.formatter.metadata();
        let mut object = Map::new();

        if let Some(property) = metadata.id_property() {
            if let Some(value) = column(record, metadata.id_column()) {
                insert_path(&mut object, property, value.clone());
            }
        }

        for field in metadata.columns() {
            if Some(field.path.as_str()) == metadata.id_property() {
                continue;
            }
            match column(record, &field.column) {
                Some(Json::Null) | None => {}
                Some(value) => insert_path(
                    &mut object,
                    &field.path,
                    column_json(value, field.field_type),
                ),
            }
        }

        Ok(serde_json::from_value(Json::Object(object))?)
    }

    async fn fetch(&mut self, command: SqlCommand) -> Result<Vec<S>, StorageError> {
        debug!(
            saga_type = %self.formatter.metadata().saga_type(),
            sql = %command.sql,
            parameters = command.parameters.len(),
            "fetching sagas"
        );

        let records = self.transaction.fetch(&command).await?;
        records
            .iter()
            .map(|record| self.materialize(record))
            .collect()
    }

    /// Run a write, advancing the version first and restoring it on failure.
    async fn write(
        &mut self,
        instance: &mut S,
        statement: SqlStatement,
        operation: SagaOperation,
    ) -> Result<(), StorageError> {
        let versioned = self.formatter.metadata().is_versioned();
        let previous = instance.version();

        let version = if versioned {
            let current = previous.unwrap_or(0);
            let next = current
                .checked_add(1)
                .ok_or_else(|| StorageError::VersionOverflow {
                    saga_type: self.formatter.metadata().saga_type().to_string(),
                    correlation_id: instance.correlation_id(),
                    version: current,
                })?;
            instance.set_version(next);
            Some(next)
        } else {
            previous
        };

        let result = self.execute_write(instance, statement, version).await;

        let outcome = match result {
            Ok(0) => Err(StorageError::Concurrency {
                saga_type: self.formatter.metadata().saga_type().to_string(),
                correlation_id: instance.correlation_id(),
                operation,
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        if outcome.is_err() && versioned {
            instance.set_version(previous.unwrap_or(0));
        }

        if let Err(StorageError::Concurrency { .. }) = &outcome {
            debug!(
                saga_type = %self.formatter.metadata().saga_type(),
                correlation_id = %instance.correlation_id(),
                %operation,
                "write affected no rows"
            );
        }

        outcome
    }

    async fn execute_write(
        &mut self,
        instance: &S,
        statement: SqlStatement,
        version: Option<i32>,
    ) -> Result<u64, StorageError> {
        let json = serde_json::to_value(instance)?;
        let command = self.bind(statement, instance.correlation_id(), version, Some(&json))?;

        debug!(
            saga_type = %self.formatter.metadata().saga_type(),
            correlation_id = %instance.correlation_id(),
            sql = %command.sql,
            "executing saga write"
        );

        self.transaction.execute(&command).await
    }
}

#[async_trait]
impl<S: Saga, T: SagaTransaction> DatabaseContext<S> for SagaDatabaseContext<S, T> {
    async fn load(&mut self, correlation_id: Uuid) -> Result<Option<S>, StorageError> {
        let statement = self.formatter.build_load_sql();
        let command = self.bind(statement, correlation_id, None, None)?;
        let mut sagas = self.fetch(command).await?;

        if sagas.len() > 1 {
            warn!(
                saga_type = %self.formatter.metadata().saga_type(),
                %correlation_id,
                rows = sagas.len(),
                "load matched more than one row"
            );
        }

        Ok(if sagas.is_empty() {
            None
        } else {
            Some(sagas.swap_remove(0))
        })
    }

    async fn query(&mut self, filter: &Filter) -> Result<Vec<S>, StorageError> {
        let command = self.formatter.build_query_sql(filter)?;
        self.fetch(command).await
    }

    async fn insert(&mut self, instance: &mut S) -> Result<(), StorageError> {
        let statement = self.formatter.build_insert_sql();
        self.write(instance, statement, SagaOperation::Insert).await
    }

    async fn update(&mut self, instance: &mut S) -> Result<(), StorageError> {
        let statement = self.formatter.build_update_sql();
        self.write(instance, statement, SagaOperation::Update).await
    }

    async fn delete(&mut self, instance: &mut S) -> Result<(), StorageError> {
        let statement = self.formatter.build_delete_sql();
        self.write(instance, statement, SagaOperation::Delete).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.transaction.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.transaction.rollback().await
    }
}

fn lookup<'j>(json: &'j Json, path: &str) -> Option<&'j Json> {
    path.split('.').try_fold(json, |node, segment| node.get(segment))
}

/// Column value by name, falling back to a case-insensitive match.
fn column<'r>(record: &'r Record, name: &str) -> Option<&'r Json> {
    record.get(name).or_else(|| {
        record
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Offset-less text read into a `Datetime` field is taken as UTC.
fn column_json(value: &Json, field_type: FieldType) -> Json {
    match (field_type, value) {
        (FieldType::Datetime, Json::String(s)) if DateTime::parse_from_rfc3339(s).is_err() => {
            match s.parse::<NaiveDateTime>() {
                Ok(naive) => Json::String(naive.and_utc().to_rfc3339()),
                Err(_) => value.clone(),
            }
        }
        _ => value.clone(),
    }
}

fn insert_path(object: &mut Map<String, Json>, path: &str, value: Json) {
    match path.split_once('.') {
        None => {
            object.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = object
                .entry(head.to_string())
                .or_insert_with(|| Json::Object(Map::new()));
            if let Json::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}
