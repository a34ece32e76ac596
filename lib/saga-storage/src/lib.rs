//! Saga Storage - relational persistence for long-lived saga instances.
//!
//! Saga state is stored one row per instance, keyed by correlation id, with
//! optional optimistic concurrency through a version column and row locks
//! held by every read for the life of the transaction.
//!
//! # Core Concepts
//!
//! - **Descriptor**: static per-type metadata listing every persisted
//!   property path, generated by `#[derive(Saga)]`.
//! - **Mappings**: exact and prefix rules that turn property paths into
//!   column names.
//! - **Dialect**: identifier quoting, parameter placeholders and lock clause
//!   of one SQL engine family.
//!
//! # Traits
//!
//! - [`Saga`]: Types that can be persisted
//! - [`SagaSqlFormatter`]: Builds load, query, insert, update and delete statements
//! - [`DatabaseContext`]: Saga operations inside one transaction
//! - [`SagaConnector`] / [`SagaTransaction`]: The driver seam

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::unwrap_in_result,
        clippy::panic
    )
)]

mod context;
mod dialect;
mod error;
mod executor;
mod factory;
mod filter;
mod formatter;
mod mapping;
mod metadata;
mod options;
mod saga;
mod statement;
mod value;

#[cfg(test)]
mod testing;

pub use context::{DatabaseContext, SagaDatabaseContext};
pub use dialect::{DatabaseProvider, Dialect, LockClause, ParameterStyle};
pub use error::{SagaOperation, StorageError};
pub use executor::{Record, SagaConnector, SagaTransaction};
pub use factory::{BoxFuture, ContextFactory, SagaRepositoryContextFactory};
pub use filter::{FieldFilter, Filter, Operator, PredicateVisitor, SqlPredicate};
pub use formatter::{SagaFormatter, SagaFormatterBuilder, SagaSqlFormatter};
pub use mapping::{FieldMapping, FieldMappings, MappingKind};
pub use metadata::{
    ResolvedField, SagaMetadata, enumerate_insertable_fields, parameter_name,
    resolve_id_column, resolve_table_name, resolve_version_column,
};
pub use options::{ConnectionConfig, IsolationLevel, SagaRepositoryOptions};
pub use saga::{FieldDescriptor, Saga, SagaDescriptor, SagaFields};
pub use statement::{
    Binding, BindingSource, ParameterKey, SqlCommand, SqlParameter, SqlStatement,
};
pub use value::{FieldType, Value};

// Used by generated code.
pub use uuid::Uuid;

// Re-export derive macros
// Note: Saga derive detects the correlation id and version by field name unless marked
pub use saga_storage_derive::{Saga, SagaFields};
