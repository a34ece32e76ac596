//! SQL generation for saga persistence.
//!
//! One [`SagaFormatter`] serves both dialects; the [`Dialect`] decides
//! quoting, placeholders and lock placement. Output depends only on the
//! resolved metadata, so every build method is idempotent.

use crate::StorageError;
use crate::dialect::{Dialect, ParameterStyle};
use crate::filter::{Filter, PredicateVisitor};
use crate::mapping::{FieldMapping, FieldMappings};
use crate::metadata::{CORRELATION_ID_PARAMETER, SagaMetadata, VERSION_PARAMETER};
use crate::saga::SagaDescriptor;
use crate::statement::{
    Binding, BindingSource, ParameterKey, SqlCommand, SqlParameter, SqlStatement,
};

/// Builds the statements used by a database context.
///
/// Implement this to support a schema the default formatter cannot express.
pub trait SagaSqlFormatter: Send + Sync {
    /// Resolved metadata, used to map rows back into instances.
    fn metadata(&self) -> &SagaMetadata;

    /// Single-row select by id, holding a row lock.
    fn build_load_sql(&self) -> SqlStatement;

    /// Multi-row select matching `filter`, holding row locks.
    fn build_query_sql(&self, filter: &Filter) -> Result<SqlCommand, StorageError>;

    fn build_insert_sql(&self) -> SqlStatement;

    /// Update by id, guarded by the version column when versioned.
    fn build_update_sql(&self) -> SqlStatement;

    /// Delete by id, guarded by the version column when versioned.
    fn build_delete_sql(&self) -> SqlStatement;
}

/// Assigns parameter keys in registration order.
struct BindingPlan {
    style: ParameterStyle,
    bindings: Vec<Binding>,
}

impl BindingPlan {
    fn new(style: ParameterStyle) -> Self {
        Self {
            style,
            bindings: Vec::new(),
        }
    }

    fn add(&mut self, name: &str, source: BindingSource) -> String {
        let key = self.style.key(self.bindings.len() + 1, name);
        let placeholder = key.placeholder();
        self.bindings.push(Binding { key, source });
        placeholder
    }

    fn finish(self, sql: String) -> SqlStatement {
        SqlStatement {
            sql,
            bindings: self.bindings,
        }
    }
}

/// Dialect-driven formatter over resolved saga metadata.
#[derive(Debug, Clone)]
pub struct SagaFormatter {
    dialect: Dialect,
    metadata: SagaMetadata,
}

impl SagaFormatter {
    /// Formatter with no overrides beyond those in the descriptor.
    pub fn new(dialect: Dialect, descriptor: &SagaDescriptor) -> Result<Self, StorageError> {
        Self::builder(dialect, descriptor).build()
    }

    pub fn builder(dialect: Dialect, descriptor: &SagaDescriptor) -> SagaFormatterBuilder {
        SagaFormatterBuilder {
            dialect,
            descriptor: descriptor.clone(),
            table_name: None,
            id_column: None,
            mappings: descriptor.mappings(),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn quote(&self, identifier: &str) -> String {
        self.dialect.quote(identifier)
    }

    /// `<id> = <p>` plus the version guard, registering both parameters.
    fn key_predicate(&self, plan: &mut BindingPlan) -> (String, Option<String>) {
        let id = plan.add(CORRELATION_ID_PARAMETER, BindingSource::CorrelationId);
        let mut predicate = format!("{} = {}", self.quote(self.metadata.id_column()), id);

        let version = self.metadata.version_column().map(|column| {
            let version = plan.add(VERSION_PARAMETER, BindingSource::Version);
            (column, version)
        });

        if let Some((column, placeholder)) = &version {
            predicate.push_str(&format!(" AND {} < {}", self.quote(column), placeholder));
        }

        (predicate, version.map(|(_, placeholder)| placeholder))
    }
}

impl SagaSqlFormatter for SagaFormatter {
    fn metadata(&self) -> &SagaMetadata {
        &self.metadata
    }

    fn build_load_sql(&self) -> SqlStatement {
        let mut plan = BindingPlan::new(self.dialect.parameters);
        let id = plan.add(CORRELATION_ID_PARAMETER, BindingSource::CorrelationId);

        let sql = format!(
            "{} WHERE {} = {}{}",
            self.dialect.locked_select(self.metadata.table()),
            self.quote(self.metadata.id_column()),
            id,
            self.dialect.lock_suffix()
        );

        plan.finish(sql)
    }

    fn build_query_sql(&self, filter: &Filter) -> Result<SqlCommand, StorageError> {
        let predicates = PredicateVisitor::new(&self.metadata).visit(filter)?;

        let root = self.dialect.locked_select(self.metadata.table());
        let lock = self.dialect.lock_suffix();

        if predicates.is_empty() {
            return Ok(SqlCommand {
                sql: format!("{}{}", root, lock),
                parameters: Vec::new(),
            });
        }

        let mut clauses = Vec::with_capacity(predicates.len());
        let mut parameters = Vec::with_capacity(predicates.len());

        for (index, predicate) in predicates.into_iter().enumerate() {
            let key: ParameterKey = self
                .dialect
                .parameters
                .key(index + 1, &format!("value{}", index));
            clauses.push(format!(
                "{} {} {}",
                self.quote(&predicate.column),
                predicate.operator,
                key.placeholder()
            ));
            parameters.push(SqlParameter {
                key,
                value: predicate.value,
                field_type: predicate.field_type,
            });
        }

        Ok(SqlCommand {
            sql: format!("{} WHERE {}{}", root, clauses.join(" AND "), lock),
            parameters,
        })
    }

    fn build_insert_sql(&self) -> SqlStatement {
        let mut plan = BindingPlan::new(self.dialect.parameters);
        let mut columns = Vec::new();
        let mut values = Vec::new();

        columns.push(self.quote(self.metadata.id_column()));
        values.push(plan.add(CORRELATION_ID_PARAMETER, BindingSource::CorrelationId));

        if let Some(version) = self.metadata.version_column() {
            columns.push(self.quote(version));
            values.push(plan.add(VERSION_PARAMETER, BindingSource::Version));
        }

        for field in self.metadata.fields() {
            columns.push(self.quote(&field.column));
            values.push(plan.add(&field.parameter, BindingSource::Field(field.path.clone())));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.metadata.table(),
            columns.join(", "),
            values.join(", ")
        );

        plan.finish(sql)
    }

    fn build_update_sql(&self) -> SqlStatement {
        let mut plan = BindingPlan::new(self.dialect.parameters);
        let (predicate, version) = self.key_predicate(&mut plan);

        let mut assignments: Vec<String> = self
            .metadata
            .fields()
            .iter()
            .map(|field| {
                let placeholder =
                    plan.add(&field.parameter, BindingSource::Field(field.path.clone()));
                format!("{} = {}", self.quote(&field.column), placeholder)
            })
            .collect();

        if let (Some(column), Some(placeholder)) = (self.metadata.version_column(), version) {
            assignments.push(format!("{} = {}", self.quote(column), placeholder));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.metadata.table(),
            assignments.join(", "),
            predicate
        );

        plan.finish(sql)
    }

    fn build_delete_sql(&self) -> SqlStatement {
        let mut plan = BindingPlan::new(self.dialect.parameters);
        let (predicate, _) = self.key_predicate(&mut plan);

        let sql = format!("DELETE FROM {} WHERE {}", self.metadata.table(), predicate);

        plan.finish(sql)
    }
}

/// Collects overrides and mappings; resolution happens once in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SagaFormatterBuilder {
    dialect: Dialect,
    descriptor: SagaDescriptor,
    table_name: Option<String>,
    id_column: Option<String>,
    mappings: FieldMappings,
}

impl SagaFormatterBuilder {
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    /// Prefix the columns of every field below `path`.
    pub fn map_prefix(mut self, path: impl Into<String>, prefix: Option<&str>) -> Self {
        self.mappings.push(FieldMapping::prefix(path, prefix));
        self
    }

    /// Store the field at `path` in the column `name`.
    pub fn map_property(mut self, path: impl Into<String>, name: impl Into<String>) -> Self {
        self.mappings.push(FieldMapping::exact(path, name));
        self
    }

    pub fn build(self) -> Result<SagaFormatter, StorageError> {
        let metadata = SagaMetadata::resolve(
            &self.descriptor,
            self.mappings,
            self.table_name.as_deref(),
            self.id_column.as_deref(),
        )?;

        Ok(SagaFormatter {
            dialect: self.dialect,
            metadata,
        })
    }
}
