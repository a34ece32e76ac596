//! Saga types and their static descriptors.
//!
//! A descriptor is the declarative stand-in for attribute scanning: it lists
//! every persisted property path with its storage type, names the
//! correlation id and version properties, and carries column overrides.
//! `#[derive(Saga)]` generates one; it can also be built by hand.

use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::mapping::{FieldMapping, FieldMappings};
use crate::value::FieldType;

/// A correlated unit of workflow state that can be persisted.
///
/// Property names are the serde keys of the type; nested objects are walked
/// by dotted path.
pub trait Saga: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Static description of the persisted shape.
    fn descriptor() -> SagaDescriptor;

    fn correlation_id(&self) -> Uuid;

    /// Current version for optimistic concurrency, `None` if unversioned.
    fn version(&self) -> Option<i32> {
        None
    }

    fn set_version(&mut self, _version: i32) {}
}

/// Types whose fields are flattened into a parent saga's columns.
pub trait SagaFields {
    fn saga_fields() -> Vec<FieldDescriptor>;
}

/// One persisted property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub path: String,
    pub field_type: FieldType,
    /// Explicit column name, replacing mapping resolution for this path.
    pub column: Option<String>,
}

impl FieldDescriptor {
    pub fn new(path: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            path: path.into(),
            field_type,
            column: None,
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Re-root this field below `parent`.
    pub fn nested_under(mut self, parent: &str) -> Self {
        self.path = format!("{}.{}", parent, self.path);
        self
    }
}

/// Declarative per-type persistence metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaDescriptor {
    type_name: String,
    table: Option<String>,
    correlation_id: Option<String>,
    version: Option<String>,
    fields: Vec<FieldDescriptor>,
    mappings: Vec<FieldMapping>,
}

impl SagaDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: None,
            correlation_id: None,
            version: None,
            fields: Vec::new(),
            mappings: Vec::new(),
        }
    }

    /// Override the conventional `{TypeName}s` table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add a persisted property.
    pub fn field(mut self, path: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDescriptor::new(path, field_type));
        self
    }

    /// Add a persisted property stored under an explicit column.
    pub fn field_as(
        mut self,
        path: impl Into<String>,
        field_type: FieldType,
        column: impl Into<String>,
    ) -> Self {
        self.fields
            .push(FieldDescriptor::new(path, field_type).with_column(column));
        self
    }

    /// Add the fields of a nested object below `parent`.
    pub fn flatten(mut self, parent: &str, fields: Vec<FieldDescriptor>) -> Self {
        self.fields
            .extend(fields.into_iter().map(|f| f.nested_under(parent)));
        self
    }

    /// Use a property other than `CorrelationId` as the key.
    pub fn correlation_id(mut self, path: impl Into<String>) -> Self {
        self.correlation_id = Some(path.into());
        self
    }

    /// Mark the version property, enabling optimistic concurrency.
    ///
    /// Adds the property as an `Int` field when it is not already declared.
    pub fn version(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !self.fields.iter().any(|f| f.path == path) {
            self.fields.push(FieldDescriptor::new(path.clone(), FieldType::Int));
        }
        self.version = Some(path);
        self
    }

    pub fn map_property(mut self, path: impl Into<String>, column: impl Into<String>) -> Self {
        self.mappings.push(FieldMapping::exact(path, column));
        self
    }

    pub fn map_prefix(mut self, path: impl Into<String>, prefix: Option<&str>) -> Self {
        self.mappings.push(FieldMapping::prefix(path, prefix));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn correlation_id_override(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn version_property(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_type(&self, path: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.field_type)
    }

    /// Mapping entries implied by field column overrides, then explicit ones.
    pub fn mappings(&self) -> FieldMappings {
        let mut mappings = FieldMappings::new();
        for field in &self.fields {
            if let Some(column) = &field.column {
                mappings.push(FieldMapping::exact(field.path.clone(), column.clone()));
            }
        }
        for mapping in &self.mappings {
            mappings.push(mapping.clone());
        }
        mappings
    }
}
