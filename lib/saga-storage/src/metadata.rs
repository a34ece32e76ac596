//! Table, key, version and column resolution for a saga type.

use crate::mapping::FieldMappings;
use crate::saga::SagaDescriptor;
use crate::value::FieldType;
use crate::StorageError;

/// Convention name of the correlation id property.
pub const CORRELATION_ID: &str = "CorrelationId";

const CORRELATION_ID_SNAKE: &str = "correlation_id";

/// Named parameter carrying the correlation id.
pub(crate) const CORRELATION_ID_PARAMETER: &str = "correlationId";

/// Named parameter carrying the version.
pub(crate) const VERSION_PARAMETER: &str = "version";

/// A persisted field with its column and parameter name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub path: String,
    pub column: String,
    pub parameter: String,
    pub field_type: FieldType,
}

/// Returns `table_override` if given, else the descriptor's table, else `{TypeName}s`.
pub fn resolve_table_name(descriptor: &SagaDescriptor, table_override: Option<&str>) -> String {
    if let Some(table) = table_override {
        return table.to_string();
    }
    match descriptor.table_name() {
        Some(table) => table.to_string(),
        None => format!("{}s", descriptor.type_name()),
    }
}

/// The property holding the correlation id, if one can be found.
pub fn resolve_id_property(descriptor: &SagaDescriptor) -> Option<String> {
    if let Some(path) = descriptor.correlation_id_override() {
        return Some(path.to_string());
    }
    descriptor
        .fields()
        .iter()
        .find(|f| f.path == CORRELATION_ID || f.path == CORRELATION_ID_SNAKE)
        .map(|f| f.path.clone())
}

/// Returns `id_override` if given, else the column of the correlation id property.
pub fn resolve_id_column(
    descriptor: &SagaDescriptor,
    mappings: &FieldMappings,
    id_override: Option<&str>,
) -> Result<String, StorageError> {
    if let Some(column) = id_override {
        return Ok(column.to_string());
    }
    match resolve_id_property(descriptor) {
        Some(path) => Ok(mappings.resolve(&path)),
        None => Err(StorageError::configuration(format!(
            "Only {} can be auto-detected as the key column of {}; configure an id column override",
            CORRELATION_ID,
            descriptor.type_name()
        ))),
    }
}

/// The version column, present only for versioned types.
pub fn resolve_version_column(
    descriptor: &SagaDescriptor,
    mappings: &FieldMappings,
) -> Option<String> {
    descriptor
        .version_property()
        .map(|path| mappings.resolve(path))
}

/// Every field except the excluded columns and properties, in declaration order.
pub fn enumerate_insertable_fields(
    descriptor: &SagaDescriptor,
    mappings: &FieldMappings,
    excluded_columns: &[&str],
    excluded_paths: &[&str],
) -> Vec<ResolvedField> {
    descriptor
        .fields()
        .iter()
        .filter(|f| !excluded_paths.contains(&f.path.as_str()))
        .map(|f| ResolvedField {
            path: f.path.clone(),
            column: mappings.resolve(&f.path),
            parameter: parameter_name(&f.path),
            field_type: f.field_type,
        })
        .filter(|f| !excluded_columns.contains(&f.column.as_str()))
        .collect()
}

/// Camel-case a property path into a parameter name.
///
/// `Name` -> `name`, `PhoneNumber` -> `phoneNumber`, `Zip_Code` -> `zipCode`,
/// `Nested.Id` -> `nestedId`.
pub fn parameter_name(path: &str) -> String {
    let parts: Vec<&str> = path
        .split([' ', '_', '.'])
        .filter(|p| !p.is_empty())
        .collect();

    match parts.as_slice() {
        [] => String::new(),
        [first, rest @ ..] => {
            let mut name = lower_first(first);
            for part in rest {
                name.push_str(&upper_first(part));
            }
            name
        }
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Fail when two persisted fields land on the same column or named parameter.
///
/// Columns compare case-insensitively, as both dialects fold or ignore case.
fn ensure_distinct(
    descriptor: &SagaDescriptor,
    id_column: &str,
    version_column: Option<&str>,
    fields: &[ResolvedField],
) -> Result<(), StorageError> {
    let id_owner = resolve_id_property(descriptor).unwrap_or_else(|| id_column.to_string());
    let mut columns: Vec<(String, &str)> = vec![(id_column.to_lowercase(), id_owner.as_str())];
    let mut parameters: Vec<(&str, &str)> = vec![(CORRELATION_ID_PARAMETER, id_owner.as_str())];
    if let (Some(column), Some(path)) = (version_column, descriptor.version_property()) {
        columns.push((column.to_lowercase(), path));
        parameters.push((VERSION_PARAMETER, path));
    }

    for field in fields {
        let column = field.column.to_lowercase();
        if let Some((_, owner)) = columns.iter().find(|(seen, _)| *seen == column) {
            return Err(StorageError::configuration(format!(
                "{} and {} of {} both map to column {}; map a prefix or a column override",
                owner,
                field.path,
                descriptor.type_name(),
                field.column
            )));
        }
        if let Some((_, owner)) = parameters.iter().find(|(seen, _)| *seen == field.parameter) {
            return Err(StorageError::configuration(format!(
                "{} and {} of {} both bind as @{}",
                owner,
                field.path,
                descriptor.type_name(),
                field.parameter
            )));
        }
        columns.push((column, field.path.as_str()));
        parameters.push((field.parameter.as_str(), field.path.as_str()));
    }

    Ok(())
}

/// Everything the formatter and context need to know about a saga type,
/// resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaMetadata {
    saga_type: String,
    table: String,
    id_column: String,
    id_property: Option<String>,
    version_column: Option<String>,
    version_property: Option<String>,
    /// Insertable fields, id and version excluded.
    fields: Vec<ResolvedField>,
    /// Every declared field, used for row mapping and filter typing.
    columns: Vec<ResolvedField>,
    mappings: FieldMappings,
}

impl SagaMetadata {
    pub fn resolve(
        descriptor: &SagaDescriptor,
        mappings: FieldMappings,
        table_override: Option<&str>,
        id_override: Option<&str>,
    ) -> Result<Self, StorageError> {
        let table = resolve_table_name(descriptor, table_override);
        let id_column = resolve_id_column(descriptor, &mappings, id_override)?;
        let id_property = resolve_id_property(descriptor);
        let version_column = resolve_version_column(descriptor, &mappings);
        let version_property = descriptor.version_property().map(str::to_string);

        let mut excluded_columns = vec![id_column.as_str()];
        excluded_columns.extend(version_column.as_deref());
        let mut excluded_paths = Vec::new();
        excluded_paths.extend(id_property.as_deref());
        excluded_paths.extend(version_property.as_deref());

        let fields =
            enumerate_insertable_fields(descriptor, &mappings, &excluded_columns, &excluded_paths);
        let columns = enumerate_insertable_fields(descriptor, &mappings, &[], &[]);
        ensure_distinct(descriptor, &id_column, version_column.as_deref(), &fields)?;

        Ok(Self {
            saga_type: descriptor.type_name().to_string(),
            table,
            id_column,
            id_property,
            version_column,
            version_property,
            fields,
            columns,
            mappings,
        })
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn id_property(&self) -> Option<&str> {
        self.id_property.as_deref()
    }

    pub fn version_column(&self) -> Option<&str> {
        self.version_column.as_deref()
    }

    pub fn version_property(&self) -> Option<&str> {
        self.version_property.as_deref()
    }

    pub fn is_versioned(&self) -> bool {
        self.version_column.is_some()
    }

    pub fn fields(&self) -> &[ResolvedField] {
        &self.fields
    }

    pub fn columns(&self) -> &[ResolvedField] {
        &self.columns
    }

    pub fn mappings(&self) -> &FieldMappings {
        &self.mappings
    }

    pub fn column_for(&self, path: &str) -> String {
        self.mappings.resolve(path)
    }

    pub fn field_type(&self, path: &str) -> Option<FieldType> {
        self.columns
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.field_type)
    }
}
