//! Statement text plus the parameters bound to it.

use std::fmt;

use crate::value::{FieldType, Value};

/// How a parameter is addressed by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterKey {
    /// `@name` style.
    Named(String),
    /// `$n` style, 1-indexed.
    Positional(usize),
}

impl ParameterKey {
    /// The placeholder text as it appears in SQL.
    pub fn placeholder(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKey::Named(name) => write!(f, "@{}", name),
            ParameterKey::Positional(position) => write!(f, "${}", position),
        }
    }
}

/// Where a statement parameter takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSource {
    CorrelationId,
    /// The incremented version of the instance being written.
    Version,
    /// A field of the instance, by property path.
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub key: ParameterKey,
    pub source: BindingSource,
}

/// SQL text with a plan for binding an instance's values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    pub key: ParameterKey,
    pub value: Value,
    /// Storage type, when known, for typed binding of nulls.
    pub field_type: Option<FieldType>,
}

/// SQL text with every parameter value attached; ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    pub sql: String,
    pub parameters: Vec<SqlParameter>,
}

impl SqlCommand {
    pub fn values(&self) -> Vec<&Value> {
        self.parameters.iter().map(|p| &p.value).collect()
    }
}
