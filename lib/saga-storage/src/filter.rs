//! Boolean saga filters and their translation into SQL predicates.
//!
//! Filters are a small AST built with [`Filter::field`] or constructed
//! directly. Only conjunctions of simple field tests are translatable; `Or`,
//! method calls and negation of anything but a boolean field are rejected.

use std::fmt;
use std::ops::Not;

use crate::StorageError;
use crate::metadata::SagaMetadata;
use crate::value::{FieldType, Value};

/// Comparison operators supported in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A boolean filter over saga fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row.
    All,
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    /// field <op> value
    Compare {
        field: String,
        operator: Operator,
        value: Value,
    },
    /// Bare field access, e.g. `x.IsActive`.
    Field(String),
    /// Method call on a field, e.g. `x.Name.Contains("a")`.
    Call {
        method: String,
        field: String,
        arguments: Vec<Value>,
    },
}

impl Filter {
    /// Start a test on the field at `path`.
    pub fn field(path: impl Into<String>) -> FieldFilter {
        FieldFilter { path: path.into() }
    }

    pub fn all() -> Self {
        Filter::All
    }

    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Self::Output {
        Filter::Not(Box::new(self))
    }
}

/// Builder for tests against a single field.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    path: String,
}

impl FieldFilter {
    fn compare(self, operator: Operator, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            field: self.path,
            operator,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(Operator::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.compare(Operator::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.compare(Operator::Lt, value)
    }

    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.compare(Operator::Lte, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.compare(Operator::Gt, value)
    }

    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.compare(Operator::Gte, value)
    }

    /// Bare access: true for booleans, non-default for value types.
    pub fn is_set(self) -> Filter {
        Filter::Field(self.path)
    }
}

/// A single column/operator/value test.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
    pub field_type: Option<FieldType>,
}

/// Walks a [`Filter`] and produces predicates in depth-first, left-to-right order.
pub struct PredicateVisitor<'a> {
    metadata: &'a SagaMetadata,
}

impl<'a> PredicateVisitor<'a> {
    pub fn new(metadata: &'a SagaMetadata) -> Self {
        Self { metadata }
    }

    pub fn visit(&self, filter: &Filter) -> Result<Vec<SqlPredicate>, StorageError> {
        let mut predicates = Vec::new();
        self.visit_into(filter, &mut predicates)?;
        Ok(predicates)
    }

    fn visit_into(
        &self,
        filter: &Filter,
        predicates: &mut Vec<SqlPredicate>,
    ) -> Result<(), StorageError> {
        match filter {
            Filter::All => Ok(()),
            Filter::And(left, right) => {
                self.visit_into(left, predicates)?;
                self.visit_into(right, predicates)
            }
            Filter::Compare {
                field,
                operator,
                value,
            } => {
                predicates.push(self.predicate(field, *operator, value.clone()));
                Ok(())
            }
            Filter::Not(inner) => match inner.as_ref() {
                Filter::Field(field) if self.metadata.field_type(field) == Some(FieldType::Bool) => {
                    predicates.push(self.predicate(field, Operator::Eq, Value::Bool(false)));
                    Ok(())
                }
                _ => Err(StorageError::unsupported(
                    "Negation is only supported for boolean fields",
                )),
            },
            Filter::Field(field) => {
                let value = match self.metadata.field_type(field) {
                    Some(FieldType::Bool) => Value::Bool(true),
                    Some(field_type) => field_type.default_value().unwrap_or(Value::Null),
                    None => {
                        return Err(StorageError::unsupported(format!(
                            "Cannot infer the type of {} for a bare field test",
                            field
                        )));
                    }
                };
                predicates.push(self.predicate(field, Operator::Eq, value));
                Ok(())
            }
            Filter::Or(_, _) => Err(StorageError::unsupported(
                "Disjunctions cannot be translated to predicates",
            )),
            Filter::Call { method, field, .. } => Err(StorageError::unsupported(format!(
                "Method call {}.{} is not supported",
                field, method
            ))),
        }
    }

    fn predicate(&self, field: &str, operator: Operator, value: Value) -> SqlPredicate {
        SqlPredicate {
            column: self.metadata.column_for(field),
            operator,
            value,
            field_type: self.metadata.field_type(field),
        }
    }
}
