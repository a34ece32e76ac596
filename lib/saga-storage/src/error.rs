use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// The write that produced a [`StorageError::Concurrency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaOperation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for SagaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SagaOperation::Insert => write!(f, "Saga Insert"),
            SagaOperation::Update => write!(f, "Saga Update"),
            SagaOperation::Delete => write!(f, "Saga Delete"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// Setup-time failure: missing connection, unresolvable id column, unknown dialect.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The filter uses a shape that cannot be translated to SQL predicates.
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// A write affected zero rows. Retry the whole unit of work from a fresh load.
    #[error("{operation} failed for {saga_type} ({correlation_id})")]
    Concurrency {
        saga_type: String,
        correlation_id: Uuid,
        operation: SagaOperation,
    },

    /// The version is already at its maximum and cannot advance.
    #[error("Version of {saga_type} ({correlation_id}) cannot advance past {version}")]
    VersionOverflow {
        saga_type: String,
        correlation_id: Uuid,
        version: i32,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Failure reported by the database driver, kept intact for classification.
    #[error("Driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub fn configuration(message: impl Into<String>) -> Self {
        StorageError::Configuration(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        StorageError::UnsupportedExpression(message.into())
    }

    /// Wrap a driver error without altering it.
    pub fn driver<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Driver(Box::new(error))
    }

    /// True when the error is the expected outcome of two writers racing.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, StorageError::Concurrency { .. })
    }
}
