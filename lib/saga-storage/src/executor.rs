//! Driver-facing traits.
//!
//! A backend implements [`SagaConnector`] to open one connection and one
//! transaction per unit of work, and [`SagaTransaction`] to run formatted
//! commands on it.

use async_trait::async_trait;

use crate::StorageError;
use crate::dialect::DatabaseProvider;
use crate::options::IsolationLevel;
use crate::statement::SqlCommand;

/// A result row: column name to value.
///
/// Column lookup by consumers is case-insensitive, since engines differ in
/// how they fold unquoted identifiers.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Executes commands on one open transaction.
///
/// Dropping an uncommitted transaction must roll it back and release the
/// connection.
#[async_trait]
pub trait SagaTransaction: Send {
    /// Run a query and materialize every row.
    async fn fetch(&mut self, command: &SqlCommand) -> Result<Vec<Record>, StorageError>;

    /// Run a statement and return the number of rows affected.
    async fn execute(&mut self, command: &SqlCommand) -> Result<u64, StorageError>;

    async fn commit(self) -> Result<(), StorageError>;

    async fn rollback(self) -> Result<(), StorageError>;
}

/// Opens a connection and begins a transaction on it.
#[async_trait]
pub trait SagaConnector: Send + Sync {
    type Transaction: SagaTransaction + 'static;

    /// The engine family this connector talks to, if fixed.
    fn provider(&self) -> Option<DatabaseProvider> {
        None
    }

    /// Open a connection and begin a transaction at `isolation_level`.
    ///
    /// Anything acquired before a failure must be released before returning.
    async fn begin(
        &self,
        isolation_level: IsolationLevel,
    ) -> Result<Self::Transaction, StorageError>;
}
