//! Repository configuration.

use serde::Deserialize;

use crate::StorageError;
use crate::dialect::DatabaseProvider;

/// Connection configuration for database backends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConnectionConfig {
    /// Connect using a database URL or connection string.
    Url(String),
}

impl From<&str> for ConnectionConfig {
    fn from(url: &str) -> Self {
        ConnectionConfig::Url(url.to_string())
    }
}

impl From<String> for ConnectionConfig {
    fn from(url: String) -> Self {
        ConnectionConfig::Url(url)
    }
}

impl From<&String> for ConnectionConfig {
    fn from(url: &String) -> Self {
        ConnectionConfig::Url(url.clone())
    }
}

/// Transaction isolation level for each unit of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Snapshot,
    #[default]
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Snapshot => "SNAPSHOT",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Per-saga-type repository options, fixed before first use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SagaRepositoryOptions {
    pub connection: Option<ConnectionConfig>,
    pub provider: Option<DatabaseProvider>,
    pub isolation_level: IsolationLevel,
    pub table_name: Option<String>,
    pub id_column_name: Option<String>,
}

impl SagaRepositoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_sql_server(mut self, connection: impl Into<ConnectionConfig>) -> Self {
        self.connection = Some(connection.into());
        self.provider = Some(DatabaseProvider::SqlServer);
        self
    }

    pub fn use_postgres(mut self, connection: impl Into<ConnectionConfig>) -> Self {
        self.connection = Some(connection.into());
        self.provider = Some(DatabaseProvider::Postgres);
        self
    }

    pub fn use_provider(mut self, provider: DatabaseProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn use_isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.isolation_level = isolation_level;
        self
    }

    pub fn use_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn use_id_column_name(mut self, id_column_name: impl Into<String>) -> Self {
        self.id_column_name = Some(id_column_name.into());
        self
    }

    /// The connection string, failing when none is configured.
    pub fn connection_url(&self) -> Result<&str, StorageError> {
        match &self.connection {
            Some(ConnectionConfig::Url(url)) if !url.trim().is_empty() => Ok(url),
            _ => Err(StorageError::configuration(
                "ConnectionString must be specified",
            )),
        }
    }

    /// Check the options are complete enough to connect from.
    pub fn validate(&self) -> Result<(), StorageError> {
        self.connection_url()?;
        if self.provider.is_none() {
            return Err(StorageError::configuration("Provider must be specified"));
        }
        self.validate_settings()
    }

    /// Check the settings still read once a connector exists.
    ///
    /// A configured connection string and the name overrides must not be blank.
    pub fn validate_settings(&self) -> Result<(), StorageError> {
        if self.connection.is_some() {
            self.connection_url()?;
        }
        if blank(self.table_name.as_deref()) {
            return Err(StorageError::configuration("TableName must not be blank"));
        }
        if blank(self.id_column_name.as_deref()) {
            return Err(StorageError::configuration(
                "IdColumnName must not be blank",
            ));
        }
        Ok(())
    }
}

fn blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().is_empty())
}
