//! PostgreSQL implementation of SagaConnector.

const DEFAULT_MAX_CONNECTIONS: u32 = 16;

use async_trait::async_trait;
use saga_storage::{
    DatabaseProvider, IsolationLevel, Record, Saga, SagaConnector, SagaRepositoryContextFactory,
    SagaRepositoryOptions, SagaTransaction, SqlCommand, StorageError,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Postgres, Transaction};
use std::ops::Deref;
use tracing::{debug, warn};

use crate::bind::bind_parameters;
use crate::row::record_from_row;

/// Wrapper around sqlx::PgPool that implements SagaConnector.
#[derive(Clone, Debug)]
pub struct PgConnector(sqlx::PgPool);

impl PgConnector {
    /// Create a new PgConnector from an sqlx PgPool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self(pool)
    }

    /// Connect to a PostgreSQL database.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(StorageError::driver)?;
        Ok(Self(pool))
    }

    /// Connect using the options' connection string and build a context
    /// factory for `S`.
    ///
    /// Options are validated before any connection is attempted.
    pub async fn context_factory<S: Saga>(
        options: &SagaRepositoryOptions,
    ) -> Result<SagaRepositoryContextFactory<S, PgConnector>, StorageError> {
        options.validate()?;
        if options.provider != Some(DatabaseProvider::Postgres) {
            return Err(StorageError::configuration(format!(
                "PgConnector cannot serve provider {:?}",
                options.provider
            )));
        }
        let connector = Self::connect(options.connection_url()?).await?;
        SagaRepositoryContextFactory::new(connector, options)
    }

    /// Get the inner sqlx::PgPool.
    pub fn inner(&self) -> &sqlx::PgPool {
        &self.0
    }
}

impl Deref for PgConnector {
    type Target = sqlx::PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Postgres has no SNAPSHOT level; its REPEATABLE READ is snapshot isolation.
fn isolation_sql(isolation_level: IsolationLevel) -> &'static str {
    match isolation_level {
        IsolationLevel::Snapshot => IsolationLevel::RepeatableRead.as_sql(),
        other => other.as_sql(),
    }
}

#[async_trait]
impl SagaConnector for PgConnector {
    type Transaction = PgSagaTransaction;

    fn provider(&self) -> Option<DatabaseProvider> {
        Some(DatabaseProvider::Postgres)
    }

    async fn begin(
        &self,
        isolation_level: IsolationLevel,
    ) -> Result<PgSagaTransaction, StorageError> {
        let mut tx = self.0.begin().await.map_err(StorageError::driver)?;

        let sql = format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            isolation_sql(isolation_level)
        );
        if let Err(e) = sqlx::query(&sql).execute(&mut *tx).await {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback after failed begin");
            }
            return Err(StorageError::driver(e));
        }

        debug!(isolation_level = isolation_sql(isolation_level), "postgres transaction started");
        Ok(PgSagaTransaction { tx })
    }
}

/// PostgreSQL transaction wrapper implementing SagaTransaction.
///
/// Dropping it without commit returns the connection to the pool rolled back.
pub struct PgSagaTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SagaTransaction for PgSagaTransaction {
    async fn fetch(&mut self, command: &SqlCommand) -> Result<Vec<Record>, StorageError> {
        let args = bind_parameters(&command.parameters)?;

        let rows = sqlx::query_with(&command.sql, args)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(StorageError::driver)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn execute(&mut self, command: &SqlCommand) -> Result<u64, StorageError> {
        let args = bind_parameters(&command.parameters)?;

        let result = sqlx::query_with(&command.sql, args)
            .execute(&mut *self.tx)
            .await
            .map_err(StorageError::driver)?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(StorageError::driver)
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx.rollback().await.map_err(StorageError::driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga_storage::{SagaDescriptor, Uuid};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Ticket {
        correlation_id: Uuid,
    }

    impl Saga for Ticket {
        fn descriptor() -> SagaDescriptor {
            SagaDescriptor::new("Ticket").field("correlation_id", saga_storage::FieldType::Uuid)
        }

        fn correlation_id(&self) -> Uuid {
            self.correlation_id
        }
    }

    #[tokio::test]
    async fn invalid_options_fail_without_connecting() {
        let unreachable = "postgres://localhost:1/none";

        for options in [
            SagaRepositoryOptions::new(),
            SagaRepositoryOptions::new().use_postgres(unreachable).use_table_name(" "),
            SagaRepositoryOptions::new().use_sql_server(unreachable),
        ] {
            let result = PgConnector::context_factory::<Ticket>(&options).await;
            assert!(matches!(result, Err(StorageError::Configuration(_))));
        }
    }

    #[test]
    fn snapshot_maps_to_repeatable_read() {
        assert_eq!(isolation_sql(IsolationLevel::Snapshot), "REPEATABLE READ");
        assert_eq!(isolation_sql(IsolationLevel::Serializable), "SERIALIZABLE");
        assert_eq!(
            isolation_sql(IsolationLevel::ReadCommitted),
            "READ COMMITTED"
        );
    }
}
