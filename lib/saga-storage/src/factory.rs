//! Per-operation transaction scoping.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::StorageError;
use crate::context::{DatabaseContext, SagaDatabaseContext};
use crate::executor::SagaConnector;
use crate::filter::Filter;
use crate::formatter::{SagaFormatter, SagaSqlFormatter};
use crate::options::{IsolationLevel, SagaRepositoryOptions};
use crate::saga::Saga;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Builds the context handed to a unit of work from an open transaction.
pub type ContextFactory<S, T> =
    Arc<dyn Fn(T, Arc<dyn SagaSqlFormatter>) -> Box<dyn DatabaseContext<S>> + Send + Sync>;

/// Opens a transaction per unit of work and commits it only on success.
pub struct SagaRepositoryContextFactory<S: Saga, C: SagaConnector> {
    connector: C,
    formatter: Arc<dyn SagaSqlFormatter>,
    isolation_level: IsolationLevel,
    context_factory: ContextFactory<S, C::Transaction>,
}

impl<S: Saga, C: SagaConnector> SagaRepositoryContextFactory<S, C> {
    /// Resolve the saga's metadata once and pick the dialect.
    ///
    /// The connector already holds its connection, so only the settings it
    /// still reads are validated. The provider comes from `options` or,
    /// failing that, from the connector; the two must agree when both are set.
    pub fn new(connector: C, options: &SagaRepositoryOptions) -> Result<Self, StorageError> {
        options.validate_settings()?;

        let provider = match (options.provider, connector.provider()) {
            (Some(configured), Some(actual)) if configured != actual => {
                return Err(StorageError::configuration(format!(
                    "Provider {:?} does not match connector provider {:?}",
                    configured, actual
                )));
            }
            (Some(provider), _) | (None, Some(provider)) => provider,
            (None, None) => {
                return Err(StorageError::configuration("Provider must be specified"));
            }
        };

        let mut builder = SagaFormatter::builder(provider.dialect(), &S::descriptor());
        if let Some(table) = &options.table_name {
            builder = builder.table_name(table);
        }
        if let Some(column) = &options.id_column_name {
            builder = builder.id_column(column);
        }
        let formatter = builder.build()?;

        debug!(
            saga_type = %formatter.metadata().saga_type(),
            table = %formatter.metadata().table(),
            dialect = provider.dialect().name,
            "saga repository configured"
        );

        Ok(Self {
            connector,
            formatter: Arc::new(formatter),
            isolation_level: options.isolation_level,
            context_factory: Arc::new(|transaction, formatter| {
                Box::new(SagaDatabaseContext::<S, C::Transaction>::new(
                    transaction,
                    formatter,
                )) as Box<dyn DatabaseContext<S>>
            }),
        })
    }

    /// Replace the generated SQL with a custom formatter.
    pub fn with_formatter(mut self, formatter: Arc<dyn SagaSqlFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Replace the default context with a custom implementation.
    pub fn with_context_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(C::Transaction, Arc<dyn SagaSqlFormatter>) -> Box<dyn DatabaseContext<S>>
            + Send
            + Sync
            + 'static,
    {
        self.context_factory = Arc::new(factory);
        self
    }

    pub fn formatter(&self) -> &dyn SagaSqlFormatter {
        self.formatter.as_ref()
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run `work` inside one transaction.
    ///
    /// The transaction commits only when `work` returns `Ok`. On `Err` it is
    /// rolled back and the error returned unchanged.
    pub async fn execute<F, R, E>(&self, work: F) -> Result<R, E>
    where
        F: for<'c> FnOnce(&'c mut dyn DatabaseContext<S>) -> BoxFuture<'c, Result<R, E>>,
        E: From<StorageError>,
    {
        let mut context = self.begin().await?;
        let result = work(context.as_mut()).await;
        self.finish(context, result).await
    }

    /// Load every instance matching `filter`, then run `work` with them in
    /// the same transaction.
    pub async fn execute_query<F, R, E>(&self, filter: &Filter, work: F) -> Result<R, E>
    where
        F: for<'c> FnOnce(&'c mut dyn DatabaseContext<S>, Vec<S>) -> BoxFuture<'c, Result<R, E>>,
        E: From<StorageError>,
    {
        let mut context = self.begin().await?;
        let result = match context.query(filter).await {
            Ok(sagas) => work(context.as_mut(), sagas).await,
            Err(e) => Err(E::from(e)),
        };
        self.finish(context, result).await
    }

    async fn begin(&self) -> Result<Box<dyn DatabaseContext<S>>, StorageError> {
        let transaction = self.connector.begin(self.isolation_level).await?;
        debug!(
            saga_type = %self.formatter.metadata().saga_type(),
            isolation_level = self.isolation_level.as_sql(),
            "transaction started"
        );
        Ok((self.context_factory)(transaction, self.formatter.clone()))
    }

    async fn finish<R, E>(
        &self,
        context: Box<dyn DatabaseContext<S>>,
        result: Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StorageError>,
    {
        let saga_type = self.formatter.metadata().saga_type();
        match result {
            Ok(value) => {
                context.commit().await?;
                debug!(saga_type = %saga_type, "transaction committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = context.rollback().await {
                    warn!(saga_type = %saga_type, error = %rollback, "rollback failed");
                }
                debug!(saga_type = %saga_type, "transaction rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DatabaseProvider;
    use crate::saga::SagaDescriptor;
    use crate::statement::SqlStatement;
    use crate::testing::{FakeConnector, Outcome};
    use crate::value::FieldType;
    use serde::{Deserialize, Serialize};
    use serde_json::{Value as Json, json};
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Shipment {
        correlation_id: Uuid,
        version: i32,
        carrier: String,
        delivered: bool,
    }

    impl Saga for Shipment {
        fn descriptor() -> SagaDescriptor {
            SagaDescriptor::new("Shipment")
                .field("CorrelationId", FieldType::Uuid)
                .version("Version")
                .field("Carrier", FieldType::Text)
                .field("Delivered", FieldType::Bool)
        }

        fn correlation_id(&self) -> Uuid {
            self.correlation_id
        }

        fn version(&self) -> Option<i32> {
            Some(self.version)
        }

        fn set_version(&mut self, version: i32) {
            self.version = version;
        }
    }

    fn options() -> SagaRepositoryOptions {
        SagaRepositoryOptions::new().use_postgres("postgres://localhost/sagas")
    }

    fn shipment() -> Shipment {
        Shipment {
            correlation_id: Uuid::new_v4(),
            version: 0,
            carrier: "Post".to_string(),
            delivered: false,
        }
    }

    #[tokio::test]
    async fn commits_on_success() {
        let factory = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(None),
            &options(),
        )
        .unwrap();

        let version = factory
            .execute(|context| {
                Box::pin(async move {
                    let mut saga = shipment();
                    context.insert(&mut saga).await?;
                    Ok::<_, StorageError>(saga.version)
                })
            })
            .await
            .unwrap();

        assert_eq!(version, 1);
        let journal = &factory.connector().journal;
        assert_eq!(journal.began(), vec![IsolationLevel::Serializable]);
        assert_eq!(journal.outcomes(), vec![Outcome::Committed]);
        assert_eq!(journal.open(), 0);
    }

    #[tokio::test]
    async fn rolls_back_on_failure() {
        let factory = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(None),
            &options().use_isolation_level(IsolationLevel::ReadCommitted),
        )
        .unwrap();

        let result: Result<(), StorageError> = factory
            .execute(|context| {
                Box::pin(async move {
                    let mut saga = shipment();
                    context.insert(&mut saga).await?;
                    Err(StorageError::configuration("handler failed"))
                })
            })
            .await;

        assert!(matches!(result, Err(StorageError::Configuration(_))));
        let journal = &factory.connector().journal;
        assert_eq!(journal.began(), vec![IsolationLevel::ReadCommitted]);
        assert_eq!(journal.outcomes(), vec![Outcome::RolledBack]);
        assert_eq!(journal.open(), 0);
    }

    #[tokio::test]
    async fn concurrency_failure_is_surfaced_and_rolled_back() {
        let mut connector = FakeConnector::new(None);
        connector.affected = 0;
        let factory = SagaRepositoryContextFactory::<Shipment, _>::new(connector, &options())
            .unwrap();

        let result = factory
            .execute(|context| {
                Box::pin(async move {
                    let mut saga = shipment();
                    context.update(&mut saga).await?;
                    Ok::<_, StorageError>(())
                })
            })
            .await;

        assert!(result.unwrap_err().is_concurrency());
        assert_eq!(factory.connector().journal.outcomes(), vec![Outcome::RolledBack]);
    }

    #[tokio::test]
    async fn begin_failure_propagates() {
        let mut connector = FakeConnector::new(None);
        connector.fail_begin = true;
        let factory = SagaRepositoryContextFactory::<Shipment, _>::new(connector, &options())
            .unwrap();

        let result = factory
            .execute(|_| Box::pin(async move { Ok::<_, StorageError>(()) }))
            .await;

        assert!(matches!(result, Err(StorageError::Driver(_))));
        assert!(factory.connector().journal.outcomes().is_empty());
    }

    #[tokio::test]
    async fn execute_query_hands_loaded_instances_to_work() {
        let id = Uuid::new_v4();
        let Json::Object(record) = json!({
            "correlationid": id.to_string(),
            "version": 3,
            "carrier": "Courier",
            "delivered": false
        }) else {
            unreachable!()
        };
        let connector = FakeConnector::new(None);
        connector.rows.lock().unwrap().push(record);
        let factory = SagaRepositoryContextFactory::<Shipment, _>::new(connector, &options())
            .unwrap();

        let versions = factory
            .execute_query(&!Filter::field("Delivered").is_set(), |context, sagas| {
                Box::pin(async move {
                    let mut versions = Vec::new();
                    for mut saga in sagas {
                        saga.delivered = true;
                        context.update(&mut saga).await?;
                        versions.push(saga.version);
                    }
                    Ok::<_, StorageError>(versions)
                })
            })
            .await
            .unwrap();

        assert_eq!(versions, vec![4]);
        let journal = &factory.connector().journal;
        assert_eq!(
            journal.fetched()[0].sql,
            "SELECT * FROM Shipments WHERE Delivered = $1 FOR UPDATE"
        );
        assert_eq!(
            journal.executed()[0].sql,
            "UPDATE Shipments SET Carrier = $3, Delivered = $4, Version = $2 WHERE CorrelationId = $1 AND Version < $2"
        );
        assert_eq!(journal.outcomes(), vec![Outcome::Committed]);
    }

    #[test]
    fn options_overrides_reach_the_formatter() {
        let factory = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(None),
            &SagaRepositoryOptions::new()
                .use_sql_server("Server=.;Database=Sagas")
                .use_table_name("ShipmentState")
                .use_id_column_name("ShipmentId"),
        )
        .unwrap();

        assert_eq!(
            factory.formatter().build_load_sql().sql,
            "SELECT * FROM ShipmentState WITH (UPDLOCK, ROWLOCK) WHERE [ShipmentId] = @correlationId"
        );
    }

    #[test]
    fn provider_must_be_known_and_consistent() {
        let missing = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(None),
            &SagaRepositoryOptions::new(),
        );
        assert!(matches!(missing, Err(StorageError::Configuration(_))));

        let from_connector = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(Some(DatabaseProvider::Postgres)),
            &SagaRepositoryOptions::new(),
        );
        assert!(from_connector.is_ok());

        let mismatched = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(Some(DatabaseProvider::Postgres)),
            &options().use_provider(DatabaseProvider::SqlServer),
        );
        assert!(matches!(mismatched, Err(StorageError::Configuration(_))));
    }

    #[test]
    fn blank_settings_fail_before_any_transaction() {
        let connector = FakeConnector::new(Some(DatabaseProvider::Postgres));
        let journal = connector.journal.clone();

        let blank_table = SagaRepositoryContextFactory::<Shipment, _>::new(
            connector,
            &SagaRepositoryOptions::new().use_table_name(""),
        );
        assert!(matches!(blank_table, Err(StorageError::Configuration(_))));

        let blank_connection = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(None),
            &SagaRepositoryOptions::new().use_postgres("  "),
        );
        assert!(matches!(
            blank_connection,
            Err(StorageError::Configuration(_))
        ));
        assert!(journal.began().is_empty());
    }

    #[tokio::test]
    async fn custom_context_factory_is_used() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let factory = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(None),
            &options(),
        )
        .unwrap()
        .with_context_factory(move |transaction, formatter| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(SagaDatabaseContext::<Shipment, _>::new(transaction, formatter))
                as Box<dyn DatabaseContext<Shipment>>
        });

        for _ in 0..2 {
            factory
                .execute(|context| Box::pin(async move { context.load(Uuid::nil()).await }))
                .await
                .unwrap();
        }

        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    struct FixedTableFormatter(SagaFormatter);

    impl SagaSqlFormatter for FixedTableFormatter {
        fn metadata(&self) -> &crate::metadata::SagaMetadata {
            self.0.metadata()
        }

        fn build_load_sql(&self) -> SqlStatement {
            let mut statement = self.0.build_load_sql();
            statement.sql = statement.sql.replace("Shipments", "archive.shipments");
            statement
        }

        fn build_query_sql(&self, filter: &Filter) -> Result<crate::SqlCommand, StorageError> {
            self.0.build_query_sql(filter)
        }

        fn build_insert_sql(&self) -> SqlStatement {
            self.0.build_insert_sql()
        }

        fn build_update_sql(&self) -> SqlStatement {
            self.0.build_update_sql()
        }

        fn build_delete_sql(&self) -> SqlStatement {
            self.0.build_delete_sql()
        }
    }

    #[tokio::test]
    async fn custom_formatter_is_used() {
        let inner = SagaFormatter::new(
            crate::dialect::Dialect::POSTGRES,
            &Shipment::descriptor(),
        )
        .unwrap();
        let factory = SagaRepositoryContextFactory::<Shipment, _>::new(
            FakeConnector::new(None),
            &options(),
        )
        .unwrap()
        .with_formatter(Arc::new(FixedTableFormatter(inner)));

        let loaded = factory
            .execute(|context| Box::pin(async move { context.load(Uuid::nil()).await }))
            .await
            .unwrap();

        assert!(loaded.is_none());
        assert_eq!(
            factory.connector().journal.fetched()[0].sql,
            "SELECT * FROM archive.shipments WHERE CorrelationId = $1 FOR UPDATE"
        );
    }
}
