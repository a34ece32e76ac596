//! Round trips against a live database.
//!
//! Set `DATABASE_URL` to run; the tests return early without it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use saga_storage::{Filter, Saga, SagaFields, StorageError, Uuid};
use saga_storage_postgres::{PgConnector, SagaRepositoryOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SagaFields)]
#[serde(rename_all = "PascalCase")]
struct Address {
    city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Saga)]
#[serde(rename_all = "PascalCase")]
struct OrderState {
    correlation_id: Uuid,
    version: i32,
    customer: String,
    submitted: bool,
    #[saga(prefix)]
    shipping: Option<Address>,
}

impl OrderState {
    fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            version: 0,
            customer: "ada".to_string(),
            submitted: false,
            shipping: Some(Address {
                city: "Lisbon".to_string(),
            }),
        }
    }
}

async fn setup(table: &str) -> Option<SagaRepositoryOptions> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let connector = PgConnector::connect(&url).await.unwrap();
    sqlx::query(&format!(
        "CREATE TABLE {} (CorrelationId UUID PRIMARY KEY, Version INT NOT NULL, Customer TEXT, Submitted BOOL NOT NULL, ShippingCity TEXT)",
        table
    ))
    .execute(connector.inner())
    .await
    .unwrap();

    Some(
        SagaRepositoryOptions::new()
            .use_postgres(url)
            .use_table_name(table),
    )
}

async fn teardown(options: &SagaRepositoryOptions, table: &str) {
    let connector = PgConnector::connect(options.connection_url().unwrap())
        .await
        .unwrap();
    sqlx::query(&format!("DROP TABLE {}", table))
        .execute(connector.inner())
        .await
        .unwrap();
}

fn table_name() -> String {
    format!("order_states_{}", Uuid::new_v4().simple())
}

#[tokio::test]
async fn insert_load_update_delete() {
    let table = table_name();
    let Some(options) = setup(&table).await else {
        return;
    };
    let factory = PgConnector::context_factory::<OrderState>(&options)
        .await
        .unwrap();
    let id = Uuid::new_v4();

    factory
        .execute(|context| {
            Box::pin(async move {
                let mut order = OrderState::new(id);
                context.insert(&mut order).await?;
                Ok::<_, StorageError>(())
            })
        })
        .await
        .unwrap();

    let loaded = factory
        .execute(|context| {
            Box::pin(async move {
                let mut order = context.load(id).await?.expect("inserted");
                order.submitted = true;
                order.shipping = None;
                context.update(&mut order).await?;
                Ok::<_, StorageError>(order)
            })
        })
        .await
        .unwrap();
    assert_eq!(loaded.version, 2);

    let found = factory
        .execute(|context| {
            Box::pin(async move { context.query(&Filter::field("Submitted").is_set()).await })
        })
        .await
        .unwrap();
    assert_eq!(found, vec![loaded.clone()]);
    assert_eq!(found[0].shipping, None);

    factory
        .execute(|context| {
            Box::pin(async move {
                let mut order = context.load(id).await?.expect("updated");
                context.delete(&mut order).await
            })
        })
        .await
        .unwrap();

    let gone = factory
        .execute(|context| Box::pin(async move { context.load(id).await }))
        .await
        .unwrap();
    assert!(gone.is_none());

    teardown(&options, &table).await;
}

#[tokio::test]
async fn stale_update_is_a_concurrency_error() {
    let table = table_name();
    let Some(options) = setup(&table).await else {
        return;
    };
    let factory = PgConnector::context_factory::<OrderState>(&options)
        .await
        .unwrap();
    let id = Uuid::new_v4();

    factory
        .execute(|context| {
            Box::pin(async move {
                let mut order = OrderState::new(id);
                context.insert(&mut order).await?;
                order.customer = "grace".to_string();
                context.update(&mut order).await
            })
        })
        .await
        .unwrap();

    // A copy still at version 0 loses against the stored version 2.
    let result = factory
        .execute(|context| {
            Box::pin(async move {
                let mut stale = OrderState::new(id);
                context.update(&mut stale).await
            })
        })
        .await;

    assert!(result.unwrap_err().is_concurrency());

    teardown(&options, &table).await;
}

#[tokio::test]
async fn failed_unit_of_work_rolls_back() {
    let table = table_name();
    let Some(options) = setup(&table).await else {
        return;
    };
    let factory = PgConnector::context_factory::<OrderState>(&options)
        .await
        .unwrap();
    let id = Uuid::new_v4();

    let result: Result<(), StorageError> = factory
        .execute(|context| {
            Box::pin(async move {
                let mut order = OrderState::new(id);
                context.insert(&mut order).await?;
                Err(StorageError::configuration("handler failed"))
            })
        })
        .await;
    assert!(result.is_err());

    let loaded = factory
        .execute(|context| Box::pin(async move { context.load(id).await }))
        .await
        .unwrap();
    assert!(loaded.is_none());

    teardown(&options, &table).await;
}
