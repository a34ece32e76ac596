//! PostgreSQL backend for saga-storage.
//!
//! Provides a [`PgConnector`] over an sqlx pool. Each unit of work runs on
//! one pooled connection inside one transaction; statements use the
//! positional `$n` dialect.
//!
//! # Usage
//!
//! ```text
//! let options = SagaRepositoryOptions::new()
//!     .use_postgres("postgres://localhost/sagas")
//!     .use_isolation_level(IsolationLevel::ReadCommitted);
//! let factory = PgConnector::context_factory::<OrderState>(&options).await?;
//!
//! factory
//!     .execute(|context| Box::pin(async move {
//!         let mut order = context.load(id).await?.unwrap_or_else(|| OrderState::new(id));
//!         order.submitted = true;
//!         context.update(&mut order).await
//!     }))
//!     .await?;
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod bind;
mod executor;
mod row;

pub use bind::bind_parameters;
pub use executor::{PgConnector, PgSagaTransaction};
pub use row::record_from_row;

// Re-export core types for convenience
pub use saga_storage::{
    DatabaseContext, Filter, IsolationLevel, Saga, SagaRepositoryContextFactory,
    SagaRepositoryOptions, StorageError,
};
