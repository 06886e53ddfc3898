//! Infrastructure Database Layer
//!
//! PostgreSQL adapters for the ports defined by the domain and application
//! crates, using SQLx runtime queries:
//!
//! | Port | Adapter | Tables |
//! |------|---------|--------|
//! | `EventStore` | [`PostgresEventStore`] | `events` |
//! | `AggregateLockService` | [`PostgresAggregateLockService`] | session advisory locks |
//! | `ReadModelStore` | [`PostgresReadModelStore`] | `*_read_models` |
//! | `NumberPool` | [`PostgresNumberPool`] | `number_pool` |
//! | `UpdaterJobStore` | [`PostgresUpdaterJobStore`] | `updater_jobs` |
//! | `DataSetSink`, `DataSetIndexer` | [`PostgresDataSetStore`] | `data_set_rows`, `live_data_sets` |
//!
//! The schema lives in the workspace `migrations/` directory and is applied
//! by [`run_migrations`].
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{connect, DatabaseConfig, PostgresAdapters};
//!
//! let pool = connect(&DatabaseConfig::new("postgres://localhost/ubind")).await?;
//! let adapters = PostgresAdapters::new(pool);
//! ```

pub mod error;
pub mod event_store;
pub mod locks;
pub mod number_pool;
pub mod pool;
pub mod read_models;
pub mod updater_jobs;

use std::sync::Arc;

pub use error::DatabaseError;
pub use event_store::PostgresEventStore;
pub use locks::PostgresAggregateLockService;
pub use number_pool::PostgresNumberPool;
pub use pool::{connect, create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use read_models::PostgresReadModelStore;
pub use updater_jobs::{PostgresDataSetStore, PostgresUpdaterJobStore};

/// Every PostgreSQL adapter, sharing one pool
#[derive(Debug, Clone)]
pub struct PostgresAdapters {
    pub pool: DatabasePool,
    pub event_store: Arc<PostgresEventStore>,
    pub locks: Arc<PostgresAggregateLockService>,
    pub read_models: Arc<PostgresReadModelStore>,
    pub number_pool: Arc<PostgresNumberPool>,
    pub updater_jobs: Arc<PostgresUpdaterJobStore>,
    pub data_sets: Arc<PostgresDataSetStore>,
}

impl PostgresAdapters {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            event_store: Arc::new(PostgresEventStore::new(pool.clone())),
            locks: Arc::new(PostgresAggregateLockService::new(pool.clone())),
            read_models: Arc::new(PostgresReadModelStore::new(pool.clone())),
            number_pool: Arc::new(PostgresNumberPool::new(pool.clone())),
            updater_jobs: Arc::new(PostgresUpdaterJobStore::new(pool.clone())),
            data_sets: Arc::new(PostgresDataSetStore::new(pool.clone())),
            pool,
        }
    }
}
