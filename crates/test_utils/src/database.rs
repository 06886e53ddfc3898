//! Database Test Utilities
//!
//! PostgreSQL for adapter tests: a throwaway container by default, or the
//! server named by `TEST_DATABASE_URL` when set. The schema comes from the
//! same migrations the service runs.

use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::sync::OnceCell;

use infra_db::{connect, DatabaseConfig, DatabasePool, PostgresAdapters};

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "ubind_test";

/// Tables emptied by [`TestDatabase::clear_data`]
const TABLES: &[&str] = &[
    "events",
    "quote_read_models",
    "user_read_models",
    "organisation_read_models",
    "number_pool",
    "updater_jobs",
    "data_set_rows",
    "live_data_sets",
];

static EXTERNAL_URL: Lazy<Option<String>> = Lazy::new(|| std::env::var("TEST_DATABASE_URL").ok());

/// Connection settings for a test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A migrated database and the container backing it, if any
pub struct TestDatabase {
    _container: Option<ContainerAsync<GenericImage>>,
    pub url: String,
    pub pool: DatabasePool,
}

impl TestDatabase {
    /// Starts (or connects to) a database and applies the migrations
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (container, url) = match EXTERNAL_URL.as_ref() {
            Some(url) => (None, url.clone()),
            None => {
                let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
                    .with_exposed_port(5432.tcp())
                    .with_wait_for(WaitFor::message_on_stderr("database system is ready to accept connections"))
                    .with_env_var("POSTGRES_USER", POSTGRES_USER)
                    .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
                    .with_env_var("POSTGRES_DB", POSTGRES_DB)
                    .start()
                    .await?;

                let config = TestDatabaseConfig {
                    host: container.get_host().await?.to_string(),
                    port: container.get_host_port_ipv4(5432).await?,
                    ..TestDatabaseConfig::default()
                };
                (Some(container), config.connection_url())
            }
        };

        let config = DatabaseConfig::new(url.clone())
            .max_connections(5)
            .connect_timeout(Duration::from_secs(30));
        let pool = connect(&config).await?;

        Ok(Self {
            _container: container,
            url,
            pool,
        })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Every PostgreSQL adapter over this database
    pub fn adapters(&self) -> PostgresAdapters {
        PostgresAdapters::new(self.pool.clone())
    }

    /// Empties every table, keeping the schema
    pub async fn clear_data(&self) -> Result<(), sqlx::Error> {
        sqlx::query(&format!("TRUNCATE TABLE {} CASCADE", TABLES.join(", ")))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// One database shared by every test in the process
///
/// Tests sharing it must use their own tenant ids.
///
/// # Panics
///
/// Panics if the database fails to start.
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// A database for a single test
pub async fn create_isolated_test_database() -> Result<TestDatabase, Box<dyn std::error::Error + Send + Sync>> {
    TestDatabase::new().await
}

/// Defines a `#[tokio::test]` that receives a fresh [`TestDatabase`] as `db`
///
/// Ignored by default since it needs Docker or `TEST_DATABASE_URL`.
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires PostgreSQL"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}
