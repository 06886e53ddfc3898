//! Service wiring
//!
//! Builds the adapters for the configured storage backend, starts the
//! updater workers and scheduler, and assembles the mediator.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use app_services::organisations::{CreateOrganisation, GetOrganisationByAlias};
use app_services::users::{ActivateUser, CreateActivationInvitation, CreateUser, ListUsers};
use app_services::{build_mediator, AppDependencies, AppError, InMemoryReadModelStore, ReadModelStore, RequestContext};
use core_kernel::mock::{InMemoryAggregateLockService, InMemoryEventStore};
use core_kernel::{AggregateLockService, DeploymentEnvironment, EventStore, HealthCheckable, ProductId, TenantId};
use domain_party::{Argon2PasswordHasher, PasswordHasher, PersonDetails};
use domain_quote::numbering::mock::InMemoryNumberPool;
use domain_quote::{NumberPool, RatingEngine, RatingError};
use infra_db::{connect, DatabaseError, PostgresAdapters};
use infra_updater::import::mock::InMemoryDataSetStore;
use infra_updater::store::mock::InMemoryUpdaterJobStore;
use infra_updater::{DataSetIndexer, DataSetSink, UpdaterError, UpdaterJobStore, UpdaterService};

use crate::auth::roles;
use crate::config::{ApiConfig, BootstrapAdmin, StorageBackend};
use crate::AppState;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database: {0}")]
    Database(#[from] DatabaseError),

    #[error("updater: {0}")]
    Updater(#[from] UpdaterError),

    #[error("rating rules: {0}")]
    Rating(#[from] RatingError),

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bootstrap admin: {0}")]
    Admin(#[from] AppError),
}

/// Storage adapters behind every port
struct Storage {
    event_store: Arc<dyn EventStore>,
    locks: Arc<dyn AggregateLockService>,
    read_models: Arc<dyn ReadModelStore>,
    number_pool: Arc<dyn NumberPool>,
    updater_jobs: Arc<dyn UpdaterJobStore>,
    sink: Arc<dyn DataSetSink>,
    indexer: Arc<dyn DataSetIndexer>,
    health: Vec<Arc<dyn HealthCheckable>>,
}

impl Storage {
    fn in_memory() -> Self {
        let event_store = Arc::new(InMemoryEventStore::new());
        let read_models = Arc::new(InMemoryReadModelStore::new());
        let number_pool = Arc::new(InMemoryNumberPool::new());
        let data_sets = Arc::new(InMemoryDataSetStore::new());
        Self {
            health: vec![event_store.clone(), read_models.clone(), number_pool.clone()],
            event_store,
            locks: Arc::new(InMemoryAggregateLockService::new()),
            read_models,
            number_pool,
            updater_jobs: Arc::new(InMemoryUpdaterJobStore::new()),
            sink: data_sets.clone(),
            indexer: data_sets,
        }
    }

    fn postgres(adapters: PostgresAdapters) -> Self {
        Self {
            health: vec![
                adapters.event_store.clone(),
                adapters.read_models.clone(),
                adapters.number_pool.clone(),
            ],
            event_store: adapters.event_store,
            locks: adapters.locks,
            read_models: adapters.read_models,
            number_pool: adapters.number_pool,
            updater_jobs: adapters.updater_jobs,
            sink: adapters.data_sets.clone(),
            indexer: adapters.data_sets,
        }
    }
}

/// Loads every `<product id>.json` rating document in `dir`
pub fn load_rating_rules(dir: &Path) -> Result<RatingEngine, BootstrapError> {
    let mut engine = RatingEngine::new();
    let entries = std::fs::read_dir(dir).map_err(|source| BootstrapError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let path = entry
            .map_err(|source| BootstrapError::Io {
                path: dir.display().to_string(),
                source,
            })?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(product_id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<ProductId>().ok())
        else {
            warn!(path = %path.display(), "Skipping rating file not named after a product id");
            continue;
        };
        let rules = engine.load_rules_from_file(&path)?;
        info!(product_id = %product_id, "Loaded rating rules");
        engine.register_product(product_id, rules);
    }
    Ok(engine)
}

/// A running service: router state plus the background updater
pub struct Services {
    pub state: AppState,
    updater: UpdaterService,
    shutdown: watch::Sender<bool>,
}

impl Services {
    pub async fn start(config: ApiConfig) -> Result<Self, BootstrapError> {
        Self::start_with_hasher(config, Arc::new(Argon2PasswordHasher::new())).await
    }

    pub async fn start_with_hasher(
        config: ApiConfig,
        password_hasher: Arc<dyn PasswordHasher>,
    ) -> Result<Self, BootstrapError> {
        let storage = match config.storage {
            StorageBackend::Memory => {
                warn!("Using in-memory storage; data is lost on restart");
                Storage::in_memory()
            }
            StorageBackend::Postgres => Storage::postgres(PostgresAdapters::new(connect(&config.database).await?)),
        };

        let rating = match &config.rating_rules_dir {
            Some(dir) => load_rating_rules(dir)?,
            None => RatingEngine::new(),
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let updater = UpdaterService::start(
            config.updater.to_settings(),
            storage.updater_jobs,
            storage.sink,
            storage.indexer,
            shutdown_rx,
        )
        .await?;

        let mediator = build_mediator(AppDependencies {
            event_store: storage.event_store,
            locks: storage.locks,
            read_models: storage.read_models,
            number_pool: storage.number_pool,
            rating: Arc::new(rating),
            password_hasher,
            updater: Arc::clone(&updater.manager),
            quote_settings: config.quotes,
            lock_timeout: config.lock_timeout(),
        });

        let state = AppState {
            mediator: Arc::new(mediator),
            config: Arc::new(config),
            health: Arc::new(storage.health),
        };

        if let Some(admin) = &state.config.bootstrap_admin {
            ensure_admin(&state, admin).await?;
        }

        Ok(Self {
            state,
            updater,
            shutdown,
        })
    }

    /// Stops the scheduler and waits for running updater jobs
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.updater.shutdown().await;
        info!("Background services stopped");
    }
}

/// Creates the configured organisation and administrator when missing
async fn ensure_admin(state: &AppState, admin: &BootstrapAdmin) -> Result<(), BootstrapError> {
    let ctx = RequestContext::new(TenantId::from_uuid(admin.tenant_id), DeploymentEnvironment::default())
        .with_user(Default::default(), vec![roles::ADMIN.to_string()]);
    let mediator = &state.mediator;

    let organisation = match mediator
        .send(GetOrganisationByAlias { alias: admin.organisation_alias.clone() }, &ctx)
        .await
    {
        Ok(existing) => existing,
        Err(AppError::NotFound(_)) => {
            mediator
                .send(
                    CreateOrganisation {
                        name: admin.organisation_name.clone(),
                        alias: admin.organisation_alias.clone(),
                    },
                    &ctx,
                )
                .await?
        }
        Err(e) => return Err(e.into()),
    };

    let users = mediator
        .send(ListUsers { organisation_id: Some(organisation.organisation_id) }, &ctx)
        .await?;
    if users.iter().any(|u| u.login_email.eq_ignore_ascii_case(&admin.email)) {
        return Ok(());
    }

    let user = mediator
        .send(
            CreateUser {
                organisation_id: organisation.organisation_id,
                details: PersonDetails::named("Administrator"),
                login_email: admin.email.clone(),
                roles: vec![roles::ADMIN.to_string()],
            },
            &ctx,
        )
        .await?;
    let invitation_id = mediator
        .send(CreateActivationInvitation { user_id: user.user_id }, &ctx)
        .await?;
    mediator
        .send(
            ActivateUser {
                user_id: user.user_id,
                invitation_id,
                password: admin.password.clone(),
            },
            &ctx,
        )
        .await?;

    info!(tenant_id = %admin.tenant_id, email = %admin.email, "Created bootstrap administrator");
    Ok(())
}
