//! Test Harness Builder
//!
//! Assembles the full mediator pipeline over in-memory adapters, with a
//! registered motor product and a first organisation, so tests can start
//! from a working tenant.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::watch;

use app_services::organisations::CreateOrganisation;
use app_services::quotes::{BindQuote, CalculateQuote, CreateQuote, LoadNumbers, UpdateQuoteFormData};
use app_services::users::{ActivateUser, CreateActivationInvitation, CreateUser};
use app_services::{
    build_mediator, AppDependencies, AppError, InMemoryReadModelStore, Mediator, QuoteReadModel, QuoteSettings,
    RequestContext, UserReadModel,
};
use core_kernel::mock::{InMemoryAggregateLockService, InMemoryEventStore};
use core_kernel::{DeploymentEnvironment, OrganisationId, ProductId, TenantId, UserId};
use domain_party::password::mock::PlainTextPasswordHasher;
use domain_quote::numbering::mock::InMemoryNumberPool;
use domain_quote::{NumberKind, NumberPool, NumberPoolKey, RatingEngine};
use infra_updater::import::mock::InMemoryDataSetStore;
use infra_updater::store::mock::InMemoryUpdaterJobStore;
use infra_updater::{DataSetKind, UpdaterService, UpdaterSettings};

use crate::fixtures::{fake_organisation, fake_person, MOTOR_RULES, TEST_PASSWORD};

/// Builder for [`TestHarness`]
pub struct TestHarnessBuilder {
    environment: DeploymentEnvironment,
    roles: Vec<String>,
    quote_settings: QuoteSettings,
    sources: HashMap<DataSetKind, String>,
    lock_timeout: Duration,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self {
            environment: DeploymentEnvironment::Development,
            roles: vec!["Admin".to_string()],
            quote_settings: QuoteSettings::default(),
            sources: HashMap::new(),
            lock_timeout: Duration::from_secs(2),
        }
    }
}

impl TestHarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(mut self, environment: DeploymentEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn quote_settings(mut self, settings: QuoteSettings) -> Self {
        self.quote_settings = settings;
        self
    }

    pub fn source(mut self, data_set: DataSetKind, url: impl Into<String>) -> Self {
        self.sources.insert(data_set, url.into());
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Starts the updater, builds the mediator and creates an organisation
    ///
    /// # Panics
    ///
    /// Panics if any part of the harness fails to start.
    pub async fn build(self) -> TestHarness {
        let product_id = ProductId::new();
        let mut rating = RatingEngine::new();
        let rules = rating
            .load_rules_from_str(MOTOR_RULES)
            .expect("motor rules should load");
        rating.register_product(product_id, rules);

        let work_dir = TempDir::new().expect("Failed to create updater work dir");
        let (shutdown, shutdown_rx) = watch::channel(false);
        let data_sets = Arc::new(InMemoryDataSetStore::new());
        let updater = UpdaterService::start(
            UpdaterSettings {
                work_dir: work_dir.path().to_path_buf(),
                sources: self.sources,
                ..UpdaterSettings::default()
            },
            Arc::new(InMemoryUpdaterJobStore::new()),
            data_sets.clone(),
            data_sets.clone(),
            shutdown_rx,
        )
        .await
        .expect("Failed to start updater");

        let event_store = Arc::new(InMemoryEventStore::new());
        let read_models = Arc::new(InMemoryReadModelStore::new());
        let number_pool = Arc::new(InMemoryNumberPool::new());
        let mediator = build_mediator(AppDependencies {
            event_store: event_store.clone(),
            locks: Arc::new(InMemoryAggregateLockService::new()),
            read_models: read_models.clone(),
            number_pool: number_pool.clone(),
            rating: Arc::new(rating),
            password_hasher: Arc::new(PlainTextPasswordHasher),
            updater: Arc::clone(&updater.manager),
            quote_settings: self.quote_settings,
            lock_timeout: self.lock_timeout,
        });

        let ctx = RequestContext::new(TenantId::new(), self.environment)
            .with_user(UserId::new(), self.roles);

        // Setup runs as an administrator whatever roles the caller asked for
        let system = RequestContext::new(ctx.tenant_id, self.environment)
            .with_user(UserId::new(), vec!["Admin".to_string()]);
        let (name, alias) = fake_organisation();
        let organisation = mediator
            .send(CreateOrganisation { name, alias }, &system)
            .await
            .expect("Failed to create organisation");

        TestHarness {
            mediator,
            ctx,
            product_id,
            organisation_id: organisation.organisation_id,
            event_store,
            read_models,
            number_pool,
            data_sets,
            updater: Some(updater),
            shutdown,
            _work_dir: work_dir,
        }
    }
}

/// A tenant with one organisation and the motor product
pub struct TestHarness {
    pub mediator: Mediator,
    pub ctx: RequestContext,
    pub product_id: ProductId,
    pub organisation_id: OrganisationId,
    pub event_store: Arc<InMemoryEventStore>,
    pub read_models: Arc<InMemoryReadModelStore>,
    pub number_pool: Arc<InMemoryNumberPool>,
    pub data_sets: Arc<InMemoryDataSetStore>,
    updater: Option<UpdaterService>,
    shutdown: watch::Sender<bool>,
    _work_dir: TempDir,
}

impl TestHarness {
    /// Same tenant, different caller
    pub fn context_for(&self, user_id: UserId, roles: &[&str]) -> RequestContext {
        RequestContext::new(self.ctx.tenant_id, self.ctx.environment)
            .with_user(user_id, roles.iter().map(|r| r.to_string()).collect())
    }

    pub async fn load_numbers(&self, kind: NumberKind, numbers: &[&str]) -> usize {
        self.mediator
            .send(
                LoadNumbers {
                    product_id: self.product_id,
                    kind,
                    numbers: numbers.iter().map(|n| n.to_string()).collect(),
                },
                &self.ctx,
            )
            .await
            .expect("numbers should load")
    }

    /// Numbers left in this tenant's pool for the motor product
    pub async fn available_numbers(&self, kind: NumberKind) -> usize {
        self.number_pool
            .available(NumberPoolKey {
                tenant_id: self.ctx.tenant_id,
                product_id: self.product_id,
                environment: self.ctx.environment,
                kind,
            })
            .await
            .expect("pool should report availability")
    }

    pub async fn create_quote(&self) -> QuoteReadModel {
        self.mediator
            .send(
                CreateQuote {
                    organisation_id: self.organisation_id,
                    product_id: self.product_id,
                    form_data: None,
                    is_test_data: false,
                },
                &self.ctx,
            )
            .await
            .expect("quote should be created")
    }

    /// A new quote with `form_data` entered and rated
    pub async fn calculated_quote(&self, form_data: Value) -> QuoteReadModel {
        let created = self.create_quote().await;
        self.mediator
            .send(
                UpdateQuoteFormData {
                    aggregate_id: created.aggregate_id,
                    quote_id: created.quote_id,
                    form_data,
                },
                &self.ctx,
            )
            .await
            .expect("form data should update");
        self.mediator
            .send(
                CalculateQuote {
                    aggregate_id: created.aggregate_id,
                    quote_id: created.quote_id,
                },
                &self.ctx,
            )
            .await
            .expect("quote should calculate")
    }

    /// Binds with a year of cover from now
    pub async fn bind(&self, quote: &QuoteReadModel) -> Result<QuoteReadModel, AppError> {
        let now = Utc::now();
        self.mediator
            .send(
                BindQuote {
                    aggregate_id: quote.aggregate_id,
                    quote_id: quote.quote_id,
                    effective_date: Some(now),
                    expiry_date: Some(now + chrono::Duration::days(365)),
                },
                &self.ctx,
            )
            .await
    }

    /// An activated user with [`TEST_PASSWORD`]
    pub async fn activated_user(&self, roles: &[&str]) -> UserReadModel {
        let details = fake_person();
        let login_email = details.email.clone().unwrap_or_default();
        let user = self
            .mediator
            .send(
                CreateUser {
                    organisation_id: self.organisation_id,
                    details,
                    login_email,
                    roles: roles.iter().map(|r| r.to_string()).collect(),
                },
                &self.ctx,
            )
            .await
            .expect("user should be created");
        let invitation_id = self
            .mediator
            .send(CreateActivationInvitation { user_id: user.user_id }, &self.ctx)
            .await
            .expect("invitation should be created");
        self.mediator
            .send(
                ActivateUser {
                    user_id: user.user_id,
                    invitation_id,
                    password: TEST_PASSWORD.to_string(),
                },
                &self.ctx,
            )
            .await
            .expect("user should activate")
    }

    /// Stops the scheduler and waits for running updater jobs
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(updater) = self.updater.take() {
            updater.shutdown().await;
        }
    }
}
