//! Handler registration

use std::sync::Arc;
use std::time::Duration;

use core_kernel::{AggregateLockService, AggregateRepository, EventStore};
use domain_party::PasswordHasher;
use domain_quote::{NumberPool, RatingEngine};
use infra_updater::UpdaterJobManager;

use crate::behaviours::{AggregateLockBehaviour, LoggingBehaviour};
use crate::mediator::Mediator;
use crate::organisations::*;
use crate::quotes::*;
use crate::read_models::ReadModelStore;
use crate::updater_jobs::*;
use crate::users::*;

/// Default wait for an aggregate lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapters and settings the handlers are built from
#[derive(Clone)]
pub struct AppDependencies {
    pub event_store: Arc<dyn EventStore>,
    pub locks: Arc<dyn AggregateLockService>,
    pub read_models: Arc<dyn ReadModelStore>,
    pub number_pool: Arc<dyn NumberPool>,
    pub rating: Arc<RatingEngine>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub updater: Arc<UpdaterJobManager>,
    pub quote_settings: QuoteSettings,
    pub lock_timeout: Duration,
}

/// Builds a mediator with every handler and the standard pipeline
///
/// Logging runs outermost so lock waits are included in request timings.
pub fn build_mediator(deps: AppDependencies) -> Mediator {
    let quotes = Arc::new(QuoteCommandHandler::new(
        AggregateRepository::new(Arc::clone(&deps.event_store)),
        Arc::clone(&deps.read_models),
        Arc::clone(&deps.number_pool),
        Arc::clone(&deps.rating),
        deps.quote_settings,
    ));
    let quote_queries = Arc::new(QuoteQueryHandler::new(Arc::clone(&deps.read_models)));
    let users = Arc::new(UserCommandHandler::new(
        AggregateRepository::new(Arc::clone(&deps.event_store)),
        AggregateRepository::new(Arc::clone(&deps.event_store)),
        Arc::clone(&deps.read_models),
        Arc::clone(&deps.password_hasher),
    ));
    let user_queries = Arc::new(UserQueryHandler::new(
        AggregateRepository::new(Arc::clone(&deps.event_store)),
        Arc::clone(&deps.read_models),
        Arc::clone(&deps.password_hasher),
    ));
    let organisations = Arc::new(OrganisationHandler::new(
        AggregateRepository::new(Arc::clone(&deps.event_store)),
        Arc::clone(&deps.read_models),
    ));
    let updater = Arc::new(UpdaterJobHandler::new(Arc::clone(&deps.updater)));

    let mut mediator = Mediator::new();
    mediator
        .add_behaviour(Arc::new(LoggingBehaviour))
        .add_behaviour(Arc::new(AggregateLockBehaviour::new(deps.locks, deps.lock_timeout)));

    mediator
        .register::<CreateQuote>(quotes.clone())
        .register::<UpdateQuoteFormData>(quotes.clone())
        .register::<CalculateQuote>(quotes.clone())
        .register::<PerformQuoteAction>(quotes.clone())
        .register::<SubmitQuote>(quotes.clone())
        .register::<BindQuote>(quotes.clone())
        .register::<DiscardQuote>(quotes.clone())
        .register::<SetQuoteExpiry>(quotes.clone())
        .register::<AssignQuoteCustomer>(quotes.clone())
        .register::<CreateAdjustmentQuote>(quotes.clone())
        .register::<CreateRenewalQuote>(quotes.clone())
        .register::<CreateCancellationQuote>(quotes.clone())
        .register::<RollbackQuoteAggregate>(quotes.clone())
        .register::<LoadNumbers>(quotes)
        .register::<GetQuote>(quote_queries.clone())
        .register::<ListQuotes>(quote_queries);

    mediator
        .register::<CreateUser>(users.clone())
        .register::<SetLoginEmail>(users.clone())
        .register::<AssignRole>(users.clone())
        .register::<RetractRole>(users.clone())
        .register::<BlockUser>(users.clone())
        .register::<UnblockUser>(users.clone())
        .register::<CreateActivationInvitation>(users.clone())
        .register::<ActivateUser>(users.clone())
        .register::<RequestPasswordReset>(users.clone())
        .register::<ResetPassword>(users.clone())
        .register::<ChangePassword>(users.clone())
        .register::<UpdatePersonDetails>(users)
        .register::<Login>(user_queries.clone())
        .register::<GetUser>(user_queries.clone())
        .register::<ListUsers>(user_queries);

    mediator
        .register::<CreateOrganisation>(organisations.clone())
        .register::<RenameOrganisation>(organisations.clone())
        .register::<ChangeOrganisationAlias>(organisations.clone())
        .register::<DisableOrganisation>(organisations.clone())
        .register::<ActivateOrganisation>(organisations.clone())
        .register::<DeleteOrganisation>(organisations.clone())
        .register::<GetOrganisation>(organisations.clone())
        .register::<GetOrganisationByAlias>(organisations.clone())
        .register::<ListOrganisations>(organisations);

    mediator
        .register::<StartUpdaterJob>(updater.clone())
        .register::<AbortUpdaterJob>(updater.clone())
        .register::<GetUpdaterJob>(updater.clone())
        .register::<ListUpdaterJobs>(updater);

    mediator
}
