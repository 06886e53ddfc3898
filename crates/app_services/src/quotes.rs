//! Quote commands and queries

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{
    AggregateRepository, CustomerId, EventSourced, LockKey, OrganisationId, PersonId, ProductId, QuoteAggregateId, QuoteId,
};
use domain_quote::{
    Binding, NewQuoteAggregate, NumberKind, NumberPool, NumberPoolKey, QuoteAction, QuoteAggregate,
    QuoteReferenceGenerator, QuoteType, RatingEngine,
};

use crate::error::{AppError, AppResult};
use crate::mediator::{Request, RequestContext, RequestHandler, RequestKind};
use crate::read_models::{QuoteFilter, QuoteReadModel, ReadModelStore};

/// Tenant-wide quoting settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteSettings {
    /// Days until a new quote expires; 0 disables expiry
    pub quote_expiry_days: i64,
    /// How long before policy expiry a renewal quote may be opened
    pub renewal_window_days: i64,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            quote_expiry_days: 30,
            renewal_window_days: 60,
        }
    }
}

fn quote_lock(ctx: &RequestContext, aggregate_id: QuoteAggregateId) -> Option<LockKey> {
    Some(LockKey::new(ctx.tenant_id, QuoteAggregate::AGGREGATE_TYPE, *aggregate_id.as_uuid()))
}

/// Implements [`Request`] for a command addressed to one quote aggregate
macro_rules! quote_command {
    ($request:ty, $response:ty, $name:literal) => {
        impl Request for $request {
            type Response = $response;
            const NAME: &'static str = $name;
            const KIND: RequestKind = RequestKind::Command;

            fn lock_key(&self, ctx: &RequestContext) -> Option<LockKey> {
                quote_lock(ctx, self.aggregate_id)
            }
        }
    };
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuote {
    pub organisation_id: OrganisationId,
    pub product_id: ProductId,
    pub form_data: Option<Value>,
    #[serde(default)]
    pub is_test_data: bool,
}

impl Request for CreateQuote {
    type Response = QuoteReadModel;
    const NAME: &'static str = "CreateQuote";
    const KIND: RequestKind = RequestKind::Command;

    fn validate(&self) -> AppResult<()> {
        match &self.form_data {
            Some(form) if !form.is_object() => Err(AppError::validation("form data must be a JSON object")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQuoteFormData {
    pub aggregate_id: QuoteAggregateId,
    pub quote_id: QuoteId,
    pub form_data: Value,
}

impl Request for UpdateQuoteFormData {
    type Response = QuoteReadModel;
    const NAME: &'static str = "UpdateQuoteFormData";
    const KIND: RequestKind = RequestKind::Command;

    fn validate(&self) -> AppResult<()> {
        if !self.form_data.is_object() {
            return Err(AppError::validation("form data must be a JSON object"));
        }
        Ok(())
    }

    fn lock_key(&self, ctx: &RequestContext) -> Option<LockKey> {
        quote_lock(ctx, self.aggregate_id)
    }
}

/// Rates the quote's current form data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculateQuote {
    pub aggregate_id: QuoteAggregateId,
    pub quote_id: QuoteId,
}
quote_command!(CalculateQuote, QuoteReadModel, "CalculateQuote");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformQuoteAction {
    pub aggregate_id: QuoteAggregateId,
    pub quote_id: QuoteId,
    pub action: QuoteAction,
}
quote_command!(PerformQuoteAction, QuoteReadModel, "PerformQuoteAction");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitQuote {
    pub aggregate_id: QuoteAggregateId,
    pub quote_id: QuoteId,
}
quote_command!(SubmitQuote, QuoteReadModel, "SubmitQuote");

/// Completes the quote; numbers are taken from the tenant's pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindQuote {
    pub aggregate_id: QuoteAggregateId,
    pub quote_id: QuoteId,
    /// Inception, adjustment or cancellation date; defaults to now
    pub effective_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}
quote_command!(BindQuote, QuoteReadModel, "BindQuote");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscardQuote {
    pub aggregate_id: QuoteAggregateId,
    pub quote_id: QuoteId,
}
quote_command!(DiscardQuote, QuoteReadModel, "DiscardQuote");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetQuoteExpiry {
    pub aggregate_id: QuoteAggregateId,
    pub quote_id: QuoteId,
    pub expiry: DateTime<Utc>,
}
quote_command!(SetQuoteExpiry, QuoteReadModel, "SetQuoteExpiry");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignQuoteCustomer {
    pub aggregate_id: QuoteAggregateId,
    pub customer_id: CustomerId,
    pub person_id: Option<PersonId>,
}
quote_command!(AssignQuoteCustomer, Vec<QuoteReadModel>, "AssignQuoteCustomer");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAdjustmentQuote {
    pub aggregate_id: QuoteAggregateId,
}
quote_command!(CreateAdjustmentQuote, QuoteReadModel, "CreateAdjustmentQuote");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRenewalQuote {
    pub aggregate_id: QuoteAggregateId,
}
quote_command!(CreateRenewalQuote, QuoteReadModel, "CreateRenewalQuote");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCancellationQuote {
    pub aggregate_id: QuoteAggregateId,
}
quote_command!(CreateCancellationQuote, QuoteReadModel, "CreateCancellationQuote");

/// Discards every event after `sequence`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackQuoteAggregate {
    pub aggregate_id: QuoteAggregateId,
    pub sequence: u64,
}
quote_command!(RollbackQuoteAggregate, Vec<QuoteReadModel>, "RollbackQuoteAggregate");

/// Adds policy, invoice or credit note numbers to a product's pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadNumbers {
    pub product_id: ProductId,
    pub kind: NumberKind,
    pub numbers: Vec<String>,
}

impl Request for LoadNumbers {
    /// Count of numbers added
    type Response = usize;
    const NAME: &'static str = "LoadNumbers";
    const KIND: RequestKind = RequestKind::Command;

    fn validate(&self) -> AppResult<()> {
        if self.numbers.is_empty() {
            return Err(AppError::validation("no numbers given"));
        }
        if self.numbers.iter().any(|n| n.trim().is_empty()) {
            return Err(AppError::validation("numbers must not be blank"));
        }
        Ok(())
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetQuote {
    pub quote_id: QuoteId,
}

impl Request for GetQuote {
    type Response = QuoteReadModel;
    const NAME: &'static str = "GetQuote";
    const KIND: RequestKind = RequestKind::Query;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuotes {
    pub filter: QuoteFilter,
}

impl Request for ListQuotes {
    type Response = Vec<QuoteReadModel>;
    const NAME: &'static str = "ListQuotes";
    const KIND: RequestKind = RequestKind::Query;
}

// ============================================================================
// Handlers
// ============================================================================

fn select(documents: Vec<QuoteReadModel>, quote_id: QuoteId) -> AppResult<QuoteReadModel> {
    documents
        .into_iter()
        .find(|q| q.quote_id == quote_id)
        .ok_or_else(|| AppError::not_found("quote", quote_id))
}

pub struct QuoteCommandHandler {
    repository: AggregateRepository<QuoteAggregate>,
    read_models: Arc<dyn ReadModelStore>,
    number_pool: Arc<dyn NumberPool>,
    rating: Arc<RatingEngine>,
    references: QuoteReferenceGenerator,
    settings: QuoteSettings,
}

impl QuoteCommandHandler {
    pub fn new(
        repository: AggregateRepository<QuoteAggregate>,
        read_models: Arc<dyn ReadModelStore>,
        number_pool: Arc<dyn NumberPool>,
        rating: Arc<RatingEngine>,
        settings: QuoteSettings,
    ) -> Self {
        Self {
            repository,
            read_models,
            number_pool,
            rating,
            references: QuoteReferenceGenerator::new(),
            settings,
        }
    }

    /// Loads an aggregate of the caller's tenant and environment
    async fn load(&self, ctx: &RequestContext, aggregate_id: QuoteAggregateId) -> AppResult<QuoteAggregate> {
        let aggregate = self
            .repository
            .find(ctx.tenant_id, *aggregate_id.as_uuid())
            .await?
            .filter(|a| a.environment() == ctx.environment)
            .ok_or_else(|| AppError::not_found("quote aggregate", aggregate_id))?;
        Ok(aggregate)
    }

    async fn save(&self, aggregate: &mut QuoteAggregate) -> AppResult<Vec<QuoteReadModel>> {
        self.repository.save(aggregate).await?;
        self.project(aggregate).await
    }

    async fn project(&self, aggregate: &QuoteAggregate) -> AppResult<Vec<QuoteReadModel>> {
        let documents = QuoteReadModel::project(aggregate);
        self.read_models
            .replace_quotes(EventSourced::tenant_id(aggregate), aggregate.id(), documents.clone())
            .await?;
        Ok(documents)
    }

    async fn save_and_read(&self, aggregate: &mut QuoteAggregate, quote_id: QuoteId) -> AppResult<QuoteReadModel> {
        let documents = self.save(aggregate).await?;
        select(documents, quote_id)
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.settings.quote_expiry_days > 0).then(|| now + Duration::days(self.settings.quote_expiry_days))
    }

    /// Numbers a freshly opened quote and starts its expiry clock
    fn prepare_new_quote(
        &self,
        aggregate: &mut QuoteAggregate,
        quote_id: QuoteId,
        ctx: &RequestContext,
    ) -> AppResult<()> {
        aggregate.assign_quote_number(quote_id, self.references.generate(), ctx.performing_user_id)?;
        if let Some(expiry) = self.expiry_from(Utc::now()) {
            aggregate.set_expiry(quote_id, expiry, ctx.performing_user_id)?;
        }
        Ok(())
    }

    /// Takes a pool number and records it in `taken`
    async fn take_number(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
        kind: NumberKind,
        taken: &mut Vec<(NumberKind, String)>,
    ) -> AppResult<String> {
        let key = NumberPoolKey::new(ctx.tenant_id, product_id, ctx.environment, kind);
        let number = self.number_pool.consume(key).await.map_err(|e| {
            if e.is_not_found() {
                AppError::BusinessRule(format!("no {} numbers are available", kind))
            } else {
                AppError::from(e)
            }
        })?;
        taken.push((kind, number.clone()));
        Ok(number)
    }

    /// Hands numbers of a bind that was not stored back to their pools
    async fn release_numbers(&self, ctx: &RequestContext, product_id: ProductId, taken: Vec<(NumberKind, String)>) {
        for (kind, number) in taken {
            let key = NumberPoolKey::new(ctx.tenant_id, product_id, ctx.environment, kind);
            if let Err(e) = self.number_pool.release(key, &number).await {
                warn!(number = %number, kind = %kind, error = %e, "Failed to release number");
            }
        }
    }

    async fn open_policy_quote(
        &self,
        ctx: &RequestContext,
        aggregate_id: QuoteAggregateId,
        quote_type: QuoteType,
    ) -> AppResult<QuoteReadModel> {
        let mut aggregate = self.load(ctx, aggregate_id).await?;
        let quote_id = QuoteId::new();
        let now = Utc::now();
        let user = ctx.performing_user_id;

        match quote_type {
            QuoteType::Adjustment => aggregate.create_adjustment_quote(quote_id, now, user)?,
            QuoteType::Renewal => aggregate.create_renewal_quote(
                quote_id,
                Duration::days(self.settings.renewal_window_days),
                now,
                user,
            )?,
            QuoteType::Cancellation => aggregate.create_cancellation_quote(quote_id, now, user)?,
            QuoteType::NewBusiness => {
                return Err(AppError::internal("new business quotes open a new aggregate"));
            }
        }
        self.prepare_new_quote(&mut aggregate, quote_id, ctx)?;

        info!(aggregate_id = %aggregate_id, quote_id = %quote_id, quote_type = %quote_type, "Opened policy transaction quote");
        self.save_and_read(&mut aggregate, quote_id).await
    }
}

#[async_trait]
impl RequestHandler<CreateQuote> for QuoteCommandHandler {
    #[instrument(skip_all, fields(product_id = %request.product_id))]
    async fn handle(&self, request: CreateQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        let quote_id = QuoteId::new();
        let mut aggregate = QuoteAggregate::create_new_business(
            NewQuoteAggregate {
                tenant_id: ctx.tenant_id,
                aggregate_id: QuoteAggregateId::new(),
                organisation_id: request.organisation_id,
                product_id: request.product_id,
                environment: ctx.environment,
                is_test_data: request.is_test_data,
                quote_id,
                form_data: request.form_data,
            },
            ctx.performing_user_id,
        )?;
        self.prepare_new_quote(&mut aggregate, quote_id, ctx)?;
        if let Some(owner) = ctx.performing_user_id {
            aggregate.assign_owner(owner, Some(owner))?;
        }

        info!(aggregate_id = %aggregate.id(), quote_id = %quote_id, "Created quote");
        self.save_and_read(&mut aggregate, quote_id).await
    }
}

#[async_trait]
impl RequestHandler<UpdateQuoteFormData> for QuoteCommandHandler {
    async fn handle(&self, request: UpdateQuoteFormData, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        aggregate.update_form_data(request.quote_id, request.form_data, ctx.performing_user_id)?;
        self.save_and_read(&mut aggregate, request.quote_id).await
    }
}

#[async_trait]
impl RequestHandler<CalculateQuote> for QuoteCommandHandler {
    async fn handle(&self, request: CalculateQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        let form_data = aggregate.quote(request.quote_id)?.form_data().clone();
        let calculation = self.rating.calculate(aggregate.product_id(), &form_data)?;
        aggregate.record_calculation(request.quote_id, calculation, ctx.performing_user_id)?;
        self.save_and_read(&mut aggregate, request.quote_id).await
    }
}

#[async_trait]
impl RequestHandler<PerformQuoteAction> for QuoteCommandHandler {
    async fn handle(&self, request: PerformQuoteAction, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        let state = aggregate.perform_action(request.quote_id, request.action, ctx.performing_user_id)?;
        info!(quote_id = %request.quote_id, action = %request.action, state = %state, "Performed quote action");
        self.save_and_read(&mut aggregate, request.quote_id).await
    }
}

#[async_trait]
impl RequestHandler<SubmitQuote> for QuoteCommandHandler {
    async fn handle(&self, request: SubmitQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        aggregate.submit(request.quote_id, ctx.performing_user_id)?;
        self.save_and_read(&mut aggregate, request.quote_id).await
    }
}

#[async_trait]
impl RequestHandler<BindQuote> for QuoteCommandHandler {
    #[instrument(skip_all, fields(quote_id = %request.quote_id))]
    async fn handle(&self, request: BindQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        let now = Utc::now();

        let quote_type = aggregate.quote(request.quote_id)?.quote_type();
        let effective = request.effective_date.unwrap_or(now);

        // Dry run on a copy so pool numbers are only taken for a quote that binds
        aggregate.clone().bind(
            request.quote_id,
            Binding {
                policy_number: Some("pending".into()),
                document_number: "pending".into(),
                effective,
                expiry: request.expiry_date,
            },
            now,
            ctx.performing_user_id,
        )?;

        let product_id = aggregate.product_id();
        let document_kind = match quote_type {
            QuoteType::Cancellation => NumberKind::CreditNote,
            _ => NumberKind::Invoice,
        };

        // Numbers count as used only once the bind events are stored
        let mut taken = Vec::with_capacity(2);
        let stored = async {
            let policy_number = match quote_type {
                QuoteType::NewBusiness => Some(self.take_number(ctx, product_id, NumberKind::Policy, &mut taken).await?),
                _ => None,
            };
            let document_number = self.take_number(ctx, product_id, document_kind, &mut taken).await?;

            let binding = Binding {
                policy_number,
                document_number,
                effective,
                expiry: request.expiry_date,
            };
            aggregate.bind(request.quote_id, binding, now, ctx.performing_user_id)?;
            self.repository.save(&mut aggregate).await?;
            Ok::<(), AppError>(())
        }
        .await;
        if let Err(e) = stored {
            self.release_numbers(ctx, product_id, taken).await;
            return Err(e);
        }

        info!(
            aggregate_id = %request.aggregate_id,
            quote_type = %quote_type,
            policy_number = aggregate.policy().map(|p| p.policy_number()).unwrap_or_default(),
            "Bound quote"
        );
        let documents = self.project(&aggregate).await?;
        select(documents, request.quote_id)
    }
}

#[async_trait]
impl RequestHandler<DiscardQuote> for QuoteCommandHandler {
    async fn handle(&self, request: DiscardQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        aggregate.discard(request.quote_id, ctx.performing_user_id)?;
        self.save_and_read(&mut aggregate, request.quote_id).await
    }
}

#[async_trait]
impl RequestHandler<SetQuoteExpiry> for QuoteCommandHandler {
    async fn handle(&self, request: SetQuoteExpiry, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        aggregate.set_expiry(request.quote_id, request.expiry, ctx.performing_user_id)?;
        self.save_and_read(&mut aggregate, request.quote_id).await
    }
}

#[async_trait]
impl RequestHandler<AssignQuoteCustomer> for QuoteCommandHandler {
    async fn handle(&self, request: AssignQuoteCustomer, ctx: &RequestContext) -> AppResult<Vec<QuoteReadModel>> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        aggregate.assign_customer(request.customer_id, request.person_id, ctx.performing_user_id)?;
        self.save(&mut aggregate).await
    }
}

#[async_trait]
impl RequestHandler<CreateAdjustmentQuote> for QuoteCommandHandler {
    async fn handle(&self, request: CreateAdjustmentQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        self.open_policy_quote(ctx, request.aggregate_id, QuoteType::Adjustment).await
    }
}

#[async_trait]
impl RequestHandler<CreateRenewalQuote> for QuoteCommandHandler {
    async fn handle(&self, request: CreateRenewalQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        self.open_policy_quote(ctx, request.aggregate_id, QuoteType::Renewal).await
    }
}

#[async_trait]
impl RequestHandler<CreateCancellationQuote> for QuoteCommandHandler {
    async fn handle(&self, request: CreateCancellationQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        self.open_policy_quote(ctx, request.aggregate_id, QuoteType::Cancellation).await
    }
}

#[async_trait]
impl RequestHandler<RollbackQuoteAggregate> for QuoteCommandHandler {
    async fn handle(&self, request: RollbackQuoteAggregate, ctx: &RequestContext) -> AppResult<Vec<QuoteReadModel>> {
        let mut aggregate = self.load(ctx, request.aggregate_id).await?;
        aggregate.rollback_to(request.sequence, ctx.performing_user_id)?;
        self.repository.save(&mut aggregate).await?;
        info!(aggregate_id = %request.aggregate_id, sequence = request.sequence, "Rolled back quote aggregate");

        // The saved instance still holds pre-rollback state
        let mut reloaded = self.load(ctx, request.aggregate_id).await?;
        self.save(&mut reloaded).await
    }
}

#[async_trait]
impl RequestHandler<LoadNumbers> for QuoteCommandHandler {
    async fn handle(&self, request: LoadNumbers, ctx: &RequestContext) -> AppResult<usize> {
        let key = NumberPoolKey::new(ctx.tenant_id, request.product_id, ctx.environment, request.kind);
        let added = self.number_pool.load(key, request.numbers).await?;
        info!(product_id = %request.product_id, kind = %request.kind, added, "Loaded numbers");
        Ok(added)
    }
}

pub struct QuoteQueryHandler {
    read_models: Arc<dyn ReadModelStore>,
}

impl QuoteQueryHandler {
    pub fn new(read_models: Arc<dyn ReadModelStore>) -> Self {
        Self { read_models }
    }
}

#[async_trait]
impl RequestHandler<GetQuote> for QuoteQueryHandler {
    async fn handle(&self, request: GetQuote, ctx: &RequestContext) -> AppResult<QuoteReadModel> {
        self.read_models
            .get_quote(ctx.tenant_id, request.quote_id)
            .await?
            .filter(|q| q.environment == ctx.environment)
            .ok_or_else(|| AppError::not_found("quote", request.quote_id))
    }
}

#[async_trait]
impl RequestHandler<ListQuotes> for QuoteQueryHandler {
    async fn handle(&self, request: ListQuotes, ctx: &RequestContext) -> AppResult<Vec<QuoteReadModel>> {
        let quotes = self.read_models.list_quotes(ctx.tenant_id, &request.filter).await?;
        Ok(quotes
            .into_iter()
            .filter(|q| q.environment == ctx.environment)
            .collect())
    }
}
