//! Organisation commands and queries

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use core_kernel::{AggregateRepository, EventSourced, LockKey, OrganisationId};
use domain_party::{OrganisationAggregate, PartyError};

use crate::error::{AppError, AppResult};
use crate::mediator::{Request, RequestContext, RequestHandler, RequestKind};
use crate::read_models::{OrganisationReadModel, ReadModelStore};

macro_rules! organisation_command {
    ($request:ty, $name:literal) => {
        impl Request for $request {
            type Response = OrganisationReadModel;
            const NAME: &'static str = $name;
            const KIND: RequestKind = RequestKind::Command;

            fn lock_key(&self, ctx: &RequestContext) -> Option<LockKey> {
                Some(LockKey::new(
                    ctx.tenant_id,
                    OrganisationAggregate::AGGREGATE_TYPE,
                    *self.organisation_id.as_uuid(),
                ))
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganisation {
    pub name: String,
    pub alias: String,
}

impl Request for CreateOrganisation {
    type Response = OrganisationReadModel;
    const NAME: &'static str = "CreateOrganisation";
    const KIND: RequestKind = RequestKind::Command;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameOrganisation {
    pub organisation_id: OrganisationId,
    pub name: String,
}
organisation_command!(RenameOrganisation, "RenameOrganisation");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeOrganisationAlias {
    pub organisation_id: OrganisationId,
    pub alias: String,
}
organisation_command!(ChangeOrganisationAlias, "ChangeOrganisationAlias");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisableOrganisation {
    pub organisation_id: OrganisationId,
}
organisation_command!(DisableOrganisation, "DisableOrganisation");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateOrganisation {
    pub organisation_id: OrganisationId,
}
organisation_command!(ActivateOrganisation, "ActivateOrganisation");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOrganisation {
    pub organisation_id: OrganisationId,
}
organisation_command!(DeleteOrganisation, "DeleteOrganisation");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOrganisation {
    pub organisation_id: OrganisationId,
}

impl Request for GetOrganisation {
    type Response = OrganisationReadModel;
    const NAME: &'static str = "GetOrganisation";
    const KIND: RequestKind = RequestKind::Query;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetOrganisationByAlias {
    pub alias: String,
}

impl Request for GetOrganisationByAlias {
    type Response = OrganisationReadModel;
    const NAME: &'static str = "GetOrganisationByAlias";
    const KIND: RequestKind = RequestKind::Query;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOrganisations {
    #[serde(default)]
    pub include_deleted: bool,
}

impl Request for ListOrganisations {
    type Response = Vec<OrganisationReadModel>;
    const NAME: &'static str = "ListOrganisations";
    const KIND: RequestKind = RequestKind::Query;
}

pub struct OrganisationHandler {
    repository: AggregateRepository<OrganisationAggregate>,
    read_models: Arc<dyn ReadModelStore>,
}

impl OrganisationHandler {
    pub fn new(repository: AggregateRepository<OrganisationAggregate>, read_models: Arc<dyn ReadModelStore>) -> Self {
        Self {
            repository,
            read_models,
        }
    }

    async fn ensure_alias_free(
        &self,
        ctx: &RequestContext,
        alias: &str,
        organisation_id: Option<OrganisationId>,
    ) -> AppResult<()> {
        match self.read_models.find_organisation_by_alias(ctx.tenant_id, alias).await? {
            Some(existing) if Some(existing.organisation_id) != organisation_id => Err(AppError::conflict(
                format!("the alias '{}' is already in use", alias),
            )),
            _ => Ok(()),
        }
    }

    async fn apply<F>(
        &self,
        ctx: &RequestContext,
        organisation_id: OrganisationId,
        change: F,
    ) -> AppResult<OrganisationReadModel>
    where
        F: FnOnce(&mut OrganisationAggregate) -> Result<(), PartyError> + Send,
    {
        let mut organisation = self
            .repository
            .find(ctx.tenant_id, *organisation_id.as_uuid())
            .await?
            .ok_or_else(|| AppError::not_found("organisation", organisation_id))?;
        change(&mut organisation)?;
        self.save(&mut organisation).await
    }

    async fn save(&self, organisation: &mut OrganisationAggregate) -> AppResult<OrganisationReadModel> {
        self.repository.save(organisation).await?;
        let read_model = OrganisationReadModel::project(organisation);
        self.read_models.upsert_organisation(read_model.clone()).await?;
        Ok(read_model)
    }
}

#[async_trait]
impl RequestHandler<CreateOrganisation> for OrganisationHandler {
    async fn handle(&self, request: CreateOrganisation, ctx: &RequestContext) -> AppResult<OrganisationReadModel> {
        self.ensure_alias_free(ctx, &request.alias, None).await?;

        let organisation_id = OrganisationId::new();
        let mut organisation = OrganisationAggregate::create(
            ctx.tenant_id,
            organisation_id,
            &request.name,
            &request.alias,
            ctx.performing_user_id,
        )?;
        let read_model = self.save(&mut organisation).await?;
        info!(organisation_id = %organisation_id, alias = %read_model.alias, "Created organisation");
        Ok(read_model)
    }
}

#[async_trait]
impl RequestHandler<RenameOrganisation> for OrganisationHandler {
    async fn handle(&self, request: RenameOrganisation, ctx: &RequestContext) -> AppResult<OrganisationReadModel> {
        let performer = ctx.performing_user_id;
        self.apply(ctx, request.organisation_id, |o| o.rename(&request.name, performer))
            .await
    }
}

#[async_trait]
impl RequestHandler<ChangeOrganisationAlias> for OrganisationHandler {
    async fn handle(
        &self,
        request: ChangeOrganisationAlias,
        ctx: &RequestContext,
    ) -> AppResult<OrganisationReadModel> {
        self.ensure_alias_free(ctx, &request.alias, Some(request.organisation_id))
            .await?;
        let performer = ctx.performing_user_id;
        self.apply(ctx, request.organisation_id, |o| o.change_alias(&request.alias, performer))
            .await
    }
}

#[async_trait]
impl RequestHandler<DisableOrganisation> for OrganisationHandler {
    async fn handle(&self, request: DisableOrganisation, ctx: &RequestContext) -> AppResult<OrganisationReadModel> {
        let performer = ctx.performing_user_id;
        self.apply(ctx, request.organisation_id, |o| o.disable(performer)).await
    }
}

#[async_trait]
impl RequestHandler<ActivateOrganisation> for OrganisationHandler {
    async fn handle(&self, request: ActivateOrganisation, ctx: &RequestContext) -> AppResult<OrganisationReadModel> {
        let performer = ctx.performing_user_id;
        self.apply(ctx, request.organisation_id, |o| o.activate(performer)).await
    }
}

#[async_trait]
impl RequestHandler<DeleteOrganisation> for OrganisationHandler {
    async fn handle(&self, request: DeleteOrganisation, ctx: &RequestContext) -> AppResult<OrganisationReadModel> {
        let performer = ctx.performing_user_id;
        let read_model = self
            .apply(ctx, request.organisation_id, |o| o.delete(performer))
            .await?;
        info!(organisation_id = %request.organisation_id, "Deleted organisation");
        Ok(read_model)
    }
}

#[async_trait]
impl RequestHandler<GetOrganisation> for OrganisationHandler {
    async fn handle(&self, request: GetOrganisation, ctx: &RequestContext) -> AppResult<OrganisationReadModel> {
        self.read_models
            .get_organisation(ctx.tenant_id, request.organisation_id)
            .await?
            .ok_or_else(|| AppError::not_found("organisation", request.organisation_id))
    }
}

#[async_trait]
impl RequestHandler<GetOrganisationByAlias> for OrganisationHandler {
    async fn handle(&self, request: GetOrganisationByAlias, ctx: &RequestContext) -> AppResult<OrganisationReadModel> {
        self.read_models
            .find_organisation_by_alias(ctx.tenant_id, &request.alias)
            .await?
            .ok_or_else(|| AppError::not_found("organisation with alias", &request.alias))
    }
}

#[async_trait]
impl RequestHandler<ListOrganisations> for OrganisationHandler {
    async fn handle(&self, request: ListOrganisations, ctx: &RequestContext) -> AppResult<Vec<OrganisationReadModel>> {
        Ok(self
            .read_models
            .list_organisations(ctx.tenant_id, request.include_deleted)
            .await?)
    }
}
