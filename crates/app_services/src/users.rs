//! User and person commands and queries

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    AggregateRepository, EventSourced, InvitationId, LockKey, OrganisationId, PersonId, UserId,
};
use domain_party::{NewUser, PartyError, PasswordHasher, PersonAggregate, PersonDetails, UserAggregate};

use crate::error::{AppError, AppResult};
use crate::mediator::{Request, RequestContext, RequestHandler, RequestKind};
use crate::read_models::{ReadModelStore, UserReadModel};

fn user_lock(ctx: &RequestContext, user_id: UserId) -> Option<LockKey> {
    Some(LockKey::new(ctx.tenant_id, UserAggregate::AGGREGATE_TYPE, *user_id.as_uuid()))
}

macro_rules! user_command {
    ($request:ty, $response:ty, $name:literal) => {
        impl Request for $request {
            type Response = $response;
            const NAME: &'static str = $name;
            const KIND: RequestKind = RequestKind::Command;

            fn lock_key(&self, ctx: &RequestContext) -> Option<LockKey> {
                user_lock(ctx, self.user_id)
            }
        }
    };
}

// ============================================================================
// Commands
// ============================================================================

/// Creates a person and the user account linked to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub organisation_id: OrganisationId,
    pub details: PersonDetails,
    pub login_email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Request for CreateUser {
    type Response = UserReadModel;
    const NAME: &'static str = "CreateUser";
    const KIND: RequestKind = RequestKind::Command;

    fn validate(&self) -> AppResult<()> {
        if self.login_email.trim().is_empty() {
            return Err(AppError::validation("login_email: is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLoginEmail {
    pub user_id: UserId,
    pub login_email: String,
}
user_command!(SetLoginEmail, UserReadModel, "SetLoginEmail");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRole {
    pub user_id: UserId,
    pub role: String,
}
user_command!(AssignRole, UserReadModel, "AssignRole");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetractRole {
    pub user_id: UserId,
    pub role: String,
}
user_command!(RetractRole, UserReadModel, "RetractRole");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockUser {
    pub user_id: UserId,
}
user_command!(BlockUser, UserReadModel, "BlockUser");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnblockUser {
    pub user_id: UserId,
}
user_command!(UnblockUser, UserReadModel, "UnblockUser");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateActivationInvitation {
    pub user_id: UserId,
}
user_command!(CreateActivationInvitation, InvitationId, "CreateActivationInvitation");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateUser {
    pub user_id: UserId,
    pub invitation_id: InvitationId,
    pub password: String,
}
user_command!(ActivateUser, UserReadModel, "ActivateUser");

/// Starts a password reset for the account with this login email
///
/// Resolves to `None` when no account matches, so callers can respond the
/// same way either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPasswordReset {
    pub login_email: String,
}

impl Request for RequestPasswordReset {
    type Response = Option<(UserId, InvitationId)>;
    const NAME: &'static str = "RequestPasswordReset";
    const KIND: RequestKind = RequestKind::Command;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPassword {
    pub user_id: UserId,
    pub invitation_id: InvitationId,
    pub password: String,
}
user_command!(ResetPassword, UserReadModel, "ResetPassword");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePassword {
    pub user_id: UserId,
    pub current_password: String,
    pub new_password: String,
}
user_command!(ChangePassword, UserReadModel, "ChangePassword");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePersonDetails {
    pub person_id: PersonId,
    pub details: PersonDetails,
}

impl Request for UpdatePersonDetails {
    /// The linked user's read model, if the person has an account
    type Response = Option<UserReadModel>;
    const NAME: &'static str = "UpdatePersonDetails";
    const KIND: RequestKind = RequestKind::Command;

    fn lock_key(&self, ctx: &RequestContext) -> Option<LockKey> {
        Some(LockKey::new(ctx.tenant_id, PersonAggregate::AGGREGATE_TYPE, *self.person_id.as_uuid()))
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Checks credentials; records nothing
#[derive(Clone, Serialize, Deserialize)]
pub struct Login {
    pub login_email: String,
    pub password: String,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("login_email", &self.login_email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Request for Login {
    type Response = UserReadModel;
    const NAME: &'static str = "Login";
    const KIND: RequestKind = RequestKind::Query;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUser {
    pub user_id: UserId,
}

impl Request for GetUser {
    type Response = UserReadModel;
    const NAME: &'static str = "GetUser";
    const KIND: RequestKind = RequestKind::Query;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListUsers {
    pub organisation_id: Option<OrganisationId>,
}

impl Request for ListUsers {
    type Response = Vec<UserReadModel>;
    const NAME: &'static str = "ListUsers";
    const KIND: RequestKind = RequestKind::Query;
}

// ============================================================================
// Handlers
// ============================================================================

pub struct UserCommandHandler {
    users: AggregateRepository<UserAggregate>,
    people: AggregateRepository<PersonAggregate>,
    read_models: Arc<dyn ReadModelStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserCommandHandler {
    pub fn new(
        users: AggregateRepository<UserAggregate>,
        people: AggregateRepository<PersonAggregate>,
        read_models: Arc<dyn ReadModelStore>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            users,
            people,
            read_models,
            hasher,
        }
    }

    async fn load(&self, ctx: &RequestContext, user_id: UserId) -> AppResult<UserAggregate> {
        self.users
            .find(ctx.tenant_id, *user_id.as_uuid())
            .await?
            .ok_or_else(|| AppError::not_found("user", user_id))
    }

    async fn person_of(&self, user: &UserAggregate) -> AppResult<PersonAggregate> {
        self.people
            .find(EventSourced::tenant_id(user), *user.person_id().as_uuid())
            .await?
            .ok_or_else(|| AppError::not_found("person", user.person_id()))
    }

    async fn ensure_email_free(&self, ctx: &RequestContext, email: &str, user_id: Option<UserId>) -> AppResult<()> {
        match self.read_models.find_user_by_email(ctx.tenant_id, email).await? {
            Some(existing) if Some(existing.user_id) != user_id => Err(AppError::conflict(format!(
                "a user with login email '{}' already exists",
                email.to_lowercase()
            ))),
            _ => Ok(()),
        }
    }

    async fn save(&self, user: &mut UserAggregate) -> AppResult<UserReadModel> {
        self.users.save(user).await?;
        let person = self.person_of(user).await?;
        let read_model = UserReadModel::project(user, &person);
        self.read_models.upsert_user(read_model.clone()).await?;
        Ok(read_model)
    }

    /// Load, apply, save and project
    async fn apply<F>(&self, ctx: &RequestContext, user_id: UserId, change: F) -> AppResult<UserReadModel>
    where
        F: FnOnce(&mut UserAggregate) -> Result<(), PartyError> + Send,
    {
        let mut user = self.load(ctx, user_id).await?;
        change(&mut user)?;
        self.save(&mut user).await
    }
}

#[async_trait]
impl RequestHandler<CreateUser> for UserCommandHandler {
    #[instrument(skip_all, fields(organisation_id = %request.organisation_id))]
    async fn handle(&self, request: CreateUser, ctx: &RequestContext) -> AppResult<UserReadModel> {
        let organisation = self
            .read_models
            .get_organisation(ctx.tenant_id, request.organisation_id)
            .await?
            .filter(|o| !o.deleted)
            .ok_or_else(|| AppError::not_found("organisation", request.organisation_id))?;
        if !organisation.active {
            return Err(AppError::BusinessRule(format!(
                "organisation '{}' is disabled",
                organisation.alias
            )));
        }
        self.ensure_email_free(ctx, &request.login_email, None).await?;

        let user_id = UserId::new();
        let person_id = PersonId::new();
        let performer = ctx.performing_user_id;

        let mut person = PersonAggregate::create(
            ctx.tenant_id,
            person_id,
            request.organisation_id,
            request.details,
            performer,
        )?;
        let mut user = UserAggregate::create(
            NewUser {
                tenant_id: ctx.tenant_id,
                user_id,
                organisation_id: request.organisation_id,
                person_id,
                login_email: request.login_email,
                roles: request.roles,
            },
            performer,
        )?;
        person.link_user_account(user_id, performer)?;

        self.people.save(&mut person).await?;
        self.users.save(&mut user).await?;

        let read_model = UserReadModel::project(&user, &person);
        self.read_models.upsert_user(read_model.clone()).await?;
        info!(user_id = %user_id, person_id = %person_id, "Created user");
        Ok(read_model)
    }
}

#[async_trait]
impl RequestHandler<SetLoginEmail> for UserCommandHandler {
    async fn handle(&self, request: SetLoginEmail, ctx: &RequestContext) -> AppResult<UserReadModel> {
        self.ensure_email_free(ctx, &request.login_email, Some(request.user_id))
            .await?;
        let performer = ctx.performing_user_id;
        self.apply(ctx, request.user_id, |user| {
            user.set_login_email(&request.login_email, performer)
        })
        .await
    }
}

#[async_trait]
impl RequestHandler<AssignRole> for UserCommandHandler {
    async fn handle(&self, request: AssignRole, ctx: &RequestContext) -> AppResult<UserReadModel> {
        let performer = ctx.performing_user_id;
        self.apply(ctx, request.user_id, |user| user.add_role(&request.role, performer))
            .await
    }
}

#[async_trait]
impl RequestHandler<RetractRole> for UserCommandHandler {
    async fn handle(&self, request: RetractRole, ctx: &RequestContext) -> AppResult<UserReadModel> {
        let performer = ctx.performing_user_id;
        self.apply(ctx, request.user_id, |user| user.retract_role(&request.role, performer))
            .await
    }
}

#[async_trait]
impl RequestHandler<BlockUser> for UserCommandHandler {
    async fn handle(&self, request: BlockUser, ctx: &RequestContext) -> AppResult<UserReadModel> {
        let performer = ctx.performing_user_id;
        let read_model = self.apply(ctx, request.user_id, |user| user.block(performer)).await?;
        info!(user_id = %request.user_id, "Blocked user");
        Ok(read_model)
    }
}

#[async_trait]
impl RequestHandler<UnblockUser> for UserCommandHandler {
    async fn handle(&self, request: UnblockUser, ctx: &RequestContext) -> AppResult<UserReadModel> {
        let performer = ctx.performing_user_id;
        self.apply(ctx, request.user_id, |user| user.unblock(performer)).await
    }
}

#[async_trait]
impl RequestHandler<CreateActivationInvitation> for UserCommandHandler {
    async fn handle(&self, request: CreateActivationInvitation, ctx: &RequestContext) -> AppResult<InvitationId> {
        let mut user = self.load(ctx, request.user_id).await?;
        let invitation = user.create_activation_invitation(Utc::now(), ctx.performing_user_id)?;
        self.save(&mut user).await?;
        info!(user_id = %request.user_id, invitation_id = %invitation, "Created activation invitation");
        Ok(invitation)
    }
}

#[async_trait]
impl RequestHandler<ActivateUser> for UserCommandHandler {
    async fn handle(&self, request: ActivateUser, ctx: &RequestContext) -> AppResult<UserReadModel> {
        let hasher = self.hasher.clone();
        self.apply(ctx, request.user_id, |user| {
            user.activate(request.invitation_id, &request.password, hasher.as_ref(), Utc::now())
        })
        .await
    }
}

#[async_trait]
impl RequestHandler<RequestPasswordReset> for UserCommandHandler {
    async fn handle(
        &self,
        request: RequestPasswordReset,
        ctx: &RequestContext,
    ) -> AppResult<Option<(UserId, InvitationId)>> {
        let Some(found) = self
            .read_models
            .find_user_by_email(ctx.tenant_id, &request.login_email)
            .await?
        else {
            debug!("Password reset requested for an unknown login email");
            return Ok(None);
        };

        let mut user = self.load(ctx, found.user_id).await?;
        let invitation = user.create_password_reset_invitation(Utc::now(), ctx.performing_user_id)?;
        self.save(&mut user).await?;
        info!(user_id = %found.user_id, invitation_id = %invitation, "Created password reset invitation");
        Ok(Some((found.user_id, invitation)))
    }
}

#[async_trait]
impl RequestHandler<ResetPassword> for UserCommandHandler {
    async fn handle(&self, request: ResetPassword, ctx: &RequestContext) -> AppResult<UserReadModel> {
        let hasher = self.hasher.clone();
        self.apply(ctx, request.user_id, |user| {
            user.reset_password(request.invitation_id, &request.password, hasher.as_ref(), Utc::now())
        })
        .await
    }
}

#[async_trait]
impl RequestHandler<ChangePassword> for UserCommandHandler {
    async fn handle(&self, request: ChangePassword, ctx: &RequestContext) -> AppResult<UserReadModel> {
        if ctx.performing_user_id != Some(request.user_id) {
            return Err(AppError::Forbidden("users may only change their own password".into()));
        }
        let hasher = self.hasher.clone();
        self.apply(ctx, request.user_id, |user| {
            user.change_password(&request.current_password, &request.new_password, hasher.as_ref())
        })
        .await
    }
}

#[async_trait]
impl RequestHandler<UpdatePersonDetails> for UserCommandHandler {
    async fn handle(&self, request: UpdatePersonDetails, ctx: &RequestContext) -> AppResult<Option<UserReadModel>> {
        let mut person = self
            .people
            .find(ctx.tenant_id, *request.person_id.as_uuid())
            .await?
            .ok_or_else(|| AppError::not_found("person", request.person_id))?;
        person.update_details(request.details, ctx.performing_user_id)?;
        self.people.save(&mut person).await?;

        let Some(user_id) = person.user_id() else {
            return Ok(None);
        };
        let user = self.load(ctx, user_id).await?;
        let read_model = UserReadModel::project(&user, &person);
        self.read_models.upsert_user(read_model.clone()).await?;
        Ok(Some(read_model))
    }
}

pub struct UserQueryHandler {
    users: AggregateRepository<UserAggregate>,
    read_models: Arc<dyn ReadModelStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserQueryHandler {
    pub fn new(
        users: AggregateRepository<UserAggregate>,
        read_models: Arc<dyn ReadModelStore>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            users,
            read_models,
            hasher,
        }
    }
}

#[async_trait]
impl RequestHandler<Login> for UserQueryHandler {
    async fn handle(&self, request: Login, ctx: &RequestContext) -> AppResult<UserReadModel> {
        let rejected = || AppError::Unauthorized("invalid login email or password".into());

        let found = self
            .read_models
            .find_user_by_email(ctx.tenant_id, &request.login_email)
            .await?
            .ok_or_else(rejected)?;
        let user = self
            .users
            .find(ctx.tenant_id, *found.user_id.as_uuid())
            .await?
            .ok_or_else(rejected)?;

        match user.verify_login(&request.password, self.hasher.as_ref()) {
            Ok(()) => Ok(found),
            Err(PartyError::UserBlocked) => {
                warn!(user_id = %found.user_id, "Login attempt on blocked account");
                Err(AppError::Forbidden("the account is blocked".into()))
            }
            Err(PartyError::InvalidCredentials | PartyError::NotActivated) => Err(rejected()),
            Err(other) => Err(other.into()),
        }
    }
}

#[async_trait]
impl RequestHandler<GetUser> for UserQueryHandler {
    async fn handle(&self, request: GetUser, ctx: &RequestContext) -> AppResult<UserReadModel> {
        self.read_models
            .get_user(ctx.tenant_id, request.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("user", request.user_id))
    }
}

#[async_trait]
impl RequestHandler<ListUsers> for UserQueryHandler {
    async fn handle(&self, request: ListUsers, ctx: &RequestContext) -> AppResult<Vec<UserReadModel>> {
        Ok(self
            .read_models
            .list_users(ctx.tenant_id, request.organisation_id)
            .await?)
    }
}
