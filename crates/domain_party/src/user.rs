//! User account aggregate
//!
//! A user is the login identity of a person. Accounts are created
//! unactivated; the person activates theirs through an emailed invitation
//! and sets a password. Forgotten passwords follow the same invitation
//! flow.
//!
//! # Invitations
//!
//! An invitation is valid for [`INVITATION_VALIDITY_DAYS`] days. Creating a new one
//! supersedes the previous invitation of the same kind, and using an
//! invitation consumes it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{
    AggregateError, DomainEvent, EventEnvelope, EventSourced, EventStream, InvitationId,
    OrganisationId, PersonId, TenantId, UserId,
};

use crate::error::PartyError;
use crate::events::UserEvent;
use crate::password::PasswordHasher;
use crate::validation::{validate_email, validate_password};

pub const INVITATION_VALIDITY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Parameters for a new user account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub organisation_id: OrganisationId,
    pub person_id: PersonId,
    pub login_email: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UserAggregate {
    id: UserId,
    tenant_id: TenantId,
    organisation_id: OrganisationId,
    person_id: PersonId,
    login_email: String,
    roles: Vec<String>,
    blocked: bool,
    activated: bool,
    password_hash: Option<String>,
    activation_invitation: Option<Invitation>,
    reset_invitation: Option<Invitation>,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    stream: EventStream<UserEvent>,
}

impl UserAggregate {
    pub fn create(params: NewUser, performing_user_id: Option<UserId>) -> Result<Self, PartyError> {
        validate_email(&params.login_email)?;

        let mut roles: Vec<String> = Vec::with_capacity(params.roles.len());
        for role in params.roles {
            let role = normalise_role(&role)?;
            if roles.contains(&role) {
                return Err(PartyError::DuplicateRole(role));
            }
            roles.push(role);
        }

        let aggregate = <Self as EventSourced>::create(
            params.tenant_id,
            *params.user_id.as_uuid(),
            UserEvent::UserInitialized {
                organisation_id: params.organisation_id,
                person_id: params.person_id,
                login_email: params.login_email.to_lowercase(),
                roles,
            },
            performing_user_id,
        )?;
        Ok(aggregate)
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn organisation_id(&self) -> OrganisationId {
        self.organisation_id
    }

    pub fn person_id(&self) -> PersonId {
        self.person_id
    }

    pub fn login_email(&self) -> &str {
        &self.login_email
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn activation_invitation(&self) -> Option<&Invitation> {
        self.activation_invitation.as_ref()
    }

    pub fn reset_invitation(&self) -> Option<&Invitation> {
        self.reset_invitation.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Changes the login email; no event when unchanged
    pub fn set_login_email(
        &mut self,
        login_email: &str,
        performing_user_id: Option<UserId>,
    ) -> Result<(), PartyError> {
        validate_email(login_email)?;
        let login_email = login_email.to_lowercase();
        if login_email == self.login_email {
            return Ok(());
        }
        self.raise(UserEvent::LoginEmailSet { login_email }, performing_user_id)?;
        Ok(())
    }

    pub fn add_role(&mut self, role: &str, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        let role = normalise_role(role)?;
        if self.has_role(&role) {
            return Err(PartyError::DuplicateRole(role));
        }
        self.raise(UserEvent::RoleAdded { role }, performing_user_id)?;
        Ok(())
    }

    pub fn retract_role(&mut self, role: &str, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        let role = normalise_role(role)?;
        if !self.has_role(&role) {
            return Err(PartyError::RoleNotAssigned(role));
        }
        self.raise(UserEvent::RoleRetracted { role }, performing_user_id)?;
        Ok(())
    }

    pub fn block(&mut self, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        if self.blocked {
            return Err(PartyError::AlreadyBlocked);
        }
        self.raise(UserEvent::UserBlocked, performing_user_id)?;
        Ok(())
    }

    pub fn unblock(&mut self, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        if !self.blocked {
            return Err(PartyError::NotBlocked);
        }
        self.raise(UserEvent::UserUnblocked, performing_user_id)?;
        Ok(())
    }

    pub fn create_activation_invitation(
        &mut self,
        now: DateTime<Utc>,
        performing_user_id: Option<UserId>,
    ) -> Result<InvitationId, PartyError> {
        if self.activated {
            return Err(PartyError::AlreadyActivated);
        }
        self.ensure_not_blocked()?;

        let invitation_id = InvitationId::new();
        self.raise(
            UserEvent::ActivationInvitationCreated {
                invitation_id,
                expires_at: now + Duration::days(INVITATION_VALIDITY_DAYS),
            },
            performing_user_id,
        )?;
        Ok(invitation_id)
    }

    /// Activates the account and sets its first password
    pub fn activate(
        &mut self,
        invitation_id: InvitationId,
        password: &str,
        hasher: &dyn PasswordHasher,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        if self.activated {
            return Err(PartyError::AlreadyActivated);
        }
        self.ensure_not_blocked()?;
        check_invitation(self.activation_invitation.as_ref(), invitation_id, now)?;
        validate_password(password).into_result()?;

        let password_hash = hasher.hash(password)?;
        let user_id = self.id;
        self.raise(
            UserEvent::UserActivated {
                invitation_id,
                password_hash,
            },
            Some(user_id),
        )?;
        Ok(())
    }

    pub fn create_password_reset_invitation(
        &mut self,
        now: DateTime<Utc>,
        performing_user_id: Option<UserId>,
    ) -> Result<InvitationId, PartyError> {
        if !self.activated {
            return Err(PartyError::NotActivated);
        }
        self.ensure_not_blocked()?;

        let invitation_id = InvitationId::new();
        self.raise(
            UserEvent::PasswordResetInvitationCreated {
                invitation_id,
                expires_at: now + Duration::days(INVITATION_VALIDITY_DAYS),
            },
            performing_user_id,
        )?;
        Ok(invitation_id)
    }

    pub fn reset_password(
        &mut self,
        invitation_id: InvitationId,
        password: &str,
        hasher: &dyn PasswordHasher,
        now: DateTime<Utc>,
    ) -> Result<(), PartyError> {
        if !self.activated {
            return Err(PartyError::NotActivated);
        }
        self.ensure_not_blocked()?;
        check_invitation(self.reset_invitation.as_ref(), invitation_id, now)?;
        validate_password(password).into_result()?;

        let password_hash = hasher.hash(password)?;
        let user_id = self.id;
        self.raise(
            UserEvent::PasswordChanged {
                invitation_id: Some(invitation_id),
                password_hash,
            },
            Some(user_id),
        )?;
        Ok(())
    }

    /// Changes the password of a signed-in user
    pub fn change_password(
        &mut self,
        current_password: &str,
        new_password: &str,
        hasher: &dyn PasswordHasher,
    ) -> Result<(), PartyError> {
        self.verify_login(current_password, hasher)?;
        validate_password(new_password).into_result()?;

        let password_hash = hasher.hash(new_password)?;
        let user_id = self.id;
        self.raise(
            UserEvent::PasswordChanged {
                invitation_id: None,
                password_hash,
            },
            Some(user_id),
        )?;
        Ok(())
    }

    /// Checks a login attempt without recording anything
    pub fn verify_login(&self, password: &str, hasher: &dyn PasswordHasher) -> Result<(), PartyError> {
        self.ensure_not_blocked()?;
        if !self.activated {
            return Err(PartyError::NotActivated);
        }
        let hash = self
            .password_hash
            .as_deref()
            .ok_or(PartyError::NotActivated)?;
        if hasher.verify(password, hash)? {
            Ok(())
        } else {
            Err(PartyError::InvalidCredentials)
        }
    }

    fn ensure_not_blocked(&self) -> Result<(), PartyError> {
        if self.blocked {
            return Err(PartyError::UserBlocked);
        }
        Ok(())
    }
}

fn normalise_role(role: &str) -> Result<String, PartyError> {
    let role = role.trim();
    if role.is_empty() {
        return Err(PartyError::invalid("role name must not be empty"));
    }
    Ok(role.to_string())
}

fn check_invitation(
    current: Option<&Invitation>,
    invitation_id: InvitationId,
    now: DateTime<Utc>,
) -> Result<(), PartyError> {
    match current {
        Some(invitation) if invitation.id == invitation_id => {
            if invitation.is_expired(now) {
                Err(PartyError::InvitationExpired)
            } else {
                Ok(())
            }
        }
        _ => Err(PartyError::InvitationNotFound(invitation_id.to_string())),
    }
}

impl EventSourced for UserAggregate {
    type Event = UserEvent;
    const AGGREGATE_TYPE: &'static str = "user";

    fn originate(envelope: &EventEnvelope<UserEvent>) -> Result<Self, AggregateError> {
        match &envelope.event {
            UserEvent::UserInitialized {
                organisation_id,
                person_id,
                login_email,
                roles,
            } => Ok(Self {
                id: UserId::from_uuid(envelope.aggregate_id),
                tenant_id: envelope.tenant_id,
                organisation_id: *organisation_id,
                person_id: *person_id,
                login_email: login_email.clone(),
                roles: roles.clone(),
                blocked: false,
                activated: false,
                password_hash: None,
                activation_invitation: None,
                reset_invitation: None,
                created_at: envelope.created_at,
                last_modified: envelope.created_at,
                stream: EventStream::new(),
            }),
            other => Err(AggregateError::NotAGenesisEvent {
                aggregate_type: Self::AGGREGATE_TYPE,
                event_type: other.event_type(),
            }),
        }
    }

    fn evolve(&mut self, envelope: &EventEnvelope<UserEvent>) -> Result<(), AggregateError> {
        match &envelope.event {
            UserEvent::UserInitialized { .. } => {
                return Err(AggregateError::UnexpectedGenesis {
                    aggregate_type: Self::AGGREGATE_TYPE,
                    event_type: "UserInitialized",
                });
            }
            UserEvent::LoginEmailSet { login_email } => self.login_email = login_email.clone(),
            UserEvent::RoleAdded { role } => self.roles.push(role.clone()),
            UserEvent::RoleRetracted { role } => {
                self.roles.retain(|r| !r.eq_ignore_ascii_case(role));
            }
            UserEvent::UserBlocked => self.blocked = true,
            UserEvent::UserUnblocked => self.blocked = false,
            UserEvent::ActivationInvitationCreated {
                invitation_id,
                expires_at,
            } => {
                self.activation_invitation = Some(Invitation {
                    id: *invitation_id,
                    created_at: envelope.created_at,
                    expires_at: *expires_at,
                });
            }
            UserEvent::UserActivated { password_hash, .. } => {
                self.activated = true;
                self.password_hash = Some(password_hash.clone());
                self.activation_invitation = None;
            }
            UserEvent::PasswordResetInvitationCreated {
                invitation_id,
                expires_at,
            } => {
                self.reset_invitation = Some(Invitation {
                    id: *invitation_id,
                    created_at: envelope.created_at,
                    expires_at: *expires_at,
                });
            }
            UserEvent::PasswordChanged {
                invitation_id,
                password_hash,
            } => {
                self.password_hash = Some(password_hash.clone());
                if invitation_id.is_some() {
                    self.reset_invitation = None;
                }
            }
        }
        self.last_modified = envelope.created_at;
        Ok(())
    }

    fn aggregate_id(&self) -> Uuid {
        *self.id.as_uuid()
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn stream(&self) -> &EventStream<UserEvent> {
        &self.stream
    }

    fn stream_mut(&mut self) -> &mut EventStream<UserEvent> {
        &mut self.stream
    }
}
