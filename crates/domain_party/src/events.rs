//! Domain events of the party aggregates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{DomainEvent, InvitationId, OrganisationId, PersonId, UserId};

use crate::person::PersonDetails;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersonEvent {
    PersonInitialized {
        organisation_id: OrganisationId,
        details: PersonDetails,
    },
    PersonDetailsUpdated {
        details: PersonDetails,
    },
    PersonUserAccountLinked {
        user_id: UserId,
    },
    PersonDeleted,
}

impl DomainEvent for PersonEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PersonEvent::PersonInitialized { .. } => "PersonInitialized",
            PersonEvent::PersonDetailsUpdated { .. } => "PersonDetailsUpdated",
            PersonEvent::PersonUserAccountLinked { .. } => "PersonUserAccountLinked",
            PersonEvent::PersonDeleted => "PersonDeleted",
        }
    }
}

/// Events of a user account
///
/// Password hashes are stored, never plain passwords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UserEvent {
    UserInitialized {
        organisation_id: OrganisationId,
        person_id: PersonId,
        login_email: String,
        roles: Vec<String>,
    },
    LoginEmailSet {
        login_email: String,
    },
    RoleAdded {
        role: String,
    },
    RoleRetracted {
        role: String,
    },
    UserBlocked,
    UserUnblocked,
    ActivationInvitationCreated {
        invitation_id: InvitationId,
        expires_at: DateTime<Utc>,
    },
    UserActivated {
        invitation_id: InvitationId,
        password_hash: String,
    },
    PasswordResetInvitationCreated {
        invitation_id: InvitationId,
        expires_at: DateTime<Utc>,
    },
    /// A reset through an invitation, or a change by the user themself
    PasswordChanged {
        invitation_id: Option<InvitationId>,
        password_hash: String,
    },
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserInitialized { .. } => "UserInitialized",
            UserEvent::LoginEmailSet { .. } => "LoginEmailSet",
            UserEvent::RoleAdded { .. } => "RoleAdded",
            UserEvent::RoleRetracted { .. } => "RoleRetracted",
            UserEvent::UserBlocked => "UserBlocked",
            UserEvent::UserUnblocked => "UserUnblocked",
            UserEvent::ActivationInvitationCreated { .. } => "ActivationInvitationCreated",
            UserEvent::UserActivated { .. } => "UserActivated",
            UserEvent::PasswordResetInvitationCreated { .. } => "PasswordResetInvitationCreated",
            UserEvent::PasswordChanged { .. } => "PasswordChanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrganisationEvent {
    OrganisationInitialized { name: String, alias: String },
    OrganisationNameUpdated { name: String },
    OrganisationAliasUpdated { alias: String },
    OrganisationDisabled,
    OrganisationActivated,
    OrganisationDeleted,
}

impl DomainEvent for OrganisationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrganisationEvent::OrganisationInitialized { .. } => "OrganisationInitialized",
            OrganisationEvent::OrganisationNameUpdated { .. } => "OrganisationNameUpdated",
            OrganisationEvent::OrganisationAliasUpdated { .. } => "OrganisationAliasUpdated",
            OrganisationEvent::OrganisationDisabled => "OrganisationDisabled",
            OrganisationEvent::OrganisationActivated => "OrganisationActivated",
            OrganisationEvent::OrganisationDeleted => "OrganisationDeleted",
        }
    }
}
