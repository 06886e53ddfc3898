//! Person aggregate
//!
//! A person belongs to an organisation and may be linked to at most one
//! user account. Customers and staff users are both backed by a person.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{
    AggregateError, DomainEvent, EventEnvelope, EventSourced, EventStream, OrganisationId,
    PersonId, TenantId, UserId,
};

use crate::error::PartyError;
use crate::events::PersonEvent;
use crate::validation::is_valid_phone;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Validate)]
pub struct PersonDetails {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub full_name: String,
    pub preferred_name: Option<String>,
    #[validate(email(message = "is not a valid email address"))]
    pub email: Option<String>,
    pub mobile_phone: Option<String>,
    pub company: Option<String>,
}

impl PersonDetails {
    pub fn named(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Name to address the person by
    pub fn display_name(&self) -> &str {
        self.preferred_name.as_deref().unwrap_or(&self.full_name)
    }

    pub fn check(&self) -> Result<(), PartyError> {
        self.validate()?;
        if let Some(phone) = &self.mobile_phone {
            if !is_valid_phone(phone) {
                return Err(PartyError::validation_failed(vec![format!(
                    "mobile_phone: '{}' is not a valid phone number",
                    phone
                )]));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PersonAggregate {
    id: PersonId,
    tenant_id: TenantId,
    organisation_id: OrganisationId,
    details: PersonDetails,
    user_id: Option<UserId>,
    deleted: bool,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    stream: EventStream<PersonEvent>,
}

impl PersonAggregate {
    pub fn create(
        tenant_id: TenantId,
        person_id: PersonId,
        organisation_id: OrganisationId,
        details: PersonDetails,
        performing_user_id: Option<UserId>,
    ) -> Result<Self, PartyError> {
        details.check()?;
        let aggregate = <Self as EventSourced>::create(
            tenant_id,
            *person_id.as_uuid(),
            PersonEvent::PersonInitialized {
                organisation_id,
                details,
            },
            performing_user_id,
        )?;
        Ok(aggregate)
    }

    pub fn id(&self) -> PersonId {
        self.id
    }

    pub fn organisation_id(&self) -> OrganisationId {
        self.organisation_id
    }

    pub fn details(&self) -> &PersonDetails {
        &self.details
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Replaces the details; no event when nothing changed
    pub fn update_details(
        &mut self,
        details: PersonDetails,
        performing_user_id: Option<UserId>,
    ) -> Result<(), PartyError> {
        self.ensure_not_deleted()?;
        details.check()?;
        if details == self.details {
            return Ok(());
        }
        self.raise(PersonEvent::PersonDetailsUpdated { details }, performing_user_id)?;
        Ok(())
    }

    pub fn link_user_account(
        &mut self,
        user_id: UserId,
        performing_user_id: Option<UserId>,
    ) -> Result<(), PartyError> {
        self.ensure_not_deleted()?;
        if let Some(existing) = self.user_id {
            return Err(PartyError::AlreadyLinked(existing.to_string()));
        }
        self.raise(PersonEvent::PersonUserAccountLinked { user_id }, performing_user_id)?;
        Ok(())
    }

    pub fn delete(&mut self, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        self.ensure_not_deleted()?;
        self.raise(PersonEvent::PersonDeleted, performing_user_id)?;
        Ok(())
    }

    fn ensure_not_deleted(&self) -> Result<(), PartyError> {
        if self.deleted {
            return Err(PartyError::PersonDeleted);
        }
        Ok(())
    }
}

impl EventSourced for PersonAggregate {
    type Event = PersonEvent;
    const AGGREGATE_TYPE: &'static str = "person";

    fn originate(envelope: &EventEnvelope<PersonEvent>) -> Result<Self, AggregateError> {
        match &envelope.event {
            PersonEvent::PersonInitialized {
                organisation_id,
                details,
            } => Ok(Self {
                id: PersonId::from_uuid(envelope.aggregate_id),
                tenant_id: envelope.tenant_id,
                organisation_id: *organisation_id,
                details: details.clone(),
                user_id: None,
                deleted: false,
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

    fn evolve(&mut self, envelope: &EventEnvelope<PersonEvent>) -> Result<(), AggregateError> {
        match &envelope.event {
            PersonEvent::PersonInitialized { .. } => {
                return Err(AggregateError::UnexpectedGenesis {
                    aggregate_type: Self::AGGREGATE_TYPE,
                    event_type: "PersonInitialized",
                });
            }
            PersonEvent::PersonDetailsUpdated { details } => self.details = details.clone(),
            PersonEvent::PersonUserAccountLinked { user_id } => self.user_id = Some(*user_id),
            PersonEvent::PersonDeleted => self.deleted = true,
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

    fn stream(&self) -> &EventStream<PersonEvent> {
        &self.stream
    }

    fn stream_mut(&mut self) -> &mut EventStream<PersonEvent> {
        &mut self.stream
    }
}
