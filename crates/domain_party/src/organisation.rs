//! Organisation aggregate
//!
//! Organisations group users, persons and quotes within a tenant. The
//! alias is the URL-safe handle portals are addressed by; its uniqueness
//! within the tenant is enforced by the application layer.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use core_kernel::{
    AggregateError, DomainEvent, EventEnvelope, EventSourced, EventStream, OrganisationId,
    TenantId, UserId,
};

use crate::error::PartyError;
use crate::events::OrganisationEvent;
use crate::validation::{validate_alias, validate_name};

#[derive(Debug, Clone)]
pub struct OrganisationAggregate {
    id: OrganisationId,
    tenant_id: TenantId,
    name: String,
    alias: String,
    active: bool,
    deleted: bool,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    stream: EventStream<OrganisationEvent>,
}

impl OrganisationAggregate {
    pub fn create(
        tenant_id: TenantId,
        organisation_id: OrganisationId,
        name: &str,
        alias: &str,
        performing_user_id: Option<UserId>,
    ) -> Result<Self, PartyError> {
        let mut result = validate_name("name", name);
        result.merge(validate_alias(alias));
        result.into_result()?;

        let aggregate = <Self as EventSourced>::create(
            tenant_id,
            *organisation_id.as_uuid(),
            OrganisationEvent::OrganisationInitialized {
                name: name.trim().to_string(),
                alias: alias.to_string(),
            },
            performing_user_id,
        )?;
        Ok(aggregate)
    }

    pub fn id(&self) -> OrganisationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn is_active(&self) -> bool {
        self.active
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

    /// Renames the organisation; no event when unchanged
    pub fn rename(&mut self, name: &str, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        self.ensure_not_deleted()?;
        validate_name("name", name).into_result()?;
        let name = name.trim().to_string();
        if name == self.name {
            return Ok(());
        }
        self.raise(OrganisationEvent::OrganisationNameUpdated { name }, performing_user_id)?;
        Ok(())
    }

    pub fn change_alias(&mut self, alias: &str, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        self.ensure_not_deleted()?;
        validate_alias(alias).into_result()?;
        if alias == self.alias {
            return Ok(());
        }
        self.raise(
            OrganisationEvent::OrganisationAliasUpdated {
                alias: alias.to_string(),
            },
            performing_user_id,
        )?;
        Ok(())
    }

    pub fn disable(&mut self, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        self.ensure_not_deleted()?;
        if !self.active {
            return Err(PartyError::AlreadyDisabled);
        }
        self.raise(OrganisationEvent::OrganisationDisabled, performing_user_id)?;
        Ok(())
    }

    pub fn activate(&mut self, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        self.ensure_not_deleted()?;
        if self.active {
            return Err(PartyError::AlreadyActive);
        }
        self.raise(OrganisationEvent::OrganisationActivated, performing_user_id)?;
        Ok(())
    }

    pub fn delete(&mut self, performing_user_id: Option<UserId>) -> Result<(), PartyError> {
        self.ensure_not_deleted()?;
        self.raise(OrganisationEvent::OrganisationDeleted, performing_user_id)?;
        Ok(())
    }

    fn ensure_not_deleted(&self) -> Result<(), PartyError> {
        if self.deleted {
            return Err(PartyError::OrganisationDeleted);
        }
        Ok(())
    }
}

impl EventSourced for OrganisationAggregate {
    type Event = OrganisationEvent;
    const AGGREGATE_TYPE: &'static str = "organisation";

    fn originate(envelope: &EventEnvelope<OrganisationEvent>) -> Result<Self, AggregateError> {
        match &envelope.event {
            OrganisationEvent::OrganisationInitialized { name, alias } => Ok(Self {
                id: OrganisationId::from_uuid(envelope.aggregate_id),
                tenant_id: envelope.tenant_id,
                name: name.clone(),
                alias: alias.clone(),
                active: true,
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

    fn evolve(&mut self, envelope: &EventEnvelope<OrganisationEvent>) -> Result<(), AggregateError> {
        match &envelope.event {
            OrganisationEvent::OrganisationInitialized { .. } => {
                return Err(AggregateError::UnexpectedGenesis {
                    aggregate_type: Self::AGGREGATE_TYPE,
                    event_type: "OrganisationInitialized",
                });
            }
            OrganisationEvent::OrganisationNameUpdated { name } => self.name = name.clone(),
            OrganisationEvent::OrganisationAliasUpdated { alias } => self.alias = alias.clone(),
            OrganisationEvent::OrganisationDisabled => self.active = false,
            OrganisationEvent::OrganisationActivated => self.active = true,
            OrganisationEvent::OrganisationDeleted => {
                self.deleted = true;
                self.active = false;
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

    fn stream(&self) -> &EventStream<OrganisationEvent> {
        &self.stream
    }

    fn stream_mut(&mut self) -> &mut EventStream<OrganisationEvent> {
        &mut self.stream
    }
}
