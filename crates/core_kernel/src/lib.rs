//! Core Kernel - Foundational types for the uBind platform
//!
//! This crate provides the building blocks used across all domain modules:
//! - Strongly-typed identifiers and the deployment environment
//! - Money types with precise decimal arithmetic
//! - Port traits and the shared port error type
//! - Event-sourcing primitives: events, streams, replay, the event store
//!   port, the typed aggregate repository and aggregate locking

pub mod money;
pub mod identifiers;
pub mod ports;
pub mod event_sourcing;
pub mod event_store;
pub mod locking;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use money::{Money, Currency, MoneyError, Rate};
pub use identifiers::{
    TenantId, OrganisationId, ProductId, QuoteAggregateId, QuoteId, QuoteVersionId,
    CustomerId, PersonId, UserId, InvitationId, UpdaterJobId, CorrelationId,
    DeploymentEnvironment,
};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
pub use event_sourcing::{AggregateError, DomainEvent, EventEnvelope, EventSourced, EventStream};
pub use event_store::{AggregateRepository, EventStore, StoredEvent};
pub use locking::{AggregateLockGuard, AggregateLockService, LockKey};
