//! Event-sourcing primitives
//!
//! Aggregates are rebuilt by replaying their event stream in sequence
//! order. New events are raised against live state, applied immediately and
//! queued as uncommitted until the repository appends them.
//!
//! # Sequence numbers
//!
//! ```text
//! seq:      0            1             2           3
//!        genesis ──▶ evolve ──▶ evolve ──▶ evolve
//!        (originate)
//! version = number of events = next sequence number
//! ```
//!
//! The persisted version doubles as the expected version for optimistic
//! concurrency: an append only succeeds when the stored stream still ends
//! where this aggregate instance last saw it.
//!
//! # Rollback
//!
//! An event may declare itself a rollback to sequence `n`. On replay, every
//! effective event with a sequence greater than `n` recorded before the
//! rollback is discarded. The rollback event itself never reaches
//! `evolve`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;
use uuid::Uuid;

use crate::identifiers::{TenantId, UserId};

/// Behaviour shared by every domain event type
pub trait DomainEvent: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable name persisted next to the payload
    fn event_type(&self) -> &'static str;

    /// The sequence number this event rolls the aggregate back to, if any
    fn rollback_target(&self) -> Option<u64> {
        None
    }
}

/// Errors raised while applying or replaying events
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("Cannot replay an empty event stream")]
    EmptyHistory,

    #[error("{aggregate_type} cannot be created from {event_type}")]
    NotAGenesisEvent {
        aggregate_type: &'static str,
        event_type: &'static str,
    },

    #[error("{aggregate_type} already exists; {event_type} is only valid as the first event")]
    UnexpectedGenesis {
        aggregate_type: &'static str,
        event_type: &'static str,
    },

    #[error("Sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("Invalid rollback to sequence {target} at version {version}")]
    InvalidRollback { target: u64, version: u64 },

    #[error("Event {event_type} refers to unknown entity {entity_id}")]
    UnknownEntity {
        event_type: &'static str,
        entity_id: String,
    },
}

/// An event together with the metadata it is stored under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    pub tenant_id: TenantId,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub performing_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub event: E,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        tenant_id: TenantId,
        aggregate_id: Uuid,
        aggregate_type: &str,
        sequence_number: u64,
        performing_user_id: Option<UserId>,
        event: E,
    ) -> Self {
        Self {
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            sequence_number,
            performing_user_id,
            created_at: Utc::now(),
            event,
        }
    }
}

/// Persisted/uncommitted bookkeeping carried inside every aggregate
#[derive(Debug, Clone)]
pub struct EventStream<E> {
    persisted: u64,
    uncommitted: Vec<EventEnvelope<E>>,
}

impl<E> Default for EventStream<E> {
    fn default() -> Self {
        Self {
            persisted: 0,
            uncommitted: Vec::new(),
        }
    }
}

impl<E> EventStream<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events, persisted or not
    pub fn version(&self) -> u64 {
        self.persisted + self.uncommitted.len() as u64
    }

    /// Number of events known to be in the store
    pub fn persisted_version(&self) -> u64 {
        self.persisted
    }

    pub fn uncommitted(&self) -> &[EventEnvelope<E>] {
        &self.uncommitted
    }

    pub fn has_uncommitted(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    pub(crate) fn push(&mut self, envelope: EventEnvelope<E>) {
        self.uncommitted.push(envelope);
    }

    pub(crate) fn set_persisted(&mut self, persisted: u64) {
        self.persisted = persisted;
        self.uncommitted.clear();
    }

    /// Marks all uncommitted events as stored and returns them
    pub fn commit(&mut self) -> Vec<EventEnvelope<E>> {
        let committed = std::mem::take(&mut self.uncommitted);
        self.persisted += committed.len() as u64;
        committed
    }
}

/// An aggregate whose state is derived from its events
///
/// Implementors provide the event-side hooks (`originate`, `evolve`) and
/// access to their [`EventStream`]; command methods on the aggregate call
/// [`EventSourced::raise`] to record facts.
pub trait EventSourced: Sized + Send + Sync {
    type Event: DomainEvent;

    /// Stable aggregate type name. Must not change once events are stored.
    const AGGREGATE_TYPE: &'static str;

    /// Builds initial state from the genesis event
    fn originate(envelope: &EventEnvelope<Self::Event>) -> Result<Self, AggregateError>;

    /// Applies a subsequent event to existing state
    fn evolve(&mut self, envelope: &EventEnvelope<Self::Event>) -> Result<(), AggregateError>;

    fn aggregate_id(&self) -> Uuid;

    fn tenant_id(&self) -> TenantId;

    fn stream(&self) -> &EventStream<Self::Event>;

    fn stream_mut(&mut self) -> &mut EventStream<Self::Event>;

    fn version(&self) -> u64 {
        self.stream().version()
    }

    fn persisted_version(&self) -> u64 {
        self.stream().persisted_version()
    }

    /// Creates a new aggregate from its genesis event (sequence 0)
    fn create(
        tenant_id: TenantId,
        aggregate_id: Uuid,
        event: Self::Event,
        performing_user_id: Option<UserId>,
    ) -> Result<Self, AggregateError> {
        let envelope = EventEnvelope::new(
            tenant_id,
            aggregate_id,
            Self::AGGREGATE_TYPE,
            0,
            performing_user_id,
            event,
        );
        let mut aggregate = Self::originate(&envelope)?;
        aggregate.stream_mut().push(envelope);
        Ok(aggregate)
    }

    /// Applies a new event to live state and queues it for persistence
    fn raise(
        &mut self,
        event: Self::Event,
        performing_user_id: Option<UserId>,
    ) -> Result<(), AggregateError> {
        let envelope = EventEnvelope::new(
            self.tenant_id(),
            self.aggregate_id(),
            Self::AGGREGATE_TYPE,
            self.version(),
            performing_user_id,
            event,
        );
        if envelope.event.rollback_target().is_none() {
            self.evolve(&envelope)?;
        }
        self.stream_mut().push(envelope);
        Ok(())
    }

    /// Rebuilds an aggregate from its full, ordered history
    fn replay(history: Vec<EventEnvelope<Self::Event>>) -> Result<Self, AggregateError> {
        let total = history.len() as u64;
        let effective = effective_events(history)?;

        let mut events = effective.iter();
        let genesis = events.next().ok_or(AggregateError::EmptyHistory)?;
        let mut aggregate = Self::originate(genesis)?;
        for envelope in events {
            aggregate.evolve(envelope)?;
        }

        aggregate.stream_mut().set_persisted(total);
        Ok(aggregate)
    }

    /// Records a rollback; live state is stale until the aggregate is reloaded
    fn rollback_event_allowed(&self, target: u64) -> Result<(), AggregateError> {
        if target >= self.version().saturating_sub(1) {
            return Err(AggregateError::InvalidRollback {
                target,
                version: self.version(),
            });
        }
        Ok(())
    }
}

/// Resolves rollbacks and checks sequence ordering
///
/// Returns the events that contribute to current state, in order.
pub fn effective_events<E: DomainEvent>(
    history: Vec<EventEnvelope<E>>,
) -> Result<Vec<EventEnvelope<E>>, AggregateError> {
    let mut effective: Vec<EventEnvelope<E>> = Vec::with_capacity(history.len());

    for (expected, envelope) in history.into_iter().enumerate() {
        let expected = expected as u64;
        if envelope.sequence_number != expected {
            return Err(AggregateError::SequenceGap {
                expected,
                found: envelope.sequence_number,
            });
        }

        match envelope.event.rollback_target() {
            Some(target) if target >= envelope.sequence_number => {
                return Err(AggregateError::InvalidRollback {
                    target,
                    version: envelope.sequence_number,
                });
            }
            Some(target) => effective.retain(|e| e.sequence_number <= target),
            None => effective.push(envelope),
        }
    }

    Ok(effective)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum CounterEvent {
        Opened { start: i64 },
        Added { amount: i64 },
        RolledBack { to: u64 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "Opened",
                CounterEvent::Added { .. } => "Added",
                CounterEvent::RolledBack { .. } => "RolledBack",
            }
        }

        fn rollback_target(&self) -> Option<u64> {
            match self {
                CounterEvent::RolledBack { to } => Some(*to),
                _ => None,
            }
        }
    }

    #[derive(Debug)]
    pub struct Counter {
        pub id: Uuid,
        pub tenant_id: TenantId,
        pub value: i64,
        pub stream: EventStream<CounterEvent>,
    }

    impl EventSourced for Counter {
        type Event = CounterEvent;
        const AGGREGATE_TYPE: &'static str = "counter";

        fn originate(envelope: &EventEnvelope<CounterEvent>) -> Result<Self, AggregateError> {
            match &envelope.event {
                CounterEvent::Opened { start } => Ok(Counter {
                    id: envelope.aggregate_id,
                    tenant_id: envelope.tenant_id,
                    value: *start,
                    stream: EventStream::new(),
                }),
                other => Err(AggregateError::NotAGenesisEvent {
                    aggregate_type: Self::AGGREGATE_TYPE,
                    event_type: other.event_type(),
                }),
            }
        }

        fn evolve(&mut self, envelope: &EventEnvelope<CounterEvent>) -> Result<(), AggregateError> {
            match &envelope.event {
                CounterEvent::Added { amount } => self.value += amount,
                CounterEvent::RolledBack { .. } => {}
                CounterEvent::Opened { .. } => {
                    return Err(AggregateError::UnexpectedGenesis {
                        aggregate_type: Self::AGGREGATE_TYPE,
                        event_type: "Opened",
                    })
                }
            }
            Ok(())
        }

        fn aggregate_id(&self) -> Uuid {
            self.id
        }

        fn tenant_id(&self) -> TenantId {
            self.tenant_id
        }

        fn stream(&self) -> &EventStream<CounterEvent> {
            &self.stream
        }

        fn stream_mut(&mut self) -> &mut EventStream<CounterEvent> {
            &mut self.stream
        }
    }

    pub fn history_of(events: Vec<CounterEvent>) -> Vec<EventEnvelope<CounterEvent>> {
        let tenant = TenantId::new();
        let id = Uuid::new_v4();
        events
            .into_iter()
            .enumerate()
            .map(|(i, e)| EventEnvelope::new(tenant, id, "counter", i as u64, None, e))
            .collect()
    }

    #[test]
    fn test_raise_assigns_next_sequence() {
        let mut counter =
            Counter::create(TenantId::new(), Uuid::new_v4(), CounterEvent::Opened { start: 1 }, None)
                .unwrap();
        counter.raise(CounterEvent::Added { amount: 4 }, None).unwrap();

        assert_eq!(counter.value, 5);
        assert_eq!(counter.version(), 2);
        assert_eq!(counter.persisted_version(), 0);
        assert_eq!(counter.stream().uncommitted()[1].sequence_number, 1);
    }

    #[test]
    fn test_replay_rebuilds_state_and_marks_persisted() {
        let history = history_of(vec![
            CounterEvent::Opened { start: 10 },
            CounterEvent::Added { amount: 5 },
            CounterEvent::Added { amount: -3 },
        ]);
        let counter = Counter::replay(history).unwrap();

        assert_eq!(counter.value, 12);
        assert_eq!(counter.version(), 3);
        assert_eq!(counter.persisted_version(), 3);
        assert!(!counter.stream().has_uncommitted());
    }

    #[test]
    fn test_replay_rejects_sequence_gap() {
        let mut history = history_of(vec![
            CounterEvent::Opened { start: 0 },
            CounterEvent::Added { amount: 1 },
        ]);
        history[1].sequence_number = 3;

        let result = Counter::replay(history);
        assert_eq!(
            result.err(),
            Some(AggregateError::SequenceGap { expected: 1, found: 3 })
        );
    }

    #[test]
    fn test_replay_requires_genesis_first() {
        let history = history_of(vec![CounterEvent::Added { amount: 1 }]);
        assert!(matches!(
            Counter::replay(history),
            Err(AggregateError::NotAGenesisEvent { .. })
        ));
    }

    #[test]
    fn test_rollback_discards_later_events() {
        let history = history_of(vec![
            CounterEvent::Opened { start: 0 },
            CounterEvent::Added { amount: 1 },
            CounterEvent::Added { amount: 10 },
            CounterEvent::Added { amount: 100 },
            CounterEvent::RolledBack { to: 1 },
            CounterEvent::Added { amount: 1000 },
        ]);
        let counter = Counter::replay(history).unwrap();

        assert_eq!(counter.value, 1001);
        assert_eq!(counter.version(), 6);
    }

    #[test]
    fn test_rollback_to_future_sequence_is_rejected() {
        let history = history_of(vec![
            CounterEvent::Opened { start: 0 },
            CounterEvent::RolledBack { to: 1 },
        ]);
        assert!(matches!(
            Counter::replay(history),
            Err(AggregateError::InvalidRollback { .. })
        ));
    }

    #[test]
    fn test_rollback_allowed_only_when_events_are_discarded() {
        let mut counter =
            Counter::create(TenantId::new(), Uuid::new_v4(), CounterEvent::Opened { start: 0 }, None)
                .unwrap();
        counter.raise(CounterEvent::Added { amount: 1 }, None).unwrap();

        assert!(counter.rollback_event_allowed(0).is_ok());
        assert!(counter.rollback_event_allowed(1).is_err());
    }

    #[test]
    fn test_rollback_beyond_the_stream_is_rejected() {
        let mut counter =
            Counter::create(TenantId::new(), Uuid::new_v4(), CounterEvent::Opened { start: 0 }, None)
                .unwrap();
        counter.raise(CounterEvent::Added { amount: 1 }, None).unwrap();

        let version = counter.version();
        assert!(counter.rollback_event_allowed(version).is_err());
        assert!(counter.rollback_event_allowed(u64::MAX).is_err());
    }

    #[test]
    fn test_rollback_on_genesis_only_stream_is_rejected() {
        let counter =
            Counter::create(TenantId::new(), Uuid::new_v4(), CounterEvent::Opened { start: 0 }, None)
                .unwrap();
        assert!(counter.rollback_event_allowed(0).is_err());
    }

    #[test]
    fn test_commit_moves_events_to_persisted() {
        let mut counter =
            Counter::create(TenantId::new(), Uuid::new_v4(), CounterEvent::Opened { start: 0 }, None)
                .unwrap();
        let committed = counter.stream_mut().commit();

        assert_eq!(committed.len(), 1);
        assert_eq!(counter.persisted_version(), 1);
        assert_eq!(counter.version(), 1);
    }
}
