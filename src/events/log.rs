use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::error::{EventError, EventResult};
use super::types::{EventId, FailoverEvent, FailoverOutcome};
use crate::model::{FailoverPhase, InstanceId, Strategy};

/// In-memory failover event log.
///
/// All mutation goes through this type so the one-open-event-per-instance
/// invariant holds under arbitrary signal interleavings: `open` is the only
/// way to create a row and it refuses while an open row exists for the same
/// instance.
#[derive(Default)]
pub struct FailoverLog {
    inner: RwLock<LogInner>,
}

#[derive(Default)]
struct LogInner {
    events: Vec<FailoverEvent>,
    by_id: HashMap<EventId, usize>,
    open_by_instance: HashMap<InstanceId, EventId>,
}

impl FailoverLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new event for `instance`, failing if one is already open.
    pub fn open(
        &self,
        instance: InstanceId,
        strategy: Strategy,
        detected_at: DateTime<Utc>,
    ) -> EventResult<EventId> {
        let mut inner = self.inner.write();

        if let Some(open) = inner.open_by_instance.get(&instance) {
            return Err(EventError::AlreadyOpen {
                instance,
                open: *open,
            });
        }

        let id = EventId::generate();
        let event = FailoverEvent {
            id,
            instance: instance.clone(),
            strategy,
            detected_at,
            activated_at: None,
            restored_at: None,
            phase: FailoverPhase::Degraded,
            outcome: None,
            error_detail: None,
            annotations: Vec::new(),
            sync_errors: 0,
            coalesced_signals: 0,
        };

        let idx = inner.events.len();
        inner.events.push(event);
        inner.by_id.insert(id, idx);
        inner.open_by_instance.insert(instance.clone(), id);

        debug!(%instance, event = %id, "opened failover event");
        Ok(id)
    }

    /// Records a phase transition on an open event.
    ///
    /// Reaching `ActiveOnStandby` stamps `activated_at`, clamped to
    /// `detected_at` so the ordering invariant survives clock skew.
    pub fn record_phase(&self, id: EventId, phase: FailoverPhase) -> EventResult<()> {
        self.with_open_event(id, |event| {
            event.phase = phase;
            if phase == FailoverPhase::ActiveOnStandby && event.activated_at.is_none() {
                let now = Utc::now();
                event.activated_at = Some(now.max(event.detected_at));
            }
        })
    }

    /// Records the strategy actually in use (set once more on fallback).
    pub fn record_strategy(&self, id: EventId, strategy: Strategy) -> EventResult<()> {
        self.with_open_event(id, |event| event.strategy = strategy)
    }

    pub fn record_error_detail(&self, id: EventId, detail: impl Into<String>) -> EventResult<()> {
        let detail = detail.into();
        self.with_open_event(id, |event| event.error_detail = Some(detail))
    }

    pub fn annotate(&self, id: EventId, marker: impl Into<String>) -> EventResult<()> {
        let marker = marker.into();
        self.with_open_event(id, |event| {
            if !event.annotations.iter().any(|a| *a == marker) {
                event.annotations.push(marker);
            }
        })
    }

    pub fn record_sync_error(&self, id: EventId) -> EventResult<()> {
        self.with_open_event(id, |event| event.sync_errors += 1)
    }

    pub fn record_coalesced(&self, id: EventId) -> EventResult<()> {
        self.with_open_event(id, |event| event.coalesced_signals += 1)
    }

    /// Closes the event: stamps `restored_at`, sets the outcome, and frees
    /// the instance for a future workflow.
    pub fn close(
        &self,
        id: EventId,
        outcome: FailoverOutcome,
        error_detail: Option<String>,
    ) -> EventResult<()> {
        let mut inner = self.inner.write();
        let idx = *inner.by_id.get(&id).ok_or(EventError::UnknownEvent(id))?;

        let event = &mut inner.events[idx];
        if event.outcome.is_some() {
            return Err(EventError::AlreadyClosed(id));
        }

        let now = Utc::now();
        event.restored_at = Some(now.max(event.detected_at));
        event.outcome = Some(outcome);
        if error_detail.is_some() {
            event.error_detail = error_detail;
        }
        let instance = event.instance.clone();
        inner.open_by_instance.remove(&instance);

        debug!(%instance, event = %id, outcome = %outcome, "closed failover event");
        Ok(())
    }

    /// The open event for `instance`, if any.
    pub fn open_event(&self, instance: &InstanceId) -> Option<FailoverEvent> {
        let inner = self.inner.read();
        let id = inner.open_by_instance.get(instance)?;
        let idx = *inner.by_id.get(id)?;
        Some(inner.events[idx].clone())
    }

    pub fn get(&self, id: EventId) -> Option<FailoverEvent> {
        let inner = self.inner.read();
        let idx = *inner.by_id.get(&id)?;
        Some(inner.events[idx].clone())
    }

    /// Every event, open and closed, oldest first.
    pub fn events(&self) -> Vec<FailoverEvent> {
        self.inner.read().events.clone()
    }

    /// All closed events, oldest first.
    pub fn closed_events(&self) -> Vec<FailoverEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| !e.is_open())
            .cloned()
            .collect()
    }

    /// Every event for one instance, oldest first.
    pub fn events_for(&self, instance: &InstanceId) -> Vec<FailoverEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| &e.instance == instance)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }

    fn with_open_event<F>(&self, id: EventId, f: F) -> EventResult<()>
    where
        F: FnOnce(&mut FailoverEvent),
    {
        let mut inner = self.inner.write();
        let idx = *inner.by_id.get(&id).ok_or(EventError::UnknownEvent(id))?;
        let event = &mut inner.events[idx];
        if event.outcome.is_some() {
            return Err(EventError::AlreadyClosed(id));
        }
        f(event);
        Ok(())
    }
}
