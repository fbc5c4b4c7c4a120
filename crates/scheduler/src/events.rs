//! Ad-break event store. Rows are written once at serve time and updated at
//! most once with a terminal outcome; the transition is conditioned on the
//! current state under the entry lock, which is what makes outcome
//! recording idempotent.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use streamcast_core::error::RecordError;
use streamcast_core::types::{AdBreakEvent, AdOutcome};

/// What a terminal-outcome write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeTransition {
    /// First terminal recording for this event; campaign counters should
    /// be applied exactly once, now.
    Applied { campaign_id: Uuid },
    /// The same terminal outcome was already recorded; no-op.
    Duplicate,
}

pub struct AdBreakEventStore {
    /// event_id -> event
    events: DashMap<Uuid, AdBreakEvent>,
}

impl AdBreakEventStore {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
        }
    }

    pub fn insert(&self, event: AdBreakEvent) {
        self.events.insert(event.event_id, event);
    }

    pub fn get(&self, event_id: &Uuid) -> Option<AdBreakEvent> {
        self.events.get(event_id).map(|r| r.clone())
    }

    /// Record a terminal outcome. First write wins: a repeat of the same
    /// outcome is a `Duplicate`, a different outcome after a terminal one
    /// is an `OutcomeConflict`.
    pub fn record_outcome(
        &self,
        event_id: &Uuid,
        outcome: AdOutcome,
        at: DateTime<Utc>,
    ) -> Result<OutcomeTransition, RecordError> {
        debug_assert!(outcome.is_terminal());

        let mut event = self
            .events
            .get_mut(event_id)
            .ok_or(RecordError::UnknownEvent)?;

        if event.outcome == AdOutcome::Served {
            event.outcome = outcome;
            event.outcome_at = Some(at);
            return Ok(OutcomeTransition::Applied {
                campaign_id: event.campaign_id,
            });
        }
        if event.outcome == outcome {
            return Ok(OutcomeTransition::Duplicate);
        }
        Err(RecordError::OutcomeConflict)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for AdBreakEventStore {
    fn default() -> Self {
        Self::new()
    }
}
