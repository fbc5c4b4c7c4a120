//! Interaction recorder — applies a viewer's terminal outcome (viewed,
//! clicked, skipped) to an ad-break event and settles the billing side
//! effects exactly once per event.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use streamcast_core::clock::Clock;
use streamcast_core::error::RecordError;
use streamcast_core::types::AdOutcome;
use streamcast_inventory::AdInventory;

use crate::events::{AdBreakEventStore, OutcomeTransition};

pub struct InteractionRecorder {
    events: Arc<AdBreakEventStore>,
    inventory: Arc<AdInventory>,
    clock: Arc<dyn Clock>,
    cost_per_click: f64,
}

impl InteractionRecorder {
    pub fn new(
        events: Arc<AdBreakEventStore>,
        inventory: Arc<AdInventory>,
        clock: Arc<dyn Clock>,
        cost_per_click: f64,
    ) -> Self {
        Self {
            events,
            inventory,
            clock,
            cost_per_click,
        }
    }

    /// Record a terminal outcome against an event. Idempotent: repeating
    /// the same outcome acks without touching any counter; a different
    /// outcome after a terminal one is a conflict (first write wins). A
    /// click charges the configured cost per click against the campaign,
    /// clamped at the remaining budget (`charge_click` pauses the campaign
    /// on exhaustion).
    pub fn record_outcome(&self, event_id: &Uuid, outcome: AdOutcome) -> Result<(), RecordError> {
        if !outcome.is_terminal() {
            return Err(RecordError::OutcomeConflict);
        }

        match self.events.record_outcome(event_id, outcome, self.clock.now())? {
            OutcomeTransition::Duplicate => Ok(()),
            OutcomeTransition::Applied { campaign_id } => {
                match outcome {
                    AdOutcome::Clicked => {
                        match self.inventory.charge_click(&campaign_id, self.cost_per_click) {
                            Some(result) => {
                                if result.paused {
                                    info!(
                                        campaign_id = %campaign_id,
                                        charged = result.charged,
                                        "Click exhausted campaign budget"
                                    );
                                }
                            }
                            None => {
                                // Event outlived its campaign; the outcome
                                // stays recorded, the charge is dropped.
                                warn!(
                                    campaign_id = %campaign_id,
                                    event_id = %event_id,
                                    "Click recorded for unknown campaign"
                                );
                            }
                        }
                        metrics::counter!("recorder.clicks").increment(1);
                    }
                    AdOutcome::Viewed => {
                        metrics::counter!("recorder.views").increment(1);
                    }
                    AdOutcome::Skipped => {
                        metrics::counter!("recorder.skips").increment(1);
                    }
                    AdOutcome::Served => unreachable!("non-terminal outcome rejected above"),
                }
                Ok(())
            }
        }
    }
}
