//! Ad-break scheduler — decides when to interrupt a viewing session with an
//! ad and which campaign to play. The timing policy is per session: a free
//! viewing allowance before the first break, then a minimum inter-ad
//! interval between breaks.

use chrono::Duration;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use streamcast_core::clock::Clock;
use streamcast_core::error::ScheduleError;
use streamcast_core::types::{AdBreakEvent, AdCampaign, AdOutcome, ServedAd};
use streamcast_inventory::AdInventory;
use streamcast_session::SessionStore;

use crate::events::AdBreakEventStore;

/// A successfully inserted break: the auditable event row plus the payload
/// handed to the viewer client.
#[derive(Debug, Clone)]
pub struct ServedBreak {
    pub event: AdBreakEvent,
    pub ad: ServedAd,
}

pub struct AdBreakScheduler {
    sessions: Arc<SessionStore>,
    inventory: Arc<AdInventory>,
    events: Arc<AdBreakEventStore>,
    clock: Arc<dyn Clock>,
    liveness_threshold: Duration,
}

impl AdBreakScheduler {
    pub fn new(
        sessions: Arc<SessionStore>,
        inventory: Arc<AdInventory>,
        events: Arc<AdBreakEventStore>,
        clock: Arc<dyn Clock>,
        liveness_threshold_secs: u64,
    ) -> Self {
        Self {
            sessions,
            inventory,
            events,
            clock,
            liveness_threshold: Duration::seconds(liveness_threshold_secs as i64),
        }
    }

    /// Seconds until the next break window opens (0 when a break is due
    /// right now). `None` when the session is unknown or not effectively
    /// live.
    pub fn next_ad_in(&self, session_id: &Uuid) -> Option<u64> {
        let session = self.sessions.get(session_id)?;
        let now = self.clock.now();
        if !session.effectively_live(now, self.liveness_threshold) {
            return None;
        }

        let due_at = session.next_break_due_at()?;
        Some((due_at - now).num_seconds().max(0) as u64)
    }

    /// Whether a break should be inserted right now. Goes false again
    /// immediately after a break is triggered: `trigger_ad_break` stamps
    /// `last_ad_break_at`, which moves the next window out by the inter-ad
    /// interval.
    pub fn should_insert_ad(&self, session_id: &Uuid) -> bool {
        self.next_ad_in(session_id) == Some(0)
    }

    /// Scheduler-driven insertion for the polling path. The window check is
    /// re-evaluated under the session entry lock together with the
    /// `last_ad_break_at` stamp, so two pollers that both saw an open
    /// window serve at most once: the loser gets `BreakNotDue`.
    pub fn try_insert_ad(&self, session_id: &Uuid) -> Result<ServedBreak, ScheduleError> {
        self.insert_break(session_id, None, true)
    }

    /// Operator-initiated insertion. Bypasses the timing window; with no
    /// explicit campaign the eligibility filter and ranking pick one, an
    /// explicit campaign is validated for servability instead.
    pub fn trigger_ad_break(
        &self,
        session_id: &Uuid,
        explicit_campaign: Option<Uuid>,
    ) -> Result<ServedBreak, ScheduleError> {
        self.insert_break(session_id, explicit_campaign, false)
    }

    /// The campaign's impression counter is incremented exactly once, here
    /// at serve time, and only after the sequence stamp succeeded.
    fn insert_break(
        &self,
        session_id: &Uuid,
        explicit_campaign: Option<Uuid>,
        enforce_window: bool,
    ) -> Result<ServedBreak, ScheduleError> {
        let now = self.clock.now();
        let session = self
            .sessions
            .get(session_id)
            .ok_or(ScheduleError::UnknownSession)?;
        if !session.effectively_live(now, self.liveness_threshold) {
            return Err(ScheduleError::SessionNotLive);
        }

        let campaign: AdCampaign = match explicit_campaign {
            Some(cid) => {
                let c = self
                    .inventory
                    .get(&cid)
                    .ok_or(ScheduleError::CampaignNotServable)?;
                if !c.is_servable(now) {
                    return Err(ScheduleError::CampaignNotServable);
                }
                c
            }
            None => self
                .inventory
                .eligible(now, &session.audience)
                .into_iter()
                .next()
                .ok_or(ScheduleError::NoEligibleAd)?,
        };

        // Stamp and window check share one entry lock; a concurrent serve
        // that got there first moved `last_ad_break_at` and loses us the
        // window.
        let sequence = self
            .sessions
            .update(session_id, |s| {
                if enforce_window {
                    let due = s.next_break_due_at().map_or(false, |due_at| due_at <= now);
                    if !due {
                        return Err(ScheduleError::BreakNotDue);
                    }
                }
                s.ad_sequence += 1;
                s.last_ad_break_at = Some(now);
                Ok(s.ad_sequence)
            })
            .ok_or(ScheduleError::UnknownSession)??;

        self.inventory.record_impression(&campaign.campaign_id);

        let event = AdBreakEvent {
            event_id: Uuid::new_v4(),
            session_id: *session_id,
            campaign_id: campaign.campaign_id,
            sequence,
            served_at: now,
            outcome: AdOutcome::Served,
            outcome_at: None,
        };
        self.events.insert(event.clone());

        info!(
            session_id = %session_id,
            campaign_id = %campaign.campaign_id,
            sequence,
            "Ad break served"
        );
        metrics::counter!("scheduler.ads_served").increment(1);

        Ok(ServedBreak {
            ad: ServedAd {
                event_id: event.event_id,
                campaign_id: campaign.campaign_id,
                creative_url: campaign.creative_url.clone(),
                landing_url: campaign.landing_url.clone(),
            },
            event,
        })
    }
}
