//! Ad inventory — campaign catalog with eligibility predicates, the
//! deterministic selection ranking, and the billing counters. Counter
//! updates happen under the campaign's entry lock so concurrent serves and
//! click recordings never corrupt budget or impression totals.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::cmp::Ordering;
use tracing::info;
use uuid::Uuid;

use streamcast_core::types::{AdCampaign, CampaignStats, CampaignStatus, SessionAudience};

/// Result of charging a click against a campaign budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeResult {
    /// Amount actually deducted; less than the cost per click when the
    /// remaining budget could not cover it.
    pub charged: f64,
    /// Whether this charge exhausted the budget and paused the campaign.
    pub paused: bool,
}

pub struct AdInventory {
    /// campaign_id -> campaign
    campaigns: DashMap<Uuid, AdCampaign>,
}

impl AdInventory {
    pub fn new() -> Self {
        Self {
            campaigns: DashMap::new(),
        }
    }

    pub fn insert(&self, campaign: AdCampaign) {
        self.campaigns.insert(campaign.campaign_id, campaign);
    }

    pub fn get(&self, campaign_id: &Uuid) -> Option<AdCampaign> {
        self.campaigns.get(campaign_id).map(|r| r.clone())
    }

    /// Aggregate counters for display.
    pub fn stats(&self, campaign_id: &Uuid) -> Option<CampaignStats> {
        let c = self.campaigns.get(campaign_id)?;
        let ctr = if c.impression_count > 0 {
            c.click_count as f64 / c.impression_count as f64
        } else {
            0.0
        };
        Some(CampaignStats {
            campaign_id: c.campaign_id,
            status: c.status,
            impressions: c.impression_count,
            clicks: c.click_count,
            ctr,
            budget_total: c.budget_total,
            budget_spent: c.budget_spent,
        })
    }

    // ─── Lifecycle transitions ──────────────────────────────────────────
    //
    // Monotone except Paused <-> Active; Stopped and Rejected are terminal.
    // Each helper returns `false` when the transition is illegal or the
    // campaign is unknown.

    pub fn submit_for_review(&self, campaign_id: &Uuid) -> bool {
        self.transition(campaign_id, CampaignStatus::Draft, CampaignStatus::PendingReview)
    }

    pub fn approve(&self, campaign_id: &Uuid) -> bool {
        self.transition(
            campaign_id,
            CampaignStatus::PendingReview,
            CampaignStatus::Active,
        )
    }

    pub fn reject(&self, campaign_id: &Uuid) -> bool {
        self.transition(
            campaign_id,
            CampaignStatus::PendingReview,
            CampaignStatus::Rejected,
        )
    }

    pub fn pause(&self, campaign_id: &Uuid) -> bool {
        self.transition(campaign_id, CampaignStatus::Active, CampaignStatus::Paused)
    }

    pub fn resume(&self, campaign_id: &Uuid) -> bool {
        self.transition(campaign_id, CampaignStatus::Paused, CampaignStatus::Active)
    }

    /// Stop from any non-terminal state.
    pub fn stop(&self, campaign_id: &Uuid) -> bool {
        self.campaigns
            .get_mut(campaign_id)
            .map(|mut c| {
                if c.status.is_terminal() {
                    false
                } else {
                    c.status = CampaignStatus::Stopped;
                    true
                }
            })
            .unwrap_or(false)
    }

    fn transition(&self, campaign_id: &Uuid, from: CampaignStatus, to: CampaignStatus) -> bool {
        self.campaigns
            .get_mut(campaign_id)
            .map(|mut c| {
                if c.status == from {
                    c.status = to;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false)
    }

    // ─── Selection ──────────────────────────────────────────────────────

    /// Campaigns servable right now for the given audience, ranked
    /// deterministically: paid campaigns first, then higher remaining
    /// budget per target impression, ties broken by earliest creation for
    /// fair rotation.
    pub fn eligible(&self, now: DateTime<Utc>, audience: &SessionAudience) -> Vec<AdCampaign> {
        let mut out: Vec<AdCampaign> = self
            .campaigns
            .iter()
            .filter(|c| c.is_servable(now) && c.targeting.matches(audience))
            .map(|c| c.clone())
            .collect();
        out.sort_by(rank);
        out
    }

    // ─── Counters ───────────────────────────────────────────────────────

    /// Count one impression at serve time. Returns `false` for an unknown
    /// campaign.
    pub fn record_impression(&self, campaign_id: &Uuid) -> bool {
        self.campaigns
            .get_mut(campaign_id)
            .map(|mut c| c.impression_count += 1)
            .is_some()
    }

    /// Charge one click. The deduction is clamped so `budget_spent` never
    /// exceeds `budget_total`; a clamped charge exhausts the budget and
    /// pauses the campaign rather than overspending silently.
    pub fn charge_click(&self, campaign_id: &Uuid, cost_per_click: f64) -> Option<ChargeResult> {
        let mut c = self.campaigns.get_mut(campaign_id)?;

        let charged = cost_per_click.min(c.budget_remaining());
        c.budget_spent += charged;
        c.click_count += 1;

        let mut paused = false;
        if c.budget_spent >= c.budget_total && c.status == CampaignStatus::Active {
            c.status = CampaignStatus::Paused;
            paused = true;
            info!(campaign_id = %campaign_id, "Campaign budget exhausted, pausing");
            metrics::counter!("inventory.budget_exhausted").increment(1);
        }

        Some(ChargeResult { charged, paused })
    }
}

impl Default for AdInventory {
    fn default() -> Self {
        Self::new()
    }
}

/// Remaining budget per impression still owed; the campaign furthest from
/// its goal relative to its money ranks first.
fn remaining_ratio(c: &AdCampaign) -> f64 {
    c.budget_remaining() / c.target_impressions.max(1) as f64
}

fn rank(a: &AdCampaign, b: &AdCampaign) -> Ordering {
    b.payment_completed
        .cmp(&a.payment_completed)
        .then_with(|| {
            remaining_ratio(b)
                .partial_cmp(&remaining_ratio(a))
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use streamcast_core::types::CampaignTargeting;

    fn make_campaign(budget: f64) -> AdCampaign {
        let now = Utc::now();
        AdCampaign {
            campaign_id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            status: CampaignStatus::Active,
            budget_total: budget,
            budget_spent: 0.0,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
            targeting: CampaignTargeting::default(),
            payment_completed: true,
            target_impressions: 10_000,
            impression_count: 0,
            click_count: 0,
            creative_url: "https://cdn.example.com/creative.mp4".to_string(),
            landing_url: "https://example.com/offer".to_string(),
            created_at: now,
        }
    }

    // 1. Eligibility filter --------------------------------------------------

    #[test]
    fn test_eligible_filters_by_status_dates_and_budget() {
        let inventory = AdInventory::new();
        let now = Utc::now();

        let active = make_campaign(100.0);
        let active_id = active.campaign_id;
        inventory.insert(active);

        let mut paused = make_campaign(100.0);
        paused.status = CampaignStatus::Paused;
        inventory.insert(paused);

        let mut expired = make_campaign(100.0);
        expired.end_date = now - Duration::days(1);
        inventory.insert(expired);

        let mut exhausted = make_campaign(100.0);
        exhausted.budget_spent = 100.0;
        inventory.insert(exhausted);

        let eligible = inventory.eligible(now, &SessionAudience::default());
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].campaign_id, active_id);
    }

    #[test]
    fn test_eligible_respects_targeting() {
        let inventory = AdInventory::new();
        let now = Utc::now();

        let mut us_only = make_campaign(100.0);
        us_only.targeting.countries = vec!["US".to_string()];
        inventory.insert(us_only);

        let de_viewer = SessionAudience {
            country: Some("DE".to_string()),
            audience_groups: Vec::new(),
        };
        assert!(inventory.eligible(now, &de_viewer).is_empty());

        let us_viewer = SessionAudience {
            country: Some("US".to_string()),
            audience_groups: Vec::new(),
        };
        assert_eq!(inventory.eligible(now, &us_viewer).len(), 1);
    }

    // 2. Ranking -------------------------------------------------------------

    #[test]
    fn test_ranking_paid_campaigns_first() {
        let inventory = AdInventory::new();
        let now = Utc::now();

        let mut unpaid = make_campaign(1_000.0);
        unpaid.payment_completed = false;
        let unpaid_id = unpaid.campaign_id;
        inventory.insert(unpaid);

        let mut paid = make_campaign(10.0);
        paid.payment_completed = true;
        let paid_id = paid.campaign_id;
        inventory.insert(paid);

        let eligible = inventory.eligible(now, &SessionAudience::default());
        assert_eq!(eligible[0].campaign_id, paid_id);
        assert_eq!(eligible[1].campaign_id, unpaid_id);
    }

    #[test]
    fn test_ranking_by_remaining_budget_ratio_then_age() {
        let inventory = AdInventory::new();
        let now = Utc::now();

        let mut small = make_campaign(10.0);
        small.created_at = now - Duration::hours(2);
        let small_id = small.campaign_id;
        inventory.insert(small);

        let mut big = make_campaign(1_000.0);
        big.created_at = now - Duration::hours(1);
        let big_id = big.campaign_id;
        inventory.insert(big);

        // Same budget and ratio as `small` but created earlier: wins the tie.
        let mut older = make_campaign(10.0);
        older.created_at = now - Duration::hours(3);
        let older_id = older.campaign_id;
        inventory.insert(older);

        let eligible = inventory.eligible(now, &SessionAudience::default());
        assert_eq!(eligible[0].campaign_id, big_id);
        assert_eq!(eligible[1].campaign_id, older_id);
        assert_eq!(eligible[2].campaign_id, small_id);
    }

    // 3. Counters and budget clamp -------------------------------------------

    #[test]
    fn test_record_impression() {
        let inventory = AdInventory::new();
        let campaign = make_campaign(100.0);
        let cid = campaign.campaign_id;
        inventory.insert(campaign);

        assert!(inventory.record_impression(&cid));
        assert!(inventory.record_impression(&cid));
        assert_eq!(inventory.get(&cid).unwrap().impression_count, 2);
    }

    #[test]
    fn test_charge_click_deducts_budget() {
        let inventory = AdInventory::new();
        let campaign = make_campaign(100.0);
        let cid = campaign.campaign_id;
        inventory.insert(campaign);

        let result = inventory.charge_click(&cid, 0.25).unwrap();
        assert!((result.charged - 0.25).abs() < f64::EPSILON);
        assert!(!result.paused);

        let c = inventory.get(&cid).unwrap();
        assert_eq!(c.click_count, 1);
        assert!((c.budget_spent - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_charge_click_clamps_and_pauses() {
        let inventory = AdInventory::new();
        let mut campaign = make_campaign(1.0);
        campaign.budget_spent = 0.9;
        let cid = campaign.campaign_id;
        inventory.insert(campaign);

        // Only 0.10 left; the 0.25 charge is clamped and the campaign pauses.
        let result = inventory.charge_click(&cid, 0.25).unwrap();
        assert!((result.charged - 0.1).abs() < 1e-9);
        assert!(result.paused);

        let c = inventory.get(&cid).unwrap();
        assert_eq!(c.status, CampaignStatus::Paused);
        assert!((c.budget_spent - c.budget_total).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_clicks_never_overspend() {
        let inventory = Arc::new(AdInventory::new());
        // Budget covers 4 clicks at 0.25; we fire 16.
        let campaign = make_campaign(1.0);
        let cid = campaign.campaign_id;
        inventory.insert(campaign);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let inv = inventory.clone();
                std::thread::spawn(move || {
                    inv.charge_click(&cid, 0.25).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let c = inventory.get(&cid).unwrap();
        assert!((c.budget_spent - c.budget_total).abs() < 1e-9);
        assert_eq!(c.status, CampaignStatus::Paused);
        assert_eq!(c.click_count, 16);
    }

    // 4. Lifecycle -----------------------------------------------------------

    #[test]
    fn test_lifecycle_transitions() {
        let inventory = AdInventory::new();
        let mut campaign = make_campaign(100.0);
        campaign.status = CampaignStatus::Draft;
        let cid = campaign.campaign_id;
        inventory.insert(campaign);

        assert!(inventory.submit_for_review(&cid));
        assert!(inventory.approve(&cid));
        assert!(inventory.pause(&cid));
        assert!(inventory.resume(&cid));
        assert!(inventory.stop(&cid));

        // Terminal: nothing moves it again.
        assert!(!inventory.resume(&cid));
        assert!(!inventory.stop(&cid));
        assert_eq!(inventory.get(&cid).unwrap().status, CampaignStatus::Stopped);
    }

    #[test]
    fn test_reject_only_from_pending_review() {
        let inventory = AdInventory::new();
        let campaign = make_campaign(100.0);
        let cid = campaign.campaign_id;
        inventory.insert(campaign);

        // Already active, cannot be rejected.
        assert!(!inventory.reject(&cid));
    }

    // 5. Stats ---------------------------------------------------------------

    #[test]
    fn test_stats_ctr() {
        let inventory = AdInventory::new();
        let mut campaign = make_campaign(100.0);
        campaign.impression_count = 200;
        campaign.click_count = 10;
        let cid = campaign.campaign_id;
        inventory.insert(campaign);

        let stats = inventory.stats(&cid).unwrap();
        assert!((stats.ctr - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_ctr_zero_impressions() {
        let inventory = AdInventory::new();
        let campaign = make_campaign(100.0);
        let cid = campaign.campaign_id;
        inventory.insert(campaign);

        assert!(inventory.stats(&cid).unwrap().ctr.abs() < f64::EPSILON);
    }
}
