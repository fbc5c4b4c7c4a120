use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Broadcast sessions ─────────────────────────────────────────────────

/// Lifecycle state of a broadcast session's publishing credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unconfigured,
    Pending,
    Live,
    Inactive,
}

/// Encoding parameters negotiated for a stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EncodingProfile {
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub fps: u32,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            bitrate_kbps: 2500,
            fps: 30,
        }
    }
}

/// Informational metadata reported by the media server on publish.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub addr: String,
    pub app: String,
    pub client_id: String,
}

/// Per-session ad timing policy: how long viewers watch free before the
/// first break, and the minimum gap between breaks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdPolicy {
    pub free_viewing_secs: u64,
    pub ad_interval_secs: u64,
}

impl Default for AdPolicy {
    fn default() -> Self {
        Self {
            free_viewing_secs: 300,
            ad_interval_secs: 180,
        }
    }
}

/// Audience attributes of the viewing session, matched against campaign
/// targeting predicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionAudience {
    pub country: Option<String>,
    pub audience_groups: Vec<u32>,
}

/// One stream's publishing credential and liveness state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSession {
    pub session_id: Uuid,
    pub stream_id: Uuid,
    /// Opaque secret presented by the media server on publish.
    pub credential_key: String,
    pub status: SessionStatus,
    pub last_liveness_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub encoding_profile: EncodingProfile,
    pub client_metadata: Option<ClientMetadata>,
    pub ad_policy: AdPolicy,
    pub last_ad_break_at: Option<DateTime<Utc>>,
    /// Monotone per-session counter; (session_id, ad_sequence) is the
    /// idempotency key of an ad-break event.
    pub ad_sequence: u64,
    pub audience: SessionAudience,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl BroadcastSession {
    /// Whether the session should be treated as live right now. The stored
    /// flag alone is not enough: the last heartbeat must be within the
    /// liveness threshold.
    pub fn effectively_live(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == SessionStatus::Live
            && self
                .last_liveness_at
                .map(|t| now - t <= threshold)
                .unwrap_or(false)
    }

    /// When the next ad-break window opens: the free viewing allowance after
    /// `started_at` for the first break, the inter-ad interval after
    /// `last_ad_break_at` for every later one. `None` before the session has
    /// started.
    pub fn next_break_due_at(&self) -> Option<DateTime<Utc>> {
        match self.last_ad_break_at {
            Some(last) => Some(last + Duration::seconds(self.ad_policy.ad_interval_secs as i64)),
            None => self
                .started_at
                .map(|t| t + Duration::seconds(self.ad_policy.free_viewing_secs as i64)),
        }
    }
}

// ─── Ad campaigns ───────────────────────────────────────────────────────

/// Review/serving state of an ad campaign. Transitions are monotone except
/// `Paused` <-> `Active`; `Stopped` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    PendingReview,
    Active,
    Paused,
    Stopped,
    Rejected,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Stopped | CampaignStatus::Rejected)
    }
}

/// Targeting predicates. Empty lists match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignTargeting {
    pub countries: Vec<String>,
    pub audience_groups: Vec<u32>,
}

impl CampaignTargeting {
    pub fn matches(&self, audience: &SessionAudience) -> bool {
        let country_ok = self.countries.is_empty()
            || audience
                .country
                .as_ref()
                .map(|c| self.countries.iter().any(|t| t == c))
                .unwrap_or(false);
        let groups_ok = self.audience_groups.is_empty()
            || self
                .audience_groups
                .iter()
                .any(|g| audience.audience_groups.contains(g));
        country_ok && groups_ok
    }
}

/// One advertiser's purchased inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdCampaign {
    pub campaign_id: Uuid,
    pub advertiser_id: Uuid,
    pub status: CampaignStatus,
    pub budget_total: f64,
    /// Monotone; never exceeds `budget_total`.
    pub budget_spent: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub targeting: CampaignTargeting,
    pub payment_completed: bool,
    /// Impression goal the campaign was sold against; used by the
    /// selection ranking, not enforced as a cap.
    pub target_impressions: u64,
    pub impression_count: u64,
    pub click_count: u64,
    pub creative_url: String,
    pub landing_url: String,
    pub created_at: DateTime<Utc>,
}

impl AdCampaign {
    pub fn budget_remaining(&self) -> f64 {
        (self.budget_total - self.budget_spent).max(0.0)
    }

    /// Eligibility predicate: approved, inside the flight dates, budget not
    /// exhausted. Targeting is checked separately against a session.
    pub fn is_servable(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active
            && now >= self.start_date
            && now <= self.end_date
            && self.budget_spent < self.budget_total
    }
}

/// Aggregate counters for display on the advertiser dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStats {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    pub impressions: u64,
    pub clicks: u64,
    /// `clicks / impressions` (0.0 when there are no impressions).
    pub ctr: f64,
    pub budget_total: f64,
    pub budget_spent: f64,
}

// ─── Ad-break events ────────────────────────────────────────────────────

/// Outcome of one ad insertion. `Served` is the initial state; the other
/// three are terminal and recorded at most once per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdOutcome {
    Served,
    Viewed,
    Clicked,
    Skipped,
}

impl AdOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AdOutcome::Served)
    }
}

/// One concrete insertion of an ad into a session. Written once at serve
/// time, updated once with a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdBreakEvent {
    pub event_id: Uuid,
    pub session_id: Uuid,
    pub campaign_id: Uuid,
    pub sequence: u64,
    pub served_at: DateTime<Utc>,
    pub outcome: AdOutcome,
    pub outcome_at: Option<DateTime<Utc>>,
}

/// Payload returned to the viewer client when an ad is inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServedAd {
    pub event_id: Uuid,
    pub campaign_id: Uuid,
    pub creative_url: String,
    pub landing_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targeting_empty_matches_all() {
        let targeting = CampaignTargeting::default();
        assert!(targeting.matches(&SessionAudience::default()));
        assert!(targeting.matches(&SessionAudience {
            country: Some("DE".to_string()),
            audience_groups: vec![7],
        }));
    }

    #[test]
    fn test_targeting_country_mismatch() {
        let targeting = CampaignTargeting {
            countries: vec!["US".to_string()],
            audience_groups: Vec::new(),
        };
        assert!(!targeting.matches(&SessionAudience {
            country: Some("DE".to_string()),
            audience_groups: Vec::new(),
        }));
        // Unknown viewer country never matches a country-targeted campaign.
        assert!(!targeting.matches(&SessionAudience::default()));
    }

    #[test]
    fn test_targeting_group_overlap() {
        let targeting = CampaignTargeting {
            countries: Vec::new(),
            audience_groups: vec![1, 2],
        };
        assert!(targeting.matches(&SessionAudience {
            country: None,
            audience_groups: vec![2, 9],
        }));
        assert!(!targeting.matches(&SessionAudience {
            country: None,
            audience_groups: vec![3],
        }));
    }

    #[test]
    fn test_outcome_terminality() {
        assert!(!AdOutcome::Served.is_terminal());
        assert!(AdOutcome::Viewed.is_terminal());
        assert!(AdOutcome::Clicked.is_terminal());
        assert!(AdOutcome::Skipped.is_terminal());
    }
}
