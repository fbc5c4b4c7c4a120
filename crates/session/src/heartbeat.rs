//! Heartbeat monitor — accepts periodic liveness pings from the media
//! server and runs the reaper sweep that demotes sessions whose last ping
//! exceeds the liveness threshold.

use chrono::Duration;
use std::sync::Arc;
use tracing::info;

use streamcast_core::clock::Clock;
use streamcast_core::error::AuthError;
use streamcast_core::types::SessionStatus;

use crate::store::SessionStore;

pub struct HeartbeatMonitor {
    store: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    threshold: Duration,
}

impl HeartbeatMonitor {
    pub fn new(store: Arc<SessionStore>, clock: Arc<dyn Clock>, threshold_secs: u64) -> Self {
        Self {
            store,
            clock,
            threshold: Duration::seconds(threshold_secs as i64),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Refresh the session's liveness timestamp. Only `Live` and `Pending`
    /// sessions are refreshed: a stale heartbeat from a since-ended session
    /// must not resurrect it, the publisher has to re-authenticate.
    pub fn heartbeat(&self, credential_key: &str) -> Result<(), AuthError> {
        let now = self.clock.now();

        let refreshed = self.store.update_by_key(credential_key, |s| {
            match s.status {
                SessionStatus::Live | SessionStatus::Pending => {
                    s.last_liveness_at = Some(now);
                    true
                }
                _ => false,
            }
        });

        match refreshed {
            None => Err(AuthError::UnknownCredential),
            Some(applied) => {
                if applied {
                    metrics::counter!("heartbeat.received").increment(1);
                }
                Ok(())
            }
        }
    }

    /// Reaper pass: demote every `Live` session whose last heartbeat is
    /// older than the threshold. The staleness check re-runs under the
    /// entry lock, so a heartbeat that lands between the snapshot and the
    /// conditional update wins and the session stays live. Running the
    /// sweep twice in a row without new heartbeats is a no-op the second
    /// time. Returns the number of sessions demoted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let cutoff = now - self.threshold;

        let candidates: Vec<_> = self
            .store
            .all()
            .into_iter()
            .filter(|s| {
                s.status == SessionStatus::Live
                    && s.last_liveness_at.map(|t| t < cutoff).unwrap_or(true)
            })
            .map(|s| s.session_id)
            .collect();

        let mut demoted = 0;
        for session_id in candidates {
            let changed = self
                .store
                .update(&session_id, |s| {
                    // Re-read under the lock; skip if a fresher heartbeat
                    // arrived after the snapshot.
                    if s.status == SessionStatus::Live
                        && s.last_liveness_at.map(|t| t < cutoff).unwrap_or(true)
                    {
                        s.status = SessionStatus::Inactive;
                        s.ended_at = Some(now);
                        true
                    } else {
                        false
                    }
                })
                .unwrap_or(false);

            if changed {
                info!(session_id = %session_id, "Sweep demoted stale session");
                metrics::counter!("sweep.demoted").increment(1);
                demoted += 1;
            }
        }
        demoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use streamcast_core::clock::ManualClock;
    use streamcast_core::types::{AdPolicy, ClientMetadata, EncodingProfile, SessionAudience};
    use uuid::Uuid;

    use crate::gate::AuthenticationGate;

    struct Fixture {
        store: Arc<SessionStore>,
        clock: Arc<ManualClock>,
        gate: AuthenticationGate,
        monitor: HeartbeatMonitor,
        key: String,
        session_id: Uuid,
    }

    fn setup() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(SessionStore::new(clock.clone()));
        let session = store.create(
            Uuid::new_v4(),
            EncodingProfile::default(),
            AdPolicy::default(),
            SessionAudience::default(),
        );
        let gate = AuthenticationGate::new(store.clone(), clock.clone());
        let monitor = HeartbeatMonitor::new(store.clone(), clock.clone(), 30);
        Fixture {
            store,
            clock,
            gate,
            monitor,
            key: session.credential_key.clone(),
            session_id: session.session_id,
        }
    }

    #[test]
    fn test_heartbeat_refreshes_live_session() {
        let f = setup();
        f.gate.authenticate(&f.key, ClientMetadata::default()).unwrap();

        f.clock.advance(Duration::seconds(10));
        f.monitor.heartbeat(&f.key).unwrap();

        let session = f.store.get(&f.session_id).unwrap();
        assert_eq!(session.last_liveness_at, Some(f.clock.now()));
    }

    #[test]
    fn test_heartbeat_unknown_credential() {
        let f = setup();
        assert_eq!(
            f.monitor.heartbeat("bogus"),
            Err(AuthError::UnknownCredential)
        );
    }

    #[test]
    fn test_heartbeat_never_resurrects_inactive_session() {
        let f = setup();
        f.gate.authenticate(&f.key, ClientMetadata::default()).unwrap();
        f.gate.end_session(&f.key).unwrap();

        f.monitor.heartbeat(&f.key).unwrap();

        let session = f.store.get(&f.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Inactive);
        assert!(session.last_liveness_at.is_none());
    }

    #[test]
    fn test_sweep_demotes_stale_session() {
        let f = setup();
        f.gate.authenticate(&f.key, ClientMetadata::default()).unwrap();

        // Heartbeat at t=0, nothing afterwards, sweep at t=31.
        f.clock.advance(Duration::seconds(31));
        assert_eq!(f.monitor.sweep(), 1);

        let session = f.store.get(&f.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Inactive);
        assert_eq!(session.ended_at, Some(f.clock.now()));
    }

    #[test]
    fn test_sweep_spares_fresh_session() {
        let f = setup();
        f.gate.authenticate(&f.key, ClientMetadata::default()).unwrap();

        f.clock.advance(Duration::seconds(29));
        assert_eq!(f.monitor.sweep(), 0);
        assert_eq!(
            f.store.get(&f.session_id).unwrap().status,
            SessionStatus::Live
        );
    }

    #[test]
    fn test_sweep_twice_is_idempotent() {
        let f = setup();
        f.gate.authenticate(&f.key, ClientMetadata::default()).unwrap();

        f.clock.advance(Duration::seconds(31));
        assert_eq!(f.monitor.sweep(), 1);
        assert_eq!(f.monitor.sweep(), 0);
    }

    #[test]
    fn test_heartbeat_after_cutoff_wins_over_sweep() {
        let f = setup();
        f.gate.authenticate(&f.key, ClientMetadata::default()).unwrap();

        f.clock.advance(Duration::seconds(31));
        // A heartbeat lands before the sweep's conditional update runs.
        f.monitor.heartbeat(&f.key).unwrap();
        assert_eq!(f.monitor.sweep(), 0);
        assert_eq!(
            f.store.get(&f.session_id).unwrap().status,
            SessionStatus::Live
        );
    }
}
