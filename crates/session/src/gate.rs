//! Authentication gate — validates the media server's publish assertion and
//! is the only path that may transition a session into `Live`.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use streamcast_core::clock::Clock;
use streamcast_core::error::AuthError;
use streamcast_core::types::{ClientMetadata, SessionStatus};

use crate::store::SessionStore;

/// Successful publish authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthGrant {
    pub session_id: Uuid,
    /// `true` when the session was already live (duplicate publish attempt
    /// from a media-server retry).
    pub resumed: bool,
}

pub struct AuthenticationGate {
    store: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
}

impl AuthenticationGate {
    pub fn new(store: Arc<SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate a publish assertion. Idempotent for duplicate attempts: a
    /// second call for a live session returns the same session id without
    /// resetting `started_at`.
    pub fn authenticate(
        &self,
        credential_key: &str,
        metadata: ClientMetadata,
    ) -> Result<AuthGrant, AuthError> {
        let now = self.clock.now();
        let addr = metadata.addr.clone();

        let outcome = self.store.update_by_key(credential_key, |s| {
            if s.archived {
                return Err(AuthError::StreamNotFound);
            }
            let resumed = s.status == SessionStatus::Live;
            s.status = SessionStatus::Live;
            s.last_liveness_at = Some(now);
            if s.started_at.is_none() {
                s.started_at = Some(now);
            }
            s.ended_at = None;
            s.client_metadata = Some(metadata);
            Ok(AuthGrant {
                session_id: s.session_id,
                resumed,
            })
        });

        match outcome {
            None => {
                // Source address kept for abuse tracking.
                warn!(addr = %addr, "Publish denied: unknown credential");
                metrics::counter!("auth.denied").increment(1);
                Err(AuthError::UnknownCredential)
            }
            Some(Err(e)) => {
                warn!(addr = %addr, reason = %e, "Publish denied");
                metrics::counter!("auth.denied").increment(1);
                Err(e)
            }
            Some(Ok(grant)) => {
                info!(
                    session_id = %grant.session_id,
                    resumed = grant.resumed,
                    addr = %addr,
                    "Publish authorized"
                );
                metrics::counter!("auth.allowed").increment(1);
                Ok(grant)
            }
        }
    }

    /// Explicit termination callback from the media server. No-op if the
    /// session is already inactive.
    pub fn end_session(&self, credential_key: &str) -> Result<(), AuthError> {
        let now = self.clock.now();

        let ended = self.store.update_by_key(credential_key, |s| {
            if s.status == SessionStatus::Inactive {
                return false;
            }
            s.status = SessionStatus::Inactive;
            s.ended_at = Some(now);
            s.last_liveness_at = None;
            true
        });

        match ended {
            None => Err(AuthError::UnknownCredential),
            Some(changed) => {
                if changed {
                    info!("Session ended by publish-done callback");
                    metrics::counter!("sessions.ended").increment(1);
                }
                Ok(())
            }
        }
    }
}
