//! Session store — durable mapping from broadcast credential to session
//! state, backed by `DashMap`. The entry lock is the atomicity unit: every
//! mutation goes through a closure applied under `get_mut`, so a state
//! update is never partially applied.

use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

use streamcast_core::clock::Clock;
use streamcast_core::types::{
    AdPolicy, BroadcastSession, EncodingProfile, SessionAudience, SessionStatus,
};

pub struct SessionStore {
    /// session_id -> session
    sessions: DashMap<Uuid, BroadcastSession>,
    /// credential key -> session_id
    by_key: DashMap<String, Uuid>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            by_key: DashMap::new(),
            clock,
        }
    }

    /// Create a session for a newly scheduled stream. Starts `Pending` with
    /// a freshly generated credential key.
    pub fn create(
        &self,
        stream_id: Uuid,
        encoding_profile: EncodingProfile,
        ad_policy: AdPolicy,
        audience: SessionAudience,
    ) -> BroadcastSession {
        let session = BroadcastSession {
            session_id: Uuid::new_v4(),
            stream_id,
            credential_key: generate_credential_key(),
            status: SessionStatus::Pending,
            last_liveness_at: None,
            started_at: None,
            ended_at: None,
            encoding_profile,
            client_metadata: None,
            ad_policy,
            last_ad_break_at: None,
            ad_sequence: 0,
            audience,
            archived: false,
            created_at: self.clock.now(),
        };

        self.by_key
            .insert(session.credential_key.clone(), session.session_id);
        self.sessions.insert(session.session_id, session.clone());
        session
    }

    /// Rotate the credential of an inactive session being reconfigured:
    /// the old key stops resolving, a new one is issued. Returns the new
    /// key, or `None` if the session is unknown or currently live.
    pub fn rotate_credential(&self, session_id: &Uuid) -> Option<String> {
        let (old_key, new_key) = {
            let mut entry = self.sessions.get_mut(session_id)?;
            if entry.status == SessionStatus::Live {
                return None;
            }
            let old_key = entry.credential_key.clone();
            let new_key = generate_credential_key();
            entry.credential_key = new_key.clone();
            entry.status = SessionStatus::Pending;
            (old_key, new_key)
        };

        self.by_key.insert(new_key.clone(), *session_id);
        self.by_key.remove(&old_key);
        Some(new_key)
    }

    /// Snapshot read by session id.
    pub fn get(&self, session_id: &Uuid) -> Option<BroadcastSession> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    /// Snapshot read by credential key.
    pub fn get_by_key(&self, credential_key: &str) -> Option<BroadcastSession> {
        let session_id = *self.by_key.get(credential_key)?;
        self.get(&session_id)
    }

    /// Snapshot read by owning stream. Sessions are 1:1 with streams.
    pub fn get_by_stream(&self, stream_id: &Uuid) -> Option<BroadcastSession> {
        self.sessions
            .iter()
            .find(|r| r.stream_id == *stream_id)
            .map(|r| r.clone())
    }

    /// Apply `f` to the session under its entry lock. Returns `None` for an
    /// unknown session id.
    pub fn update<R>(
        &self,
        session_id: &Uuid,
        f: impl FnOnce(&mut BroadcastSession) -> R,
    ) -> Option<R> {
        let mut entry = self.sessions.get_mut(session_id)?;
        Some(f(&mut entry))
    }

    /// Apply `f` to the session owning `credential_key` under its entry
    /// lock. The key index guard is released before the session lock is
    /// taken so no two shard locks are ever held at once.
    pub fn update_by_key<R>(
        &self,
        credential_key: &str,
        f: impl FnOnce(&mut BroadcastSession) -> R,
    ) -> Option<R> {
        let session_id = *self.by_key.get(credential_key)?;
        self.update(&session_id, f)
    }

    /// Mark the owning stream archived; archived sessions fail
    /// authentication. Returns `false` for an unknown session id.
    pub fn archive(&self, session_id: &Uuid) -> bool {
        self.update(session_id, |s| {
            s.archived = true;
        })
        .is_some()
    }

    /// Snapshot of every session, for the reaper sweep and diagnostics.
    pub fn all(&self) -> Vec<BroadcastSession> {
        self.sessions.iter().map(|r| r.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Generate an opaque stream key: 20 random bytes, hex encoded.
fn generate_credential_key() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
