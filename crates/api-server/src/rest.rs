//! REST API handlers: media-server callbacks, heartbeat, ad scheduling,
//! interaction recording, and diagnostics.

use axum::async_trait;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::{Form, Json};
use serde::de::DeserializeOwned;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

use streamcast_core::clock::Clock;
use streamcast_core::error::{AuthError, RecordError, ScheduleError};
use streamcast_core::types::{
    AdOutcome, AdPolicy, CampaignStats, ClientMetadata, EncodingProfile, ServedAd,
    SessionAudience, SessionStatus,
};
use streamcast_inventory::AdInventory;
use streamcast_scheduler::{AdBreakScheduler, InteractionRecorder};
use streamcast_session::{AuthenticationGate, HeartbeatMonitor, SessionStore};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub gate: Arc<AuthenticationGate>,
    pub monitor: Arc<HeartbeatMonitor>,
    pub inventory: Arc<AdInventory>,
    pub scheduler: Arc<AdBreakScheduler>,
    pub recorder: Arc<InteractionRecorder>,
    pub clock: Arc<dyn Clock>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_body(error: &str, message: impl Into<String>) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: error.to_string(),
        message: message.into(),
    })
}

// ─── Media-server callbacks ─────────────────────────────────────────────

/// Media servers differ on hook encoding: nginx-rtmp posts form data,
/// SRS-style servers post JSON. Accept either, keyed on Content-Type.
pub struct FormOrJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);
        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|_| StatusCode::BAD_REQUEST)?;
            Ok(FormOrJson(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|_| StatusCode::BAD_REQUEST)?;
            Ok(FormOrJson(value))
        }
    }
}

/// Fields posted by the media server on publish start/stop.
#[derive(Debug, Deserialize)]
pub struct PublishCallback {
    /// Stream credential.
    pub name: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub clientid: String,
}

/// POST /hooks/publish — authentication callback. 200 permits the publish;
/// 403/404 deny it. The denial reason is logged, never echoed to the media
/// server.
pub async fn handle_publish(
    State(state): State<AppState>,
    FormOrJson(callback): FormOrJson<PublishCallback>,
) -> StatusCode {
    let metadata = ClientMetadata {
        addr: callback.addr,
        app: callback.app,
        client_id: callback.clientid,
    };
    match state.gate.authenticate(&callback.name, metadata) {
        Ok(_) => StatusCode::OK,
        Err(AuthError::UnknownCredential) => StatusCode::FORBIDDEN,
        Err(AuthError::StreamNotFound) => StatusCode::NOT_FOUND,
    }
}

/// POST /hooks/publish_done — stream-end callback. Always acknowledged.
pub async fn handle_publish_done(
    State(state): State<AppState>,
    FormOrJson(callback): FormOrJson<PublishCallback>,
) -> StatusCode {
    if state.gate.end_session(&callback.name).is_err() {
        warn!(addr = %callback.addr, "Publish-done for unknown credential");
    }
    StatusCode::OK
}

// ─── Heartbeat ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub credential: String,
}

/// POST /v1/sessions/heartbeat — periodic liveness ping from the media
/// server while publishing.
pub async fn handle_heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> StatusCode {
    match state.monitor.heartbeat(&request.credential) {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::NOT_FOUND,
    }
}

// ─── Stream configuration ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct IngestConfigRequest {
    #[serde(default)]
    pub encoding_profile: Option<EncodingProfile>,
    #[serde(default)]
    pub ad_policy: Option<AdPolicy>,
    #[serde(default)]
    pub audience: Option<SessionAudience>,
}

#[derive(Serialize)]
pub struct IngestConfigResponse {
    pub session_id: Uuid,
    pub credential_key: String,
}

/// POST /v1/streams/{stream_id}/ingest-config — issue or reissue the
/// publishing credential for a stream. A first request creates the session;
/// a request for an existing inactive session rotates its key. Refused with
/// 409 while the stream is live.
pub async fn handle_ingest_config(
    State(state): State<AppState>,
    Path(stream_id): Path<Uuid>,
    Json(request): Json<IngestConfigRequest>,
) -> Result<Json<IngestConfigResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Some(existing) = state.sessions.get_by_stream(&stream_id) {
        let new_key = state
            .sessions
            .rotate_credential(&existing.session_id)
            .ok_or_else(|| {
                (
                    StatusCode::CONFLICT,
                    error_body("stream_live", "cannot reconfigure a live stream"),
                )
            })?;
        return Ok(Json(IngestConfigResponse {
            session_id: existing.session_id,
            credential_key: new_key,
        }));
    }

    let session = state.sessions.create(
        stream_id,
        request.encoding_profile.unwrap_or_default(),
        request.ad_policy.unwrap_or_default(),
        request.audience.unwrap_or_default(),
    );
    Ok(Json(IngestConfigResponse {
        session_id: session.session_id,
        credential_key: session.credential_key,
    }))
}

// ─── Ad scheduling ──────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdCheckResponse {
    /// Play this ad now.
    Insert { ad: ServedAd },
    /// No break due (or nothing to play); poll again in N seconds.
    Wait { next_ad_in_secs: u64 },
}

/// GET /v1/sessions/{id}/ad-check — polled by the viewer-facing session.
pub async fn handle_ad_check(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<AdCheckResponse>, (StatusCode, Json<ErrorResponse>)> {
    let session = state.sessions.get(&session_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            error_body("unknown_session", "no such session"),
        )
    })?;

    let Some(secs) = state.scheduler.next_ad_in(&session_id) else {
        return Err((
            StatusCode::CONFLICT,
            error_body("session_not_live", "session is not live"),
        ));
    };
    if secs > 0 {
        return Ok(Json(AdCheckResponse::Wait {
            next_ad_in_secs: secs,
        }));
    }

    match state.scheduler.try_insert_ad(&session_id) {
        Ok(served) => Ok(Json(AdCheckResponse::Insert { ad: served.ad })),
        // A concurrent poll already served this window.
        Err(ScheduleError::BreakNotDue) => Ok(Json(AdCheckResponse::Wait {
            next_ad_in_secs: state
                .scheduler
                .next_ad_in(&session_id)
                .unwrap_or(session.ad_policy.ad_interval_secs),
        })),
        // Nothing eligible: degrade gracefully, retry after one interval.
        Err(ScheduleError::NoEligibleAd) => Ok(Json(AdCheckResponse::Wait {
            next_ad_in_secs: session.ad_policy.ad_interval_secs,
        })),
        Err(e) => Err(schedule_error_response(e)),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdBreakRequest {
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
}

/// POST /v1/sessions/{id}/ad-break — operator-initiated break. Bypasses the
/// timing window but not eligibility.
pub async fn handle_ad_break(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AdBreakRequest>,
) -> Result<Json<ServedAd>, (StatusCode, Json<ErrorResponse>)> {
    match state
        .scheduler
        .trigger_ad_break(&session_id, request.campaign_id)
    {
        Ok(served) => Ok(Json(served.ad)),
        Err(e) => {
            metrics::counter!("api.ad_break_denied").increment(1);
            Err(schedule_error_response(e))
        }
    }
}

fn schedule_error_response(e: ScheduleError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        ScheduleError::UnknownSession => (
            StatusCode::NOT_FOUND,
            error_body("unknown_session", "no such session"),
        ),
        ScheduleError::SessionNotLive => (
            StatusCode::CONFLICT,
            error_body("session_not_live", "session is not live"),
        ),
        ScheduleError::BreakNotDue => (
            StatusCode::CONFLICT,
            error_body("break_not_due", "no break window is open"),
        ),
        ScheduleError::NoEligibleAd => (
            StatusCode::NOT_FOUND,
            error_body("no_eligible_ad", "no campaign is eligible right now"),
        ),
        ScheduleError::CampaignNotServable => (
            StatusCode::UNPROCESSABLE_ENTITY,
            error_body(
                "campaign_not_servable",
                "campaign is unknown, unapproved, out of flight, or exhausted",
            ),
        ),
    }
}

// ─── Interaction recording ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OutcomeRequest {
    pub outcome: AdOutcome,
}

#[derive(Serialize)]
pub struct OutcomeResponse {
    pub recorded: bool,
}

/// POST /v1/ad-events/{event_id}/outcome — record VIEWED/CLICKED/SKIPPED
/// against an ad-break event. Duplicate same-outcome calls ack; a
/// conflicting outcome is rejected (first write wins, informational for
/// the caller).
pub async fn handle_outcome(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<OutcomeRequest>,
) -> Result<Json<OutcomeResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !request.outcome.is_terminal() {
        return Err((
            StatusCode::BAD_REQUEST,
            error_body("invalid_outcome", "outcome must be viewed, clicked, or skipped"),
        ));
    }

    match state.recorder.record_outcome(&event_id, request.outcome) {
        Ok(()) => Ok(Json(OutcomeResponse { recorded: true })),
        Err(RecordError::UnknownEvent) => Err((
            StatusCode::NOT_FOUND,
            error_body("unknown_event", "no such ad-break event"),
        )),
        Err(RecordError::OutcomeConflict) => Err((
            StatusCode::CONFLICT,
            error_body(
                "outcome_conflict",
                "a different terminal outcome was already recorded",
            ),
        )),
    }
}

// ─── Diagnostics ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    /// Stored status cross-checked against the liveness threshold; this is
    /// the flag dashboards should trust.
    pub effectively_live: bool,
    pub last_liveness_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// GET /v1/sessions/{id}/status
pub async fn handle_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionStatusResponse>, StatusCode> {
    let session = state
        .sessions
        .get(&session_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let now = state.clock.now();
    Ok(Json(SessionStatusResponse {
        session_id: session.session_id,
        status: session.status,
        effectively_live: session.effectively_live(now, state.monitor.threshold()),
        last_liveness_at: session.last_liveness_at,
        started_at: session.started_at,
        ended_at: session.ended_at,
    }))
}

/// GET /v1/campaigns/{id}/stats
pub async fn handle_campaign_stats(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignStats>, StatusCode> {
    state
        .inventory
        .stats(&campaign_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

// ─── Probes ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub sessions: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sessions: state.sessions.len(),
    })
}

/// GET /ready
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    async fn extract(content_type: &str, body: &str) -> Result<PublishCallback, StatusCode> {
        let req = Request::builder()
            .method("POST")
            .uri("/hooks/publish")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        FormOrJson::<PublishCallback>::from_request(req, &())
            .await
            .map(|FormOrJson(v)| v)
    }

    #[tokio::test]
    async fn test_publish_callback_accepts_form() {
        let cb = extract(
            "application/x-www-form-urlencoded",
            "name=abc123&app=live&addr=198.51.100.7&clientid=9",
        )
        .await
        .unwrap();
        assert_eq!(cb.name, "abc123");
        assert_eq!(cb.addr, "198.51.100.7");
    }

    #[tokio::test]
    async fn test_publish_callback_accepts_json() {
        let cb = extract(
            "application/json",
            r#"{"name":"abc123","app":"live","addr":"198.51.100.7","clientid":"9"}"#,
        )
        .await
        .unwrap();
        assert_eq!(cb.name, "abc123");
        assert_eq!(cb.app, "live");
    }

    #[tokio::test]
    async fn test_publish_callback_rejects_malformed_json() {
        let err = extract("application/json", "{not json")
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::BAD_REQUEST);
    }
}
