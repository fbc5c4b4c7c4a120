use thiserror::Error;

pub type StreamcastResult<T> = Result<T, StreamcastError>;

/// Unexpected failures. Everything the caller can act on is modelled as a
/// typed denial (`AuthError`, `ScheduleError`, `RecordError`) instead.
#[derive(Error, Debug)]
pub enum StreamcastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Denials returned by the authentication gate. The reason is logged, never
/// echoed to the media server.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("unknown credential")]
    UnknownCredential,

    #[error("stream not found")]
    StreamNotFound,
}

/// Denials returned by the ad-break scheduler.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("unknown session")]
    UnknownSession,

    #[error("session is not live")]
    SessionNotLive,

    #[error("no break window is open")]
    BreakNotDue,

    #[error("no eligible ad")]
    NoEligibleAd,

    #[error("campaign is not servable")]
    CampaignNotServable,
}

/// Denials returned by the interaction recorder.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    #[error("unknown ad-break event")]
    UnknownEvent,

    #[error("a different terminal outcome was already recorded")]
    OutcomeConflict,
}
