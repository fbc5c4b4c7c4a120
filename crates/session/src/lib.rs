//! Broadcast session lifecycle — the credential store, the publish
//! authentication gate, and the heartbeat monitor with its reaper sweep.

pub mod gate;
pub mod heartbeat;
pub mod store;

pub use gate::{AuthGrant, AuthenticationGate};
pub use heartbeat::HeartbeatMonitor;
pub use store::SessionStore;
