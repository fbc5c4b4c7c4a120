//! HTTP surface for the broadcast session lifecycle and the ad-break
//! scheduler.

pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::ApiServer;
