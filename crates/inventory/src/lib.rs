//! Ad campaign inventory — catalog, eligibility, selection ranking, and
//! concurrency-safe billing counters.

pub mod catalog;

pub use catalog::{AdInventory, ChargeResult};
