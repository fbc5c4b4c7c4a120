//! Ad-break scheduling — the timing engine that inserts ads into live
//! sessions, the auditable event store, and the idempotent interaction
//! recorder.

pub mod events;
pub mod recorder;
pub mod scheduler;

pub use events::AdBreakEventStore;
pub use recorder::InteractionRecorder;
pub use scheduler::{AdBreakScheduler, ServedBreak};
