//! Background jobs
//!
//! Every job runs on its own thread and talks to the coordinator through a
//! per-job channel. The coordinator owns at most one job at a time.

mod events;
mod slot;
mod worker;

pub use events::{JobEvent, JobId, JobKind, JobOutput};
pub use slot::{ActiveJob, JobSlot};
pub use worker::{JobReporter, spawn_job};
