//! Embedded relational persistence for the agent.
//!
//! One SQLite file in WAL mode carries disks, telemetry snapshots, pools,
//! scrub history, alerts, the notification queue and cloud schedules.
//! Operations are grouped by concern in the submodules; all of them hang off
//! the shared [`Store`] handle.

mod alerts;
mod disks;
mod pools;
mod queue;
mod schedules;
mod schema;
mod snapshots;
mod store;

pub use disks::{DiskRecord, PoolMembership};
pub use pools::ScrubHistoryEntry;
pub use queue::{QueueEntry, QueueStatus};
pub use store::Store;
