//! Failover event records and the append-only log that owns them.
//!
//! One [`FailoverEvent`] row exists per recovery workflow. Rows are
//! append-only except for the closing fields (`restored_at`, `outcome`,
//! `error_detail`); the log enforces the invariant that at most one open
//! event exists per instance at any time.

pub mod error;
pub mod log;
pub mod types;


pub use error::{EventError, EventResult};
pub use log::FailoverLog;
pub use types::{EventId, FailoverEvent, FailoverOutcome};
