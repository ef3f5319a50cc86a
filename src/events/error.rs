use thiserror::Error;

use super::types::EventId;
use crate::model::InstanceId;

#[derive(Debug, Error)]
pub enum EventError {
    /// A second open event was requested for an instance that already has one.
    #[error("instance {instance} already has an open failover event {open}")]
    AlreadyOpen { instance: InstanceId, open: EventId },

    #[error("unknown failover event {0}")]
    UnknownEvent(EventId),

    /// Closing fields of an already-closed event cannot be rewritten.
    #[error("failover event {0} is already closed")]
    AlreadyClosed(EventId),
}

pub type EventResult<T> = Result<T, EventError>;
