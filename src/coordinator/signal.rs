//! Signals driving the coordinator's state machine.
//!
//! Every transition the coordinator makes is caused by one of these; raw
//! collaborator errors never cross this boundary.

use chrono::{DateTime, Utc};

use crate::model::InstanceId;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The heartbeat monitor flagged the instance (or a simulation did).
    Degraded {
        instance: InstanceId,
        detected_at: DateTime<Utc>,
        simulated: bool,
    },
    /// A probe succeeded while the instance was flagged degraded.
    Recovered { instance: InstanceId },
}

impl Signal {
    pub fn instance(&self) -> &InstanceId {
        match self {
            Signal::Degraded { instance, .. } => instance,
            Signal::Recovered { instance } => instance,
        }
    }
}
