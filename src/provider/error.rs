use thiserror::Error;

use crate::model::{HostId, InstanceId, SlotId, VolumeId};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("marketplace request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("marketplace rejected {op}: {message}")]
    Api { op: String, message: String },

    #[error("no free slot available on host {0}")]
    NoFreeSlot(HostId),

    #[error("unknown slot {slot} on host {host}")]
    UnknownSlot { host: HostId, slot: SlotId },

    /// Exclusive-writable attachment: the volume is mounted somewhere else.
    #[error("volume {0} is attached to another slot")]
    VolumeBusy(VolumeId),

    #[error("no standby resource provisioned for instance {0}")]
    UnknownStandby(InstanceId),
}

pub type ProviderResult<T> = Result<T, ProviderError>;
