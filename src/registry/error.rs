use thiserror::Error;

use crate::model::{AssociationKind, HostId, InstanceId};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("instance {0} is not registered")]
    UnknownInstance(InstanceId),

    #[error("host {0} is not mirrored")]
    UnknownHost(HostId),

    #[error("instance {0} is already registered")]
    AlreadyRegistered(InstanceId),

    /// Registration payload referenced a host other than the instance's own.
    #[error("instance {instance} does not reside on host {host}")]
    HostMismatch { instance: InstanceId, host: HostId },

    /// A recovery workflow owns the instance until it finishes or expires.
    #[error("instance {instance} has a recovery lease held for another {remaining_ms}ms")]
    LeaseHeld {
        instance: InstanceId,
        remaining_ms: u64,
    },

    /// An instance may have at most one active association at a time.
    #[error("instance {instance} already has an active {current:?} association")]
    AssociationConflict {
        instance: InstanceId,
        current: AssociationKind,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
