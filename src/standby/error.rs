use std::time::Duration;

use thiserror::Error;

use crate::model::InstanceId;
use crate::provider::ProviderError;
use crate::registry::RegistryError;
use crate::snapshot::SnapshotError;

#[derive(Debug, Error)]
pub enum StandbyError {
    #[error("instance {0} is not registered")]
    UnknownInstance(InstanceId),

    #[error("no standby association exists for instance {0}")]
    NotProvisioned(InstanceId),

    /// Retries exhausted for an incremental sync or state fetch.
    #[error("state transfer failed after {attempts} attempts: {last_error}")]
    SyncFailed { attempts: u32, last_error: String },

    #[error("standby provisioning failed after {attempts} attempts: {last_error}")]
    ProvisioningFailed { attempts: u32, last_error: String },

    #[error("standby activation exceeded its {0:?} budget")]
    ActivationTimeout(Duration),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type StandbyResult<T> = Result<T, StandbyError>;
