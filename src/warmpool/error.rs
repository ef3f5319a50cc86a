use std::time::Duration;

use thiserror::Error;

use crate::model::{HostId, InstanceId};
use crate::provider::ProviderError;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum WarmPoolError {
    #[error("instance {0} is not registered")]
    UnknownInstance(InstanceId),

    #[error("host {host} cannot back a warm pool: {reason}")]
    HostUnsuitable { host: HostId, reason: String },

    #[error("no warm pool association exists for instance {0}")]
    NotProvisioned(InstanceId),

    /// The standby slot did not reach ready inside the hard deadline. The
    /// coordinator treats this as a first-class transition, not a retry.
    #[error("standby slot failed to become ready within {0:?}")]
    ActivationTimeout(Duration),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type WarmPoolResult<T> = Result<T, WarmPoolError>;
