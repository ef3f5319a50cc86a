use thiserror::Error;

use crate::model::InstanceId;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("snapshot store rejected {op}: {message}")]
    Api { op: String, message: String },

    #[error("no snapshot exists for instance {0}")]
    NoSnapshot(InstanceId),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
