use thiserror::Error;

use crate::model::InstanceId;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("instance {0} is not registered")]
    UnknownInstance(InstanceId),

    #[error("coordinator is not running")]
    CoordinatorUnavailable,
}

pub type ReportResult<T> = Result<T, ReportError>;
