use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::LIFELINE_STATUS_HEADER;
use crate::registry::RegistryError;
use crate::report::ReportError;
use crate::standby::StandbyError;
use crate::warmpool::WarmPoolError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownInstance(_) | RegistryError::UnknownHost(_) => {
                GatewayError::NotFound(e.to_string())
            }
            RegistryError::HostMismatch { .. } => GatewayError::InvalidRequest(e.to_string()),
            RegistryError::AlreadyRegistered(_)
            | RegistryError::LeaseHeld { .. }
            | RegistryError::AssociationConflict { .. } => GatewayError::Conflict(e.to_string()),
        }
    }
}

impl From<WarmPoolError> for GatewayError {
    fn from(e: WarmPoolError) -> Self {
        match e {
            WarmPoolError::UnknownInstance(_) | WarmPoolError::NotProvisioned(_) => {
                GatewayError::NotFound(e.to_string())
            }
            WarmPoolError::HostUnsuitable { .. } => GatewayError::Conflict(e.to_string()),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<StandbyError> for GatewayError {
    fn from(e: StandbyError) -> Self {
        match e {
            StandbyError::UnknownInstance(_) | StandbyError::NotProvisioned(_) => {
                GatewayError::NotFound(e.to_string())
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<ReportError> for GatewayError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::UnknownInstance(_) => GatewayError::NotFound(e.to_string()),
            ReportError::CoordinatorUnavailable => GatewayError::Internal(e.to_string()),
        }
    }
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, lifeline_status) = match &self {
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            GatewayError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            LIFELINE_STATUS_HEADER,
            HeaderValue::from_str(lifeline_status).unwrap_or(HeaderValue::from_static("error")),
        );

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });

        (status, headers, body).into_response()
    }
}
