//! HTTP management surface (Axum).
//!
//! This module is primarily used by the `lifeline` server binary.

pub mod error;
pub mod handler;
pub mod payload;
pub mod state;


use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::HeaderValue},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

pub use error::GatewayError;
pub use state::HandlerState;

use handler::{
    decommission_handler, instance_status_handler, list_instances_handler, notifications_handler,
    register_instance_handler, report_handler, simulate_handler, standby_status_handler,
    standby_sync_handler, standby_toggle_handler, warm_pool_status_handler,
    warm_pool_toggle_handler,
};

/// Response header carrying the gateway's own verdict alongside the HTTP
/// status code.
pub const LIFELINE_STATUS_HEADER: &str = "x-lifeline-status";
pub const LIFELINE_STATUS_HEALTHY: &str = "healthy";
pub const LIFELINE_STATUS_READY: &str = "ready";
pub const LIFELINE_STATUS_ERROR: &str = "error";

pub fn create_router_with_state(state: HandlerState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/readyz", get(ready_handler))
        .route("/v1/report", get(report_handler))
        .route("/v1/notifications", get(notifications_handler))
        .route(
            "/v1/instances",
            get(list_instances_handler).post(register_instance_handler),
        )
        .route("/v1/instances/{id}", delete(decommission_handler))
        .route("/v1/instances/{id}/status", get(instance_status_handler))
        .route("/v1/instances/{id}/simulate", post(simulate_handler))
        .route(
            "/v1/instances/{id}/warmpool",
            get(warm_pool_status_handler).put(warm_pool_toggle_handler),
        )
        .route(
            "/v1/instances/{id}/standby",
            get(standby_status_handler).put(standby_toggle_handler),
        )
        .route("/v1/instances/{id}/standby/sync", post(standby_sync_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(serde::Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub probed_instances: usize,
    pub components: ComponentStatus,
}

#[derive(serde::Serialize)]
pub struct ComponentStatus {
    pub http: &'static str,
    pub monitor: &'static str,
    pub notifier: &'static str,
}

#[tracing::instrument]
pub async fn health_handler() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        LIFELINE_STATUS_HEADER,
        HeaderValue::from_static(LIFELINE_STATUS_HEALTHY),
    );

    (
        StatusCode::OK,
        headers,
        Json(HealthResponse { status: "ok" }),
    )
        .into_response()
}

#[tracing::instrument(skip(state))]
pub async fn ready_handler(State(state): State<HandlerState>) -> Response {
    // Both background components are spawned before the listener binds, so
    // holding their handles is enough to call them ready.
    let components = ComponentStatus {
        http: LIFELINE_STATUS_READY,
        monitor: LIFELINE_STATUS_READY,
        notifier: LIFELINE_STATUS_READY,
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        LIFELINE_STATUS_HEADER,
        HeaderValue::from_static(LIFELINE_STATUS_READY),
    );

    (
        StatusCode::OK,
        headers,
        Json(ReadyResponse {
            status: "ready",
            probed_instances: state.monitor.probed_instances(),
            components,
        }),
    )
        .into_response()
}
