//! Handlers of the management surface.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{instrument, warn};

use super::error::GatewayError;
use super::payload::{
    InstanceStatusResponse, InstanceSummary, NotificationsQuery, RegisterInstanceRequest,
    RegisterInstanceResponse, ReportQuery, SimulateResponse, StandbyResponse, SyncResponse,
    ToggleRequest, WarmPoolResponse,
};
use super::state::HandlerState;
use crate::model::{Instance, InstanceId, Strategy};
use crate::standby::StandbyError;
use crate::strategy;
use crate::warmpool::WarmPoolError;

/// `POST /v1/instances`: brings an instance under protection.
///
/// Picks the strategy for the instance's host, provisions the matching
/// standby resource, and starts heartbeat probing.
#[instrument(skip(state, request), fields(instance = %request.instance_id))]
pub async fn register_instance_handler(
    State(state): State<HandlerState>,
    Json(request): Json<RegisterInstanceRequest>,
) -> Result<Response, GatewayError> {
    let instance = Instance::new(
        request.instance_id.clone(),
        request.host.id.clone(),
        request.slot_id,
        request.spec,
        request.policy,
    );
    state.registry.register(instance.clone(), request.host.clone())?;

    let configured = strategy::select(&instance, &request.host, false);
    state
        .registry
        .set_configured_strategy(&request.instance_id, configured)?;

    match configured {
        Strategy::WarmPool => {
            state.warm_pool.provision(&request.instance_id).await?;
        }
        Strategy::CpuStandby => {
            state.standby.ensure_provisioned(&request.instance_id).await?;
            state.standby.start_sync(request.instance_id.clone());
        }
        Strategy::None => {
            warn!(instance = %request.instance_id, "no strategy available; instance is unprotected");
        }
    }

    state.monitor.start(request.instance_id.clone());

    Ok((
        StatusCode::CREATED,
        Json(RegisterInstanceResponse {
            instance_id: request.instance_id,
            configured_strategy: configured,
        }),
    )
        .into_response())
}

/// `GET /v1/instances`: all live instances.
pub async fn list_instances_handler(State(state): State<HandlerState>) -> Response {
    let summaries: Vec<InstanceSummary> = state
        .registry
        .list()
        .into_iter()
        .map(|i| InstanceSummary {
            instance_id: i.id,
            host_id: i.host,
            phase: i.phase,
            configured_strategy: i.configured_strategy,
            active_association: i.active_association,
        })
        .collect();

    Json(summaries).into_response()
}

/// `DELETE /v1/instances/{id}`: removes an instance from protection.
///
/// Refused while a recovery workflow holds the instance's lease; the
/// caller retries after the workflow finishes or its lease expires.
#[instrument(skip(state))]
pub async fn decommission_handler(
    State(state): State<HandlerState>,
    Path(id): Path<InstanceId>,
) -> Result<Response, GatewayError> {
    if state.registry.get(&id).is_none() {
        return Err(GatewayError::NotFound(format!("unknown instance {id}")));
    }
    if state.registry.leases().is_held(&id) {
        return Err(GatewayError::Conflict(format!(
            "recovery in progress for {id}"
        )));
    }

    state.monitor.stop(&id);
    state.standby.stop_sync(&id);

    // Tear down standby resources while the associations still exist.
    match state.warm_pool.deprovision(&id).await {
        Ok(()) | Err(WarmPoolError::NotProvisioned(_)) => {}
        Err(e) => warn!(instance = %id, error = %e, "warm pool teardown failed"),
    }
    match state.standby.deprovision(&id).await {
        Ok(()) | Err(StandbyError::NotProvisioned(_)) => {}
        Err(e) => warn!(instance = %id, error = %e, "standby teardown failed"),
    }

    state.registry.decommission(&id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /v1/instances/{id}/status`.
pub async fn instance_status_handler(
    State(state): State<HandlerState>,
    Path(id): Path<InstanceId>,
) -> Result<Response, GatewayError> {
    let instance = state
        .registry
        .get(&id)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown instance {id}")))?;

    let last_error_detail = state
        .log
        .events_for(&id)
        .into_iter()
        .rev()
        .find_map(|e| e.error_detail);

    Ok(Json(InstanceStatusResponse {
        instance_id: id.clone(),
        phase: instance.phase,
        miss_count: state.monitor.miss_count(&id),
        degraded: state.monitor.is_degraded(&id),
        policy: instance.policy,
        open_event: state.log.open_event(&id),
        last_error_detail,
        host_warm_pool_failures: state.registry.warm_pool_failures(&instance.host),
    })
    .into_response())
}

/// `POST /v1/instances/{id}/simulate`: injects a synthetic failover.
#[instrument(skip(state))]
pub async fn simulate_handler(
    State(state): State<HandlerState>,
    Path(id): Path<InstanceId>,
) -> Result<Response, GatewayError> {
    state.reporter.simulate(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SimulateResponse { status: "accepted" }),
    )
        .into_response())
}

/// `GET /v1/report`.
pub async fn report_handler(
    State(state): State<HandlerState>,
    Query(query): Query<ReportQuery>,
) -> Response {
    Json(state.reporter.report(query.include_simulated)).into_response()
}

/// `GET /v1/instances/{id}/warmpool`.
pub async fn warm_pool_status_handler(
    State(state): State<HandlerState>,
    Path(id): Path<InstanceId>,
) -> Result<Response, GatewayError> {
    let instance = state
        .registry
        .get(&id)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown instance {id}")))?;

    Ok(Json(WarmPoolResponse {
        enabled: instance.policy.warm_pool_enabled,
        association: state.registry.warm_pool(&id),
    })
    .into_response())
}

/// `PUT /v1/instances/{id}/warmpool`: enables or disables the warm pool
/// for one instance. Disabling is refused mid-recovery.
#[instrument(skip(state))]
pub async fn warm_pool_toggle_handler(
    State(state): State<HandlerState>,
    Path(id): Path<InstanceId>,
    Json(request): Json<ToggleRequest>,
) -> Result<Response, GatewayError> {
    let instance = state
        .registry
        .get(&id)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown instance {id}")))?;

    let mut policy = instance.policy;
    if request.enabled {
        policy.warm_pool_enabled = true;
        state.registry.set_policy(&id, policy)?;
        let association = state.warm_pool.provision(&id).await?;
        Ok(Json(WarmPoolResponse {
            enabled: true,
            association: Some(association),
        })
        .into_response())
    } else {
        if state.coordinator.is_inflight(&id) {
            return Err(GatewayError::Conflict(format!(
                "recovery in progress for {id}"
            )));
        }
        policy.warm_pool_enabled = false;
        state.registry.set_policy(&id, policy)?;
        match state.warm_pool.deprovision(&id).await {
            Ok(()) | Err(WarmPoolError::NotProvisioned(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Json(WarmPoolResponse {
            enabled: false,
            association: None,
        })
        .into_response())
    }
}

/// `GET /v1/instances/{id}/standby`.
pub async fn standby_status_handler(
    State(state): State<HandlerState>,
    Path(id): Path<InstanceId>,
) -> Result<Response, GatewayError> {
    let instance = state
        .registry
        .get(&id)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown instance {id}")))?;

    Ok(Json(StandbyResponse {
        enabled: instance.policy.standby_enabled,
        syncing: state.standby.is_syncing(&id),
        association: state.registry.standby(&id),
    })
    .into_response())
}

/// `PUT /v1/instances/{id}/standby`: enables or disables the CPU standby
/// for one instance. Disabling is refused mid-recovery.
#[instrument(skip(state))]
pub async fn standby_toggle_handler(
    State(state): State<HandlerState>,
    Path(id): Path<InstanceId>,
    Json(request): Json<ToggleRequest>,
) -> Result<Response, GatewayError> {
    let instance = state
        .registry
        .get(&id)
        .ok_or_else(|| GatewayError::NotFound(format!("unknown instance {id}")))?;

    let mut policy = instance.policy;
    if request.enabled {
        policy.standby_enabled = true;
        state.registry.set_policy(&id, policy)?;
        let association = state.standby.ensure_provisioned(&id).await?;
        state.standby.start_sync(id.clone());
        Ok(Json(StandbyResponse {
            enabled: true,
            syncing: state.standby.is_syncing(&id),
            association: Some(association),
        })
        .into_response())
    } else {
        if state.coordinator.is_inflight(&id) {
            return Err(GatewayError::Conflict(format!(
                "recovery in progress for {id}"
            )));
        }
        policy.standby_enabled = false;
        state.registry.set_policy(&id, policy)?;
        state.standby.stop_sync(&id);
        match state.standby.deprovision(&id).await {
            Ok(()) | Err(StandbyError::NotProvisioned(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Json(StandbyResponse {
            enabled: false,
            syncing: false,
            association: None,
        })
        .into_response())
    }
}

/// `POST /v1/instances/{id}/standby/sync`: one on-demand incremental sync.
#[instrument(skip(state))]
pub async fn standby_sync_handler(
    State(state): State<HandlerState>,
    Path(id): Path<InstanceId>,
) -> Result<Response, GatewayError> {
    match state.standby.sync_once(&id).await {
        Ok(report) => Ok(Json(SyncResponse {
            bytes: report.bytes,
            content_hash: report.content_hash,
        })
        .into_response()),
        Err(e) => {
            // Sync failures during an incident count against the open event.
            if let Some(event) = state.log.open_event(&id)
                && let Err(log_err) = state.log.record_sync_error(event.id)
            {
                warn!(instance = %id, error = %log_err, "could not record sync error");
            }
            Err(e.into())
        }
    }
}

/// `GET /v1/notifications`: recent webhook delivery records, newest first.
pub async fn notifications_handler(
    State(state): State<HandlerState>,
    Query(query): Query<NotificationsQuery>,
) -> Response {
    Json(state.notifier.records().recent(query.limit)).into_response()
}
