//! Request and response bodies of the management surface.

use serde::{Deserialize, Serialize};

use crate::events::FailoverEvent;
use crate::model::{
    AssociationKind, FailoverPhase, FailoverPolicy, Host, HostId, InstanceId, ResourceSpec, SlotId,
    StandbyAssociation, Strategy, WarmPoolAssociation,
};

/// Body of `POST /v1/instances`, sent by the provisioning collaborator when
/// an instance comes under protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInstanceRequest {
    pub instance_id: InstanceId,
    /// Host mirror payload; refreshes the registry's view of the host.
    pub host: Host,
    /// Slot the workload occupies.
    pub slot_id: SlotId,
    pub spec: ResourceSpec,
    #[serde(default)]
    pub policy: FailoverPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInstanceResponse {
    pub instance_id: InstanceId,
    /// Strategy chosen at registration time.
    pub configured_strategy: Strategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub instance_id: InstanceId,
    pub host_id: HostId,
    pub phase: FailoverPhase,
    pub configured_strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_association: Option<AssociationKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatusResponse {
    pub instance_id: InstanceId,
    pub phase: FailoverPhase,
    pub miss_count: u32,
    pub degraded: bool,
    pub policy: FailoverPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_event: Option<FailoverEvent>,
    /// Error detail of the most recent failed workflow, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_detail: Option<String>,
    pub host_warm_pool_failures: u32,
}

/// Body of the warm-pool and standby `PUT` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmPoolResponse {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association: Option<WarmPoolAssociation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandbyResponse {
    pub enabled: bool,
    pub syncing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association: Option<StandbyAssociation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub bytes: u64,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulateResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub include_simulated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default = "default_notification_limit")]
    pub limit: usize,
}

fn default_notification_limit() -> usize {
    50
}
