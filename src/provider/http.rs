//! HTTP client for the marketplace provisioning API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::{ProviderError, ProviderResult};
use super::{ComputeProvider, SlotStatus, SyncReport};
use crate::model::{HostId, InstanceId, SlotId, StandbyResourceRef, VolumeId};
use crate::snapshot::SnapshotMeta;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Transfers can run for minutes; bounded separately from control calls.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

pub struct MarketplaceClient {
    base_url: String,
    client: Client,
    transfer_client: Client,
}

impl MarketplaceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        let transfer_client = Client::builder()
            .timeout(TRANSFER_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            transfer_client,
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        client: &Client,
        method: Method,
        op: &'static str,
        path: String,
        body: Option<serde_json::Value>,
    ) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = client.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::CONFLICT && op == "attach_volume" {
            // The marketplace reports an exclusive-attachment violation as 409.
            let detail: ApiErrorBody = resp.json().await.unwrap_or_default();
            return Err(ProviderError::Api {
                op: op.to_string(),
                message: detail.error,
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Api {
                op: op.to_string(),
                message: status.to_string(),
            });
        }
        Ok(resp.json().await?)
    }

    async fn control<T: DeserializeOwned>(
        &self,
        method: Method,
        op: &'static str,
        path: String,
        body: Option<serde_json::Value>,
    ) -> ProviderResult<T> {
        self.request(&self.client, method, op, path, body).await
    }

    async fn transfer(
        &self,
        op: &'static str,
        path: String,
        body: serde_json::Value,
    ) -> ProviderResult<SyncReport> {
        self.request(&self.transfer_client, Method::POST, op, path, Some(body))
            .await
    }
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
struct SlotResponse {
    slot_id: SlotId,
}

#[derive(Deserialize)]
struct VolumeResponse {
    volume_id: VolumeId,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: SlotStatus,
}

#[derive(Deserialize)]
struct EndpointResponse {
    endpoint: String,
}

#[derive(Serialize, Deserialize)]
struct Empty {}

#[async_trait]
impl ComputeProvider for MarketplaceClient {
    async fn reserve_slot(&self, host: &HostId) -> ProviderResult<SlotId> {
        let resp: SlotResponse = self
            .control(
                Method::POST,
                "reserve_slot",
                format!("/v1/hosts/{host}/slots"),
                None,
            )
            .await?;
        Ok(resp.slot_id)
    }

    async fn release_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()> {
        let _: Empty = self
            .control(
                Method::DELETE,
                "release_slot",
                format!("/v1/hosts/{host}/slots/{slot}"),
                None,
            )
            .await?;
        Ok(())
    }

    async fn create_shared_volume(&self, host: &HostId, size_gb: u64) -> ProviderResult<VolumeId> {
        let resp: VolumeResponse = self
            .control(
                Method::POST,
                "create_shared_volume",
                format!("/v1/hosts/{host}/volumes"),
                Some(json!({ "size_gb": size_gb, "shared": true })),
            )
            .await?;
        Ok(resp.volume_id)
    }

    async fn delete_volume(&self, host: &HostId, volume: &VolumeId) -> ProviderResult<()> {
        let _: Empty = self
            .control(
                Method::DELETE,
                "delete_volume",
                format!("/v1/hosts/{host}/volumes/{volume}"),
                None,
            )
            .await?;
        Ok(())
    }

    async fn attach_volume(
        &self,
        host: &HostId,
        volume: &VolumeId,
        slot: &SlotId,
    ) -> ProviderResult<()> {
        let _: Empty = self
            .control(
                Method::POST,
                "attach_volume",
                format!("/v1/hosts/{host}/volumes/{volume}/attach"),
                Some(json!({ "slot_id": slot })),
            )
            .await?;
        Ok(())
    }

    async fn detach_volume(
        &self,
        host: &HostId,
        volume: &VolumeId,
        slot: &SlotId,
    ) -> ProviderResult<()> {
        let _: Empty = self
            .control(
                Method::POST,
                "detach_volume",
                format!("/v1/hosts/{host}/volumes/{volume}/detach"),
                Some(json!({ "slot_id": slot })),
            )
            .await?;
        Ok(())
    }

    async fn start_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()> {
        let _: Empty = self
            .control(
                Method::POST,
                "start_slot",
                format!("/v1/hosts/{host}/slots/{slot}/start"),
                None,
            )
            .await?;
        Ok(())
    }

    async fn stop_slot(&self, host: &HostId, slot: &SlotId) -> ProviderResult<()> {
        let _: Empty = self
            .control(
                Method::POST,
                "stop_slot",
                format!("/v1/hosts/{host}/slots/{slot}/stop"),
                None,
            )
            .await?;
        Ok(())
    }

    async fn slot_status(&self, host: &HostId, slot: &SlotId) -> ProviderResult<SlotStatus> {
        let resp: StatusResponse = self
            .control(
                Method::GET,
                "slot_status",
                format!("/v1/hosts/{host}/slots/{slot}/status"),
                None,
            )
            .await?;
        Ok(resp.status)
    }

    async fn slot_endpoint(&self, host: &HostId, slot: &SlotId) -> ProviderResult<String> {
        let resp: EndpointResponse = self
            .control(
                Method::GET,
                "slot_endpoint",
                format!("/v1/hosts/{host}/slots/{slot}/endpoint"),
                None,
            )
            .await?;
        Ok(resp.endpoint)
    }

    async fn provision_standby(
        &self,
        instance: &InstanceId,
        zone: &str,
        class: &str,
    ) -> ProviderResult<StandbyResourceRef> {
        self.control(
            Method::POST,
            "provision_standby",
            "/v1/standby".to_string(),
            Some(json!({ "instance_id": instance, "zone": zone, "class": class })),
        )
        .await
    }

    async fn teardown_standby(&self, resource: &StandbyResourceRef) -> ProviderResult<()> {
        let _: Empty = self
            .control(
                Method::DELETE,
                "teardown_standby",
                format!("/v1/standby/{}", resource.resource_id),
                None,
            )
            .await?;
        Ok(())
    }

    async fn sync_to_standby(
        &self,
        instance: &InstanceId,
        resource: &StandbyResourceRef,
    ) -> ProviderResult<SyncReport> {
        self.transfer(
            "sync_to_standby",
            format!("/v1/standby/{}/sync", resource.resource_id),
            json!({ "source_instance": instance, "direction": "to_standby" }),
        )
        .await
    }

    async fn sync_from_standby(
        &self,
        resource: &StandbyResourceRef,
        instance: &InstanceId,
    ) -> ProviderResult<SyncReport> {
        self.transfer(
            "sync_from_standby",
            format!("/v1/standby/{}/sync", resource.resource_id),
            json!({ "target_instance": instance, "direction": "from_standby" }),
        )
        .await
    }

    async fn restore_snapshot(
        &self,
        resource: &StandbyResourceRef,
        snapshot: &SnapshotMeta,
    ) -> ProviderResult<SyncReport> {
        self.transfer(
            "restore_snapshot",
            format!("/v1/standby/{}/restore", resource.resource_id),
            json!({
                "snapshot_id": snapshot.id,
                "location": snapshot.location,
                "content_hash": snapshot.content_hash,
            }),
        )
        .await
    }

    async fn start_services(&self, resource: &StandbyResourceRef) -> ProviderResult<String> {
        let resp: EndpointResponse = self
            .control(
                Method::POST,
                "start_services",
                format!("/v1/standby/{}/services/start", resource.resource_id),
                None,
            )
            .await?;
        Ok(resp.endpoint)
    }
}
