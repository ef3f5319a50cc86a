//! HTTP client for the snapshot store service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::error::{SnapshotError, SnapshotResult};
use super::{SnapshotId, SnapshotMeta, SnapshotStore};
use crate::model::InstanceId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpSnapshotStore {
    base_url: String,
    client: Client,
}

impl HttpSnapshotStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[derive(Deserialize)]
struct CreateSnapshotResponse {
    snapshot_id: SnapshotId,
}

#[async_trait]
impl SnapshotStore for HttpSnapshotStore {
    async fn create_snapshot(&self, instance: &InstanceId) -> SnapshotResult<SnapshotId> {
        let url = format!("{}/v1/snapshots/{}", self.base_url, instance);
        let resp = self.client.post(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SnapshotError::Api {
                op: "create_snapshot".to_string(),
                message: resp.status().to_string(),
            });
        }
        let body: CreateSnapshotResponse = resp.json().await?;
        Ok(body.snapshot_id)
    }

    async fn fetch_latest(&self, instance: &InstanceId) -> SnapshotResult<SnapshotMeta> {
        let url = format!("{}/v1/snapshots/{}/latest", self.base_url, instance);
        let resp = self.client.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SnapshotError::NoSnapshot(instance.clone()));
        }
        if !resp.status().is_success() {
            return Err(SnapshotError::Api {
                op: "fetch_latest".to_string(),
                message: resp.status().to_string(),
            });
        }
        Ok(resp.json().await?)
    }
}
