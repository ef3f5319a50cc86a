//! HTTP client helpers for tests.

use std::time::Duration;

use serde_json::{Value, json};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

pub struct TestClient {
    client: reqwest::Client,
    base_url: String,
}

impl TestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("request failed");
        Self::split(response).await
    }

    pub async fn post(&self, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut builder = self.client.post(self.url(path));
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await.expect("request failed");
        Self::split(response).await
    }

    pub async fn put(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("request failed");
        Self::split(response).await
    }

    pub async fn delete(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("request failed");
        Self::split(response).await
    }

    /// Registers an instance on a host with the given shape. The caller
    /// seeds the slot on the mock provider first.
    pub async fn register_instance(
        &self,
        id: &str,
        host: &str,
        slot: &str,
        slots_total: u32,
        shared_volume_capable: bool,
    ) -> (u16, Value) {
        self.post(
            "/v1/instances",
            Some(json!({
                "instance_id": id,
                "host": {
                    "id": host,
                    "region": "eu-west",
                    "slots_total": slots_total,
                    "slots_used": 1,
                    "shared_volume_capable": shared_volume_capable,
                },
                "slot_id": slot,
                "spec": {
                    "gpu_model": "RTX 4090",
                    "gpu_count": 1,
                    "volume_gb": 50,
                },
            })),
        )
        .await
    }

    async fn split(response: reqwest::Response) -> (u16, Value) {
        let status = response.status().as_u16();
        let bytes = response.bytes().await.expect("body read failed");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body was not JSON")
        };
        (status, json)
    }
}
