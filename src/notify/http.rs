//! HTTP webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::error::{DeliveryError, DeliveryResult};
use super::{DeliveryTransport, SIGNATURE_HEADER};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpTransport {
    endpoint: Option<String>,
    client: Client,
}

impl HttpTransport {
    /// `None` makes delivery a logged no-op; the notifier still records.
    pub fn new(endpoint: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { endpoint, client }
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn deliver(&self, body: &[u8], signature: &str) -> DeliveryResult<()> {
        let Some(endpoint) = &self.endpoint else {
            tracing::debug!("no webhook endpoint configured; notification not sent");
            return Ok(());
        };

        let resp = self
            .client
            .post(endpoint)
            .header(SIGNATURE_HEADER, signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(DeliveryError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}
