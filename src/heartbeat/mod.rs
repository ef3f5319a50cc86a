//! Per-instance liveness probing and miss accounting.
//!
//! One independent probe task runs per protected instance. Two consecutive
//! misses inside the miss window latch the instance degraded and emit
//! exactly one [`Signal::Degraded`] per incident; the latch clears only on
//! an explicit acknowledgment from the coordinator, never from a single
//! healthy probe.

pub mod config;
pub mod monitor;

#[cfg(test)]
mod tests;

pub use config::HeartbeatConfig;
pub use monitor::HeartbeatMonitor;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::model::InstanceId;

/// Result of one liveness probe.
///
/// Transport errors (the probe could not be delivered at all) are tracked
/// separately from instance-reported unhealthiness: the probe path being
/// broken is not evidence that the instance is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy,
    TransportError,
}

#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, instance: &InstanceId) -> ProbeOutcome;
}

/// Probes the instance's health endpoint through the marketplace.
pub struct HttpProbe {
    base_url: String,
    client: Client,
}

impl HttpProbe {
    pub fn new(base_url: impl Into<String>, probe_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(probe_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, instance: &InstanceId) -> ProbeOutcome {
        let url = format!("{}/v1/instances/{instance}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Healthy,
            Ok(_) => ProbeOutcome::Unhealthy,
            Err(_) => ProbeOutcome::TransportError,
        }
    }
}

/// Scripted probe for tests: plays back per-instance outcome sequences,
/// then repeats the configured default.
#[cfg(any(test, feature = "mock"))]
pub struct MockProbe {
    scripts: parking_lot::Mutex<std::collections::HashMap<InstanceId, std::collections::VecDeque<ProbeOutcome>>>,
    default: parking_lot::Mutex<ProbeOutcome>,
}

#[cfg(any(test, feature = "mock"))]
impl Default for MockProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "mock"))]
impl MockProbe {
    pub fn new() -> Self {
        Self {
            scripts: parking_lot::Mutex::new(std::collections::HashMap::new()),
            default: parking_lot::Mutex::new(ProbeOutcome::Healthy),
        }
    }

    pub fn script(&self, instance: &InstanceId, outcomes: impl IntoIterator<Item = ProbeOutcome>) {
        self.scripts
            .lock()
            .entry(instance.clone())
            .or_default()
            .extend(outcomes);
    }

    pub fn set_default(&self, outcome: ProbeOutcome) {
        *self.default.lock() = outcome;
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl Probe for MockProbe {
    async fn probe(&self, instance: &InstanceId) -> ProbeOutcome {
        if let Some(queue) = self.scripts.lock().get_mut(instance)
            && let Some(outcome) = queue.pop_front()
        {
            return outcome;
        }
        *self.default.lock()
    }
}
