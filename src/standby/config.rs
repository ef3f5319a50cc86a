use std::time::Duration;

use crate::config::{env_duration_ms, env_duration_secs, env_string, env_u32, ConfigError};

/// Sync intervals shorter than this would saturate the transfer path.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);
/// Sync intervals longer than this make activation effectively cold.
pub const MAX_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// External fallback resource parameters.
#[derive(Debug, Clone)]
pub struct StandbyConfig {
    /// Zone the fallback resource is provisioned in.
    pub zone: String,
    /// Machine class of the fallback resource.
    pub class: String,
    /// Incremental sync cadence while the primary is healthy. Default: 30s.
    pub sync_interval: Duration,
    /// End-to-end activation budget, dominated by transfer size.
    /// Default: 480s (8 min).
    pub activation_budget: Duration,
    /// Transfer attempts before a sync or fetch is declared failed.
    /// Default: 3.
    pub transfer_retries: u32,
    /// Provisioning attempts before giving up. Default: 3.
    pub provision_retries: u32,
    /// Delay between retry attempts. Default: 500ms.
    pub retry_backoff: Duration,
}

impl Default for StandbyConfig {
    fn default() -> Self {
        Self {
            zone: "fsn1".to_string(),
            class: "cpu-8-32".to_string(),
            sync_interval: Duration::from_secs(30),
            activation_budget: Duration::from_secs(480),
            transfer_retries: 3,
            provision_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl StandbyConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            zone: env_string("LIFELINE_STANDBY_ZONE", defaults.zone),
            class: env_string("LIFELINE_STANDBY_CLASS", defaults.class),
            sync_interval: env_duration_secs(
                "LIFELINE_STANDBY_SYNC_INTERVAL_SECS",
                defaults.sync_interval,
            ),
            activation_budget: env_duration_secs(
                "LIFELINE_STANDBY_ACTIVATION_BUDGET_SECS",
                defaults.activation_budget,
            ),
            transfer_retries: env_u32("LIFELINE_STANDBY_TRANSFER_RETRIES", defaults.transfer_retries),
            provision_retries: env_u32(
                "LIFELINE_STANDBY_PROVISION_RETRIES",
                defaults.provision_retries,
            ),
            retry_backoff: env_duration_ms("LIFELINE_STANDBY_RETRY_BACKOFF_MS", defaults.retry_backoff),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_interval < MIN_SYNC_INTERVAL || self.sync_interval > MAX_SYNC_INTERVAL {
            return Err(ConfigError::InvalidValue {
                field: "sync_interval".to_string(),
                value: format!("{:?}", self.sync_interval),
                reason: format!("must be between {MIN_SYNC_INTERVAL:?} and {MAX_SYNC_INTERVAL:?}"),
            });
        }
        Ok(())
    }

    pub fn for_testing() -> Self {
        Self {
            zone: "test-zone".to_string(),
            class: "cpu-test".to_string(),
            sync_interval: Duration::from_millis(25),
            activation_budget: Duration::from_millis(400),
            transfer_retries: 2,
            provision_retries: 2,
            retry_backoff: Duration::from_millis(5),
        }
    }
}
