use std::time::Duration;

use crate::config::{env_duration_ms, env_duration_secs};

/// Warm-pool activation parameters.
#[derive(Debug, Clone)]
pub struct WarmPoolConfig {
    /// Hard deadline for the standby slot to reach ready. Exceeding it is
    /// an activation failure, not a retry. Default: 90s.
    pub activation_timeout: Duration,
    /// How often the booting slot is polled. Default: 2s.
    pub boot_poll_interval: Duration,
}

impl Default for WarmPoolConfig {
    fn default() -> Self {
        Self {
            activation_timeout: Duration::from_secs(90),
            boot_poll_interval: Duration::from_secs(2),
        }
    }
}

impl WarmPoolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            activation_timeout: env_duration_secs(
                "LIFELINE_WARMPOOL_ACTIVATION_TIMEOUT_SECS",
                defaults.activation_timeout,
            ),
            boot_poll_interval: env_duration_ms(
                "LIFELINE_WARMPOOL_BOOT_POLL_MS",
                defaults.boot_poll_interval,
            ),
        }
    }

    pub fn for_testing() -> Self {
        Self {
            activation_timeout: Duration::from_millis(200),
            boot_poll_interval: Duration::from_millis(5),
        }
    }
}
