use std::time::Duration;

use crate::config::{env_duration_ms, env_duration_secs, env_u32};

/// Liveness probing parameters.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often each instance is probed. Default: 30s.
    pub probe_interval: Duration,
    /// Per-probe delivery deadline; exceeding it is a transport error,
    /// not a miss. Default: 10s.
    pub probe_timeout: Duration,
    /// Consecutive misses that flag the instance degraded. Default: 2.
    pub miss_threshold: u32,
    /// Misses further apart than this do not count as consecutive.
    /// Default: 60s.
    pub miss_window: Duration,
    /// Transport errors younger than this never count as misses, so probe
    /// infrastructure noise alone cannot trigger a failover. Default: 45s.
    pub transport_grace: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            miss_threshold: 2,
            miss_window: Duration::from_secs(60),
            transport_grace: Duration::from_secs(45),
        }
    }
}

impl HeartbeatConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            probe_interval: env_duration_secs(
                "LIFELINE_PROBE_INTERVAL_SECS",
                defaults.probe_interval,
            ),
            probe_timeout: env_duration_ms("LIFELINE_PROBE_TIMEOUT_MS", defaults.probe_timeout),
            miss_threshold: env_u32("LIFELINE_MISS_THRESHOLD", defaults.miss_threshold).max(1),
            miss_window: env_duration_secs("LIFELINE_MISS_WINDOW_SECS", defaults.miss_window),
            transport_grace: env_duration_secs(
                "LIFELINE_TRANSPORT_GRACE_SECS",
                defaults.transport_grace,
            ),
        }
    }

    /// Compressed timings for tests.
    pub fn for_testing() -> Self {
        Self {
            probe_interval: Duration::from_millis(25),
            probe_timeout: Duration::from_millis(50),
            miss_threshold: 2,
            miss_window: Duration::from_millis(500),
            transport_grace: Duration::from_millis(100),
        }
    }
}
