use std::time::Duration;

use crate::config::{env_duration_secs, env_u32};

/// Recovery workflow parameters.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Attempts with the alternate strategy after an activation failure.
    /// Default: 1.
    pub fallback_attempts: u32,
    /// Expiry on the per-instance recovery lease, so a crashed workflow
    /// never wedges an instance. Default: 15 min.
    pub lease_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            fallback_attempts: 1,
            lease_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fallback_attempts: env_u32(
                "LIFELINE_COORDINATOR_FALLBACK_ATTEMPTS",
                defaults.fallback_attempts,
            ),
            lease_ttl: env_duration_secs("LIFELINE_COORDINATOR_LEASE_TTL_SECS", defaults.lease_ttl),
        }
    }

    pub fn for_testing() -> Self {
        Self {
            fallback_attempts: 1,
            lease_ttl: Duration::from_secs(5),
        }
    }
}
