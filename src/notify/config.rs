use std::time::Duration;

use crate::config::{
    env_duration_ms, env_optional_string, env_string, env_u32, env_u64, ConfigError,
};

/// Webhook delivery parameters.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Where notifications are POSTed. `None` disables outbound delivery;
    /// records are still kept.
    pub endpoint: Option<String>,
    /// Key the canonical body is signed with.
    pub signing_key: String,
    /// Bounded queue between the coordinator and the drain task.
    /// Default: 256.
    pub queue_capacity: usize,
    /// Delivery attempts per notification. Default: 3.
    pub attempt_cap: u32,
    /// Backoff before the second attempt; doubles per attempt.
    /// Default: 500ms.
    pub initial_backoff: Duration,
    /// Delivery records retained for the management surface. Default: 1024.
    pub record_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            signing_key: "insecure-dev-key".to_string(),
            queue_capacity: 256,
            attempt_cap: 3,
            initial_backoff: Duration::from_millis(500),
            record_capacity: 1024,
        }
    }
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env_optional_string("LIFELINE_WEBHOOK_ENDPOINT"),
            signing_key: env_string("LIFELINE_WEBHOOK_SIGNING_KEY", defaults.signing_key),
            queue_capacity: env_u64(
                "LIFELINE_NOTIFY_QUEUE_CAPACITY",
                defaults.queue_capacity as u64,
            ) as usize,
            attempt_cap: env_u32("LIFELINE_NOTIFY_ATTEMPT_CAP", defaults.attempt_cap),
            initial_backoff: env_duration_ms(
                "LIFELINE_NOTIFY_INITIAL_BACKOFF_MS",
                defaults.initial_backoff,
            ),
            record_capacity: env_u64(
                "LIFELINE_NOTIFY_RECORD_CAPACITY",
                defaults.record_capacity as u64,
            ) as usize,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "signing_key".to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn for_testing() -> Self {
        Self {
            endpoint: Some("http://localhost:9/webhook".to_string()),
            signing_key: "test-signing-key".to_string(),
            queue_capacity: 32,
            attempt_cap: 3,
            initial_backoff: Duration::from_millis(5),
            record_capacity: 64,
        }
    }
}
