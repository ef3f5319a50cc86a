//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `LIFELINE_*` environment
//! variables. Subsystem configs (heartbeat, warm pool, standby, coordinator,
//! notifier) live next to their modules and use the same helpers.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `LIFELINE_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port. Default: `8080`.
    pub port: u16,

    /// IP address to bind to. Default: `127.0.0.1`.
    pub bind_addr: IpAddr,

    /// Marketplace provisioning API endpoint. Default: `http://localhost:7070`.
    pub marketplace_url: String,

    /// Snapshot store endpoint. Default: `http://localhost:7071`.
    pub snapshot_url: String,
}

pub const DEFAULT_MARKETPLACE_URL: &str = "http://localhost:7070";
pub const DEFAULT_SNAPSHOT_URL: &str = "http://localhost:7071";

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            marketplace_url: DEFAULT_MARKETPLACE_URL.to_string(),
            snapshot_url: DEFAULT_SNAPSHOT_URL.to_string(),
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "LIFELINE_PORT";
    const ENV_BIND_ADDR: &'static str = "LIFELINE_BIND_ADDR";
    const ENV_MARKETPLACE_URL: &'static str = "LIFELINE_MARKETPLACE_URL";
    const ENV_SNAPSHOT_URL: &'static str = "LIFELINE_SNAPSHOT_URL";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let marketplace_url = env_string(Self::ENV_MARKETPLACE_URL, defaults.marketplace_url);
        let snapshot_url = env_string(Self::ENV_SNAPSHOT_URL, defaults.snapshot_url);

        Ok(Self {
            port,
            bind_addr,
            marketplace_url,
            snapshot_url,
        })
    }

    /// Validates basic invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("marketplace_url", &self.marketplace_url),
            ("snapshot_url", &self.snapshot_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: name.to_string(),
                    value: url.clone(),
                    reason: "must be an http(s) URL".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns `"{bind_addr}:{port}"` (useful for logging/binding).
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }
}

pub(crate) fn env_string(var_name: &str, default: String) -> String {
    env::var(var_name).unwrap_or(default)
}

pub(crate) fn env_optional_string(var_name: &str) -> Option<String> {
    env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_u64(var_name: &str, default: u64) -> u64 {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u32(var_name: &str, default: u32) -> u32 {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_duration_secs(var_name: &str, default: Duration) -> Duration {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

pub(crate) fn env_duration_ms(var_name: &str, default: Duration) -> Duration {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
