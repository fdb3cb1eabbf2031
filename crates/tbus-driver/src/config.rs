//! Driver configuration
//!
//! Mirrors the fields a host collects for an NK-IPS device. Loadable from
//! JSON; missing optional fields fall back to the `default_*` values below.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tbus_core::{DEFAULT_BUS_ADDRESS, DEFAULT_PORT, MAX_MATRIX_SIZE, MIN_MATRIX_SIZE};

use crate::session::SessionConfig;
use crate::{DriverError, Result};

/// Multi-stage crosspoint staging policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Upper bound on controllers with a staged selection
    #[serde(default = "default_max_controllers")]
    pub max_controllers: usize,
    /// Forget a controller's selection after a successful take
    #[serde(default)]
    pub clear_on_commit: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            max_controllers: default_max_controllers(),
            clear_on_commit: false,
        }
    }
}

/// NK-IPS driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Identifier used when reporting status
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Human-readable device label, used in logs
    #[serde(default)]
    pub label: Option<String>,
    /// NK-IPS hostname or IP address
    pub host: String,
    /// T-Bus TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// T-Bus address of the NK-IPS itself (not of the router behind it)
    #[serde(default = "default_address")]
    pub address: u8,
    /// Number of router sources
    pub sources: u16,
    /// Number of router destinations
    pub destinations: u16,
    /// Heartbeat interval in milliseconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Delay before reconnecting after a close, in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    #[serde(default)]
    pub staging: StagingConfig,
}

fn default_device_id() -> String {
    "nk-ips".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_address() -> u8 {
    DEFAULT_BUS_ADDRESS
}

fn default_heartbeat_interval() -> u64 {
    10_000
}

fn default_reconnect_delay() -> u64 {
    10_000
}

fn default_max_controllers() -> usize {
    1024
}

impl DriverConfig {
    /// Configuration with defaults for everything but the host and matrix shape
    pub fn new(host: &str, sources: u16, destinations: u16) -> Self {
        Self {
            device_id: default_device_id(),
            label: None,
            host: host.to_string(),
            port: default_port(),
            address: default_address(),
            sources,
            destinations,
            heartbeat_interval_ms: default_heartbeat_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
            staging: StagingConfig::default(),
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field against the ranges the device accepts
    pub fn validate(&self) -> Result<()> {
        let host = self.host.trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(DriverError::InvalidConfig(format!(
                "invalid host: {:?}",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(DriverError::InvalidConfig("port must be 1-65535".into()));
        }
        if self.address == 0 {
            return Err(DriverError::InvalidConfig(
                "bus address must be 1-255".into(),
            ));
        }
        for (name, value) in [("sources", self.sources), ("destinations", self.destinations)] {
            if !(MIN_MATRIX_SIZE..=MAX_MATRIX_SIZE).contains(&value) {
                return Err(DriverError::InvalidConfig(format!(
                    "{} must be {}-{}, got {}",
                    name, MIN_MATRIX_SIZE, MAX_MATRIX_SIZE, value
                )));
            }
        }
        if self.heartbeat_interval_ms == 0 || self.reconnect_delay_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "heartbeat interval and reconnect delay must be non-zero".into(),
            ));
        }
        if self.staging.max_controllers == 0 {
            return Err(DriverError::InvalidConfig(
                "staging.max_controllers must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` as handed to the transport
    pub fn target(&self) -> String {
        format!("{}:{}", self.host.trim(), self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Name shown in logs; the device id when no label is set
    pub fn display_label(&self) -> &str {
        match self.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => &self.device_id,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            device_id: self.device_id.clone(),
            label: self.display_label().to_string(),
            target: self.target(),
            heartbeat_interval: self.heartbeat_interval(),
            reconnect_delay: self.reconnect_delay(),
        }
    }
}
