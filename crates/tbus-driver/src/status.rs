//! Device status reporting

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Status of a device as shown in the host's registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum DeviceStatus {
    Connected,
    Error(String),
    Closed,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Connected => f.write_str("connected"),
            DeviceStatus::Error(detail) => write!(f, "error: {}", detail),
            DeviceStatus::Closed => f.write_str("closed"),
        }
    }
}

/// A status change for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub device_id: String,
    pub status: DeviceStatus,
}

/// Receives status changes. Implementations must not block.
pub trait StatusSink: Send + Sync + 'static {
    fn report(&self, device_id: &str, status: DeviceStatus);
}

impl StatusSink for mpsc::UnboundedSender<StatusUpdate> {
    fn report(&self, device_id: &str, status: DeviceStatus) {
        let _ = self.send(StatusUpdate {
            device_id: device_id.to_string(),
            status,
        });
    }
}

/// Sink for hosts without a registry; status only reaches the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&self, device_id: &str, status: DeviceStatus) {
        debug!(device = %device_id, %status, "Device status");
    }
}
