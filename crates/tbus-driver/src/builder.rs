//! Driver builder pattern

use std::sync::Arc;
use tbus_core::MAX_MATRIX_SIZE;
use tbus_transport::{TcpTransport, Transport};

use crate::config::DriverConfig;
use crate::status::{LogSink, StatusSink};
use crate::{Result, RouterDriver};

/// Builder for [`RouterDriver`]
pub struct RouterDriverBuilder {
    config: DriverConfig,
    sink: Option<Arc<dyn StatusSink>>,
}

impl RouterDriverBuilder {
    /// Create a new builder; the matrix defaults to the largest supported size
    pub fn new(host: &str) -> Self {
        Self::from_config(DriverConfig::new(host, MAX_MATRIX_SIZE, MAX_MATRIX_SIZE))
    }

    /// Start from an existing configuration
    pub fn from_config(config: DriverConfig) -> Self {
        Self { config, sink: None }
    }

    /// Set the T-Bus TCP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the NK-IPS bus address
    pub fn address(mut self, address: u8) -> Self {
        self.config.address = address;
        self
    }

    /// Set the number of router sources
    pub fn sources(mut self, sources: u16) -> Self {
        self.config.sources = sources;
        self
    }

    /// Set the number of router destinations
    pub fn destinations(mut self, destinations: u16) -> Self {
        self.config.destinations = destinations;
        self
    }

    /// Set the identifier used in status reports
    pub fn device_id(mut self, id: &str) -> Self {
        self.config.device_id = id.to_string();
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.config.label = Some(label.to_string());
        self
    }

    /// Set heartbeat interval in milliseconds
    pub fn heartbeat_interval(mut self, ms: u64) -> Self {
        self.config.heartbeat_interval_ms = ms;
        self
    }

    /// Set reconnect delay in milliseconds
    pub fn reconnect_delay(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    /// Forget a controller's staged selection after a successful take
    pub fn clear_staging_on_commit(mut self, enabled: bool) -> Self {
        self.config.staging.clear_on_commit = enabled;
        self
    }

    /// Bound the number of controllers with a staged selection
    pub fn max_staged_controllers(mut self, max: usize) -> Self {
        self.config.staging.max_controllers = max;
        self
    }

    /// Send status changes somewhere other than the log
    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build a TCP driver. Does not connect; call [`RouterDriver::start`].
    pub fn build(self) -> Result<RouterDriver<TcpTransport>> {
        self.build_with_transport(TcpTransport::new())
    }

    /// Build a driver over a caller-supplied transport
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<RouterDriver<T>> {
        let sink = self.sink.unwrap_or_else(|| Arc::new(LogSink));
        RouterDriver::new(self.config, transport, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DriverError;

    #[test]
    fn test_builder_defaults() {
        let driver = RouterDriver::builder("10.0.0.20").build().unwrap();
        let config = driver.config();
        assert_eq!(config.port, 5000);
        assert_eq!(config.address, 254);
        assert_eq!(config.sources, 144);
        assert_eq!(config.destinations, 144);
        assert!(!config.staging.clear_on_commit);
    }

    #[test]
    fn test_builder_validates() {
        let result = RouterDriver::builder("10.0.0.20").sources(8).build();
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));

        let result = RouterDriver::builder("10.0.0.20").address(0).build();
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }
}
