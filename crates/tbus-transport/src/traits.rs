//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Events that can occur on a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Data received
    Data(Bytes),
    /// Error occurred; the connection is about to close
    Error(String),
}

/// Trait for sending data
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send data
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving data
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event. `None` means the connection is gone.
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Main transport trait
///
/// A transport is a factory for connections; the session calls
/// [`Transport::connect`] once per connection attempt.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The sender type for this transport
    type Sender: TransportSender + 'static;
    /// The receiver type for this transport
    type Receiver: TransportReceiver + 'static;

    /// Connect to a remote endpoint (`host:port`)
    async fn connect(&self, addr: &str) -> Result<(Self::Sender, Self::Receiver)>;
}
