//! T-Bus Transport Layer
//!
//! The router session only needs connect/send/close plus close and error
//! notifications, so the transport is pluggable:
//! - TCP (direct socket to the NK-IPS, keep-alive enabled)
//! - Channel (the host application owns the wire; used for tests too)

pub mod error;
pub mod traits;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "channel")]
pub mod channel;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

#[cfg(feature = "tcp")]
pub use tcp::{TcpConfig, TcpReceiver, TcpSender, TcpTransport};

#[cfg(feature = "channel")]
pub use channel::{ChannelConnection, ChannelListener, ChannelReceiver, ChannelSender, ChannelTransport};
