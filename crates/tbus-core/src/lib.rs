//! T-Bus Core
//!
//! Wire-level primitives for the T-Bus over TCP protocol spoken by the
//! Ross NK-IPS router control interface.
//!
//! This crate provides:
//! - Signal levels and the crosspoint command model ([`Level`], [`CrosspointCommand`])
//! - The frame checksum ([`checksum::crc16`])
//! - Crosspoint frame encoding/decoding ([`codec`], [`CrosspointFrame`])
//! - The fixed handshake and heartbeat frames
//!
//! Nothing in here performs I/O.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod types;

pub use checksum::crc16;
pub use codec::{encode_crosspoint, CrosspointFrame, HANDSHAKE_FRAME, HEARTBEAT_FRAME};
pub use error::{Error, Result};
pub use types::{CrosspointCommand, Level};

/// Default T-Bus address of an NK-IPS control unit
pub const DEFAULT_BUS_ADDRESS: u8 = 254;

/// Default TCP port of the NK-IPS T-Bus listener
pub const DEFAULT_PORT: u16 = 5000;

/// Smallest matrix edge (sources or destinations) an NK router is configured with
pub const MIN_MATRIX_SIZE: u16 = 16;

/// Largest matrix edge (sources or destinations) an NK router is configured with
pub const MAX_MATRIX_SIZE: u16 = 144;
