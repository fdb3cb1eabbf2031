//! Error types for T-Bus encoding

use thiserror::Error;

/// Result type alias for T-Bus codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// T-Bus codec error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bus address 0 is not addressable on T-Bus
    #[error("invalid bus address: {0} (expected 1-255)")]
    InvalidBusAddress(u8),

    /// 1-based matrix index that cannot be represented on the wire
    #[error("{field} index out of range: {value} (indices are 1-based)")]
    IndexOutOfRange { field: &'static str, value: u16 },

    /// Level value that is not one of the eight defined levels
    #[error("unknown level: {0}")]
    UnknownLevel(String),

    /// Frame buffer too small
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Outer header did not match `PAS2` + length
    #[error("invalid frame header")]
    InvalidHeader,

    /// Command family or sub-command marker mismatch
    #[error("invalid {0} marker")]
    InvalidMarker(&'static str),

    /// Checksum carried by the frame does not match its payload
    #[error("checksum mismatch: expected 0x{expected:04x}, got 0x{actual:04x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
}
