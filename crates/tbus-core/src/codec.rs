//! Crosspoint frame encoding/decoding
//!
//! T-Bus crosspoint frame format (all fields big-endian):
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Bytes 0-3:   "PAS2" outer header                                │
//! │ Bytes 4-5:   Length of payload + checksum (0x0012)              │
//! ├──────────────────────── payload ────────────────────────────────┤
//! │ Bytes 6-9:   Command family "NK2\0" (4e 4b 32 00)               │
//! │ Byte  10:    Bus address (1-255)                                │
//! │ Bytes 11-12: Sub-command "set crosspoint" (04 09)               │
//! │ Bytes 13-14: Destination index (0-based)                        │
//! │ Bytes 15-16: Source index (0-based)                             │
//! │ Bytes 17-20: Level bitmask value                                │
//! │ Byte  21:    0x00                                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Bytes 22-23: Checksum over the payload                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::checksum::crc16;
use crate::{CrosspointCommand, Error, Level, Result};

/// Outer frame header: "PAS2"
pub const FRAME_MAGIC: [u8; 4] = *b"PAS2";

/// Command family marker: "NK2\0"
pub const COMMAND_FAMILY: [u8; 4] = [0x4e, 0x4b, 0x32, 0x00];

/// Sub-command marker for "set crosspoint"
pub const SET_CROSSPOINT: [u8; 2] = [0x04, 0x09];

/// Outer header size (magic + length)
pub const HEADER_SIZE: usize = 6;

/// Payload size, excluding checksum
pub const PAYLOAD_SIZE: usize = 16;

/// Checksum size
pub const CHECKSUM_SIZE: usize = 2;

/// Total crosspoint frame size
pub const FRAME_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE + CHECKSUM_SIZE;

/// Sent exactly once, immediately after the socket connects
pub const HANDSHAKE_FRAME: &[u8] = b"phoenix-db z\n";

/// Sent on every heartbeat tick while connected
pub const HEARTBEAT_FRAME: &[u8] = b"hi\n";

fn wire_index(field: &'static str, value: u16) -> Result<u16> {
    value
        .checked_sub(1)
        .ok_or(Error::IndexOutOfRange { field, value })
}

/// Encode a crosspoint change addressed to `address`.
///
/// `destination` and `source` are 1-based. Address 0 and index 0 are
/// rejected rather than wrapped.
pub fn encode_crosspoint(address: u8, level: Level, destination: u16, source: u16) -> Result<Bytes> {
    if address == 0 {
        return Err(Error::InvalidBusAddress(address));
    }
    let destination = wire_index("destination", destination)?;
    let source = wire_index("source", source)?;

    let mut buf = BytesMut::with_capacity(FRAME_SIZE);

    buf.extend_from_slice(&FRAME_MAGIC);
    buf.put_u16((PAYLOAD_SIZE + CHECKSUM_SIZE) as u16);

    buf.extend_from_slice(&COMMAND_FAMILY);
    buf.put_u8(address);
    buf.extend_from_slice(&SET_CROSSPOINT);
    buf.put_u16(destination);
    buf.put_u16(source);
    buf.put_u32(level.bits());
    buf.put_u8(0);

    // Always two bytes, including checksums with a zero high byte
    let checksum = crc16(&buf[HEADER_SIZE..]);
    buf.put_u16(checksum);

    Ok(buf.freeze())
}

/// Encode a [`CrosspointCommand`] addressed to `address`
pub fn encode_command(address: u8, command: &CrosspointCommand) -> Result<Bytes> {
    encode_crosspoint(address, command.level, command.destination, command.source)
}

/// A decoded crosspoint frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrosspointFrame {
    pub address: u8,
    pub command: CrosspointCommand,
}

impl CrosspointFrame {
    /// Decode a crosspoint frame, verifying markers and checksum
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAME_SIZE {
            return Err(Error::BufferTooSmall {
                needed: FRAME_SIZE,
                have: buf.len(),
            });
        }

        let mut header = &buf[..HEADER_SIZE];
        if header[..4] != FRAME_MAGIC {
            return Err(Error::InvalidHeader);
        }
        header.advance(4);
        if header.get_u16() as usize != PAYLOAD_SIZE + CHECKSUM_SIZE {
            return Err(Error::InvalidHeader);
        }

        let payload = &buf[HEADER_SIZE..HEADER_SIZE + PAYLOAD_SIZE];
        let actual = (&buf[HEADER_SIZE + PAYLOAD_SIZE..FRAME_SIZE]).get_u16();
        let expected = crc16(payload);
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let mut payload = payload;
        if payload[..4] != COMMAND_FAMILY {
            return Err(Error::InvalidMarker("command family"));
        }
        payload.advance(4);
        let address = payload.get_u8();
        if payload[..2] != SET_CROSSPOINT {
            return Err(Error::InvalidMarker("set crosspoint"));
        }
        payload.advance(2);
        let destination = payload.get_u16();
        let source = payload.get_u16();
        let bits = payload.get_u32();
        let level =
            Level::from_bits(bits).ok_or_else(|| Error::UnknownLevel(format!("0x{:08x}", bits)))?;

        Ok(Self {
            address,
            command: CrosspointCommand {
                level,
                destination: destination.wrapping_add(1),
                source: source.wrapping_add(1),
            },
        })
    }

    /// Re-encode this frame
    pub fn encode(&self) -> Result<Bytes> {
        encode_command(self.address, &self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        let frame = encode_crosspoint(1, Level::MdVideo, 1, 1).unwrap();
        assert_eq!(frame.len(), FRAME_SIZE);
        assert_eq!(FRAME_SIZE, 24);
    }

    #[test]
    fn test_length_field_counts_payload_and_checksum() {
        let frame = encode_crosspoint(254, Level::SdiVideo, 5, 10).unwrap();
        assert_eq!(&frame[..4], b"PAS2");
        assert_eq!(&frame[4..6], &[0x00, 0x12]);
    }

    #[test]
    fn test_zero_indices_rejected() {
        assert_eq!(
            encode_crosspoint(254, Level::SdiVideo, 0, 1),
            Err(Error::IndexOutOfRange {
                field: "destination",
                value: 0
            })
        );
        assert_eq!(
            encode_crosspoint(254, Level::SdiVideo, 1, 0),
            Err(Error::IndexOutOfRange {
                field: "source",
                value: 0
            })
        );
    }

    #[test]
    fn test_zero_address_rejected() {
        assert_eq!(
            encode_crosspoint(0, Level::SdiVideo, 1, 1),
            Err(Error::InvalidBusAddress(0))
        );
    }

    #[test]
    fn test_decode_rejects_corrupted_checksum() {
        let mut frame = encode_crosspoint(254, Level::SdiVideo, 5, 10).unwrap().to_vec();
        frame[FRAME_SIZE - 1] ^= 0xFF;
        assert!(matches!(
            CrosspointFrame::decode(&frame),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_truncated() {
        let frame = encode_crosspoint(254, Level::SdiVideo, 5, 10).unwrap();
        assert_eq!(
            CrosspointFrame::decode(&frame[..22]),
            Err(Error::BufferTooSmall {
                needed: 24,
                have: 22
            })
        );
    }
}
