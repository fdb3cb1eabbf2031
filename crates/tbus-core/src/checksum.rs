//! Frame checksum
//!
//! CRC-16 with the reflected polynomial 0xA001, seeded with 0xFFFF and
//! processed LSB-first. The accumulator is byte-swapped before it is
//! returned, so writing the result big-endian puts the low CRC byte first
//! on the wire.

const POLYNOMIAL: u16 = 0xA001;
const SEED: u16 = 0xFFFF;

/// Compute the T-Bus checksum of `bytes`.
///
/// ```
/// use tbus_core::crc16;
///
/// assert_eq!(crc16(b""), 0xFFFF);
/// assert_eq!(crc16(b"123456789"), 0x374B);
/// ```
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = SEED;
    for &byte in bytes {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }
    crc.swap_bytes()
}
