//! Crosspoint frame tests against captured wire fixtures

use tbus_core::codec::{encode_command, FRAME_SIZE, HEADER_SIZE, PAYLOAD_SIZE};
use tbus_core::{crc16, encode_crosspoint, CrosspointCommand, CrosspointFrame, Level};

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[test]
fn test_canonical_fixture() {
    // Address 254, destination 5, source 10, SDI Video
    let frame = encode_crosspoint(254, Level::SdiVideo, 5, 10).expect("encode failed");

    let expected = concat!(
        "504153320012", // header
        "4e4b3200",     // command family
        "fe",           // bus address
        "0409",         // set crosspoint
        "0004",         // destination - 1
        "0009",         // source - 1
        "00000002",     // level
        "00",
        "5c62", // checksum
    );
    assert_eq!(hex(&frame), expected);
}

#[test]
fn test_checksum_covers_payload_only() {
    let frame = encode_crosspoint(254, Level::SdiVideo, 5, 10).unwrap();
    let payload = &frame[HEADER_SIZE..HEADER_SIZE + PAYLOAD_SIZE];
    let checksum = u16::from_be_bytes([frame[FRAME_SIZE - 2], frame[FRAME_SIZE - 1]]);
    assert_eq!(checksum, crc16(payload));
}

#[test]
fn test_checksum_with_zero_high_byte_keeps_width() {
    // This payload checksums to 0x0035
    let frame = encode_crosspoint(254, Level::MdVideo, 36, 129).unwrap();
    assert_eq!(frame.len(), FRAME_SIZE);
    assert_eq!(&frame[FRAME_SIZE - 2..], &[0x00, 0x35]);
    assert_eq!(
        hex(&frame),
        "5041533200124e4b3200fe04090023008000000001000035"
    );
}

#[test]
fn test_extreme_matrix_corner() {
    let frame = encode_crosspoint(1, Level::MachineControl, 144, 144).unwrap();
    assert_eq!(
        hex(&frame),
        "5041533200124e4b3200010409008f008f00000080003da2"
    );
}

#[test]
fn test_payload_fields_at_fixed_offsets() {
    for level in Level::ALL {
        for (address, destination, source) in [(1u8, 1u16, 144u16), (254, 5, 10), (255, 144, 1)] {
            let frame = encode_crosspoint(address, level, destination, source).unwrap();
            let payload = &frame[HEADER_SIZE..];

            assert_eq!(payload[4], address);
            assert_eq!(u16::from_be_bytes([payload[7], payload[8]]), destination - 1);
            assert_eq!(u16::from_be_bytes([payload[9], payload[10]]), source - 1);
            assert_eq!(
                u32::from_be_bytes([payload[11], payload[12], payload[13], payload[14]]),
                level.bits()
            );
            assert_eq!(payload[15], 0);
        }
    }
}

#[test]
fn test_decode_encoded_frame() {
    let command = CrosspointCommand::new(Level::AesAudio2, 17, 99);
    let frame = encode_command(42, &command).unwrap();

    let decoded = CrosspointFrame::decode(&frame).expect("decode failed");
    assert_eq!(decoded.address, 42);
    assert_eq!(decoded.command, command);
    assert_eq!(decoded.encode().unwrap(), frame);
}

#[test]
fn test_decode_rejects_foreign_header() {
    let mut frame = encode_crosspoint(254, Level::SdiVideo, 5, 10).unwrap().to_vec();
    frame[0] = b'X';
    assert!(CrosspointFrame::decode(&frame).is_err());
}

#[test]
fn test_handshake_and_heartbeat_are_distinct() {
    assert_ne!(tbus_core::HANDSHAKE_FRAME, tbus_core::HEARTBEAT_FRAME);
    assert!(!tbus_core::HANDSHAKE_FRAME.is_empty());
    assert!(!tbus_core::HEARTBEAT_FRAME.is_empty());
}

#[test]
fn test_level_serde_names() {
    let json = serde_json::to_string(&Level::SdiVideo).unwrap();
    assert_eq!(json, "\"sdi-video\"");
    let level: Level = serde_json::from_str("\"machine-control\"").unwrap();
    assert_eq!(level, Level::MachineControl);
}
