//! Property tests for the checksum and BCD helpers in `util`.

use dlt645_rs::util::{bcd_byte, checksum, decode_bcd, encode_bcd, parse_hex_lenient};
use dlt645_rs::Dlt645Error;
use proptest::prelude::*;

#[test]
fn test_meter_address_bcd() {
    let bcd = encode_bcd(304_257_140_001, 6);
    assert_eq!(bcd, vec![0x30, 0x42, 0x57, 0x14, 0x00, 0x01]);
    assert_eq!(decode_bcd(&bcd, 6).unwrap(), 304_257_140_001);
}

#[test]
fn test_decode_bcd_considers_trailing_bytes() {
    assert_eq!(decode_bcd(&[0x12, 0x34, 0x56], 2).unwrap(), 3456);
    assert_eq!(decode_bcd(&[0x12], 4).unwrap(), 12);
}

#[test]
fn test_decode_bcd_rejects_hex_digits() {
    assert!(matches!(
        decode_bcd(&[0x12, 0xA0], 2),
        Err(Dlt645Error::InvalidBcd(0xA0))
    ));
}

#[test]
fn test_bcd_byte() {
    assert_eq!(bcd_byte(59), 0x59);
    assert_eq!(bcd_byte(7), 0x07);
}

#[test]
fn test_checksum_of_frame_header() {
    let header = [0x68, 0x01, 0x00, 0x14, 0x57, 0x42, 0x30, 0x68, 0x11, 0x00];
    assert_eq!(checksum(&header), 0xBF);
}

#[test]
fn test_parse_bus_monitor_dump() {
    let bytes = parse_hex_lenient("FE FE 68-01:00").unwrap();
    assert_eq!(bytes, vec![0xFE, 0xFE, 0x68, 0x01, 0x00]);
}

proptest! {
    #[test]
    fn prop_bcd_roundtrip(size in 1usize..=9, value in any::<u64>()) {
        let value = value % 10u64.pow(2 * size as u32);
        prop_assert_eq!(decode_bcd(&encode_bcd(value, size), size).unwrap(), value);
    }

    #[test]
    fn prop_bcd_nibbles_are_decimal(value in any::<u64>()) {
        for byte in encode_bcd(value, 10) {
            prop_assert!(byte >> 4 <= 9 && byte & 0x0F <= 9);
        }
    }

    #[test]
    fn prop_checksum_is_additive(
        a in proptest::collection::vec(any::<u8>(), 0..64),
        b in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let joined: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
        prop_assert_eq!(checksum(&joined), checksum(&a).wrapping_add(checksum(&b)));
    }
}
