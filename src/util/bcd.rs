//! # Packed BCD Encoding
//!
//! Meter addresses and date fields travel as packed binary-coded decimal:
//! each byte holds two decimal digits, tens in the high nibble and units in
//! the low nibble. Multi-byte values are most significant byte first.

use crate::error::{Dlt645Error, Result};

/// Encodes `value` into exactly `size` BCD bytes.
///
/// Leading bytes that are not needed are zero. Digits that do not fit into
/// `size` bytes are dropped.
pub fn encode_bcd(value: u64, size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    let mut remainder = value;
    for pos in (0..size).rev() {
        if remainder == 0 {
            break;
        }
        let tail = (remainder % 100) as u8;
        buf[pos] = ((tail / 10) << 4) | (tail % 10);
        remainder /= 100;
    }
    buf
}

/// Encodes a value in `0..=99` into one BCD byte.
pub fn bcd_byte(value: u8) -> u8 {
    let value = value % 100;
    ((value / 10) << 4) | (value % 10)
}

/// Decodes the last `size` bytes of `bytes` as a BCD number.
///
/// Extra leading bytes are ignored. A nibble above 9 yields
/// [`Dlt645Error::InvalidBcd`].
pub fn decode_bcd(bytes: &[u8], size: usize) -> Result<u64> {
    let bytes = if bytes.len() > size {
        &bytes[bytes.len() - size..]
    } else {
        bytes
    };

    bytes.iter().try_fold(0u64, |acc, &b| {
        let (hi, lo) = (b >> 4, b & 0x0F);
        if hi > 9 || lo > 9 {
            return Err(Dlt645Error::InvalidBcd(b));
        }
        acc.checked_mul(100)
            .and_then(|v| v.checked_add(u64::from(hi * 10 + lo)))
            .ok_or(Dlt645Error::BcdOverflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_meter_address() {
        assert_eq!(
            encode_bcd(304_257_140_001, 6),
            vec![0x30, 0x42, 0x57, 0x14, 0x00, 0x01]
        );
    }

    #[test]
    fn test_encode_pads_leading_zeros() {
        assert_eq!(encode_bcd(7, 3), vec![0x00, 0x00, 0x07]);
        assert_eq!(encode_bcd(0, 2), vec![0x00, 0x00]);
    }

    #[test]
    fn test_encode_truncates_high_digits() {
        assert_eq!(encode_bcd(123_456, 2), vec![0x34, 0x56]);
    }

    #[test]
    fn test_decode_ignores_extra_leading_bytes() {
        assert_eq!(decode_bcd(&[0x99, 0x12, 0x34], 2).unwrap(), 1234);
    }

    #[test]
    fn test_decode_rejects_invalid_nibble() {
        assert!(matches!(
            decode_bcd(&[0x12, 0x3A], 2),
            Err(Dlt645Error::InvalidBcd(0x3A))
        ));
        assert!(matches!(
            decode_bcd(&[0xA0], 1),
            Err(Dlt645Error::InvalidBcd(0xA0))
        ));
    }

    #[test]
    fn test_decode_overflow() {
        assert!(matches!(
            decode_bcd(&[0x99; 10], 10),
            Err(Dlt645Error::BcdOverflow)
        ));
    }

    #[test]
    fn test_bcd_byte() {
        assert_eq!(bcd_byte(59), 0x59);
        assert_eq!(bcd_byte(7), 0x07);
        assert_eq!(bcd_byte(124), 0x24);
    }

    proptest! {
        #[test]
        fn prop_bcd_roundtrip(size in 1usize..=9, raw in any::<u64>()) {
            let limit = 10u64.pow(2 * size as u32);
            let value = raw % limit;
            prop_assert_eq!(decode_bcd(&encode_bcd(value, size), size).unwrap(), value);
        }
    }
}
