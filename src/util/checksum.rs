//! # Frame Checksum
//!
//! DL/T 645 protects each frame with a single byte: the sum of every byte
//! from the first start delimiter up to the last data byte, modulo 256.

/// Wrapping 8-bit sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_wraps_without_carry() {
        assert_eq!(checksum(&[0xFF, 0x01]), 0x00);
        assert_eq!(checksum(&[0x80, 0x80, 0x05]), 0x05);
    }

    proptest! {
        #[test]
        fn prop_checksum_is_additive(data in proptest::collection::vec(any::<u8>(), 0..256), k in 0usize..256) {
            let k = k.min(data.len());
            let (left, right) = data.split_at(k);
            prop_assert_eq!(checksum(&data), checksum(left).wrapping_add(checksum(right)));
        }
    }
}
