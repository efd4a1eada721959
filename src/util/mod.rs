//! # Utility Modules
//!
//! This module provides common utility functions used throughout the
//! dlt645-rs crate: checksums, BCD conversion, hex formatting, and frame
//! logging helpers.

pub mod bcd;
pub mod checksum;
pub mod hex;
pub mod logging;

pub use bcd::{bcd_byte, decode_bcd, encode_bcd};
pub use checksum::checksum;
pub use hex::{decode_hex, encode_hex, format_hex_compact, parse_hex_lenient};
pub use logging::{log_frame_hex, log_frame_structured};
