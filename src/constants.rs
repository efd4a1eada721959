//! DL/T 645 Protocol Constants
//!
//! This module defines constants used in the DL/T 645-2007 protocol implementation.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Frame layout
// ----------------------------------------------------------------------------

/// Start delimiter, present at offset 0 and again after the address.
pub const FRAME_HEAD: u8 = 0x68;

/// End delimiter.
pub const FRAME_TAIL: u8 = 0x16;

/// Number of address bytes in a frame.
pub const ADDRESS_SIZE: usize = 6;

/// Offset of the control byte.
pub const CONTROL_OFFSET: usize = 8;

/// Offset of the data length byte.
pub const LENGTH_OFFSET: usize = 9;

/// Offset of the first data byte.
pub const DATA_OFFSET: usize = 10;

/// Bytes of a frame that are not data: delimiters, address, control, length,
/// checksum.
pub const FRAME_OVERHEAD: usize = 12;

/// Shortest response accepted by `verify`.
pub const MIN_FRAME_SIZE: usize = 10;

/// Largest data domain carried by one frame.
pub const MAX_DATA_SIZE: usize = 200;

/// Largest frame on the wire.
pub const MAX_FRAME_SIZE: usize = MAX_DATA_SIZE + FRAME_OVERHEAD;

/// Added to every data byte on the wire.
pub const DATA_OBFUSCATION_OFFSET: u8 = 0x33;

/// Wake-up bytes sent ahead of every request.
pub const LINK_PREAMBLE: [u8; 4] = [0xFE, 0xFE, 0xFE, 0xFE];

/// Noise tolerated ahead of a response's start delimiter.
pub const MAX_LEADING_NOISE: usize = 32;

// ----------------------------------------------------------------------------
// Addressing
// ----------------------------------------------------------------------------

/// Broadcast address (twelve nines).
pub const BROADCAST_ADDRESS: u64 = 999_999_999_999;

/// Largest address representable in six BCD bytes.
pub const MAX_SLAVE_ADDRESS: u64 = 999_999_999_999;

// ----------------------------------------------------------------------------
// Control byte
// ----------------------------------------------------------------------------

pub const CONTROL_MASK_FUNCTION: u8 = 0x1F;

// ----------------------------------------------------------------------------
// Exception codes (first data byte of an error response)
// ----------------------------------------------------------------------------

pub const EXCEPTION_RATES_EXCEED_LIMIT: u8 = 0x40;
pub const EXCEPTION_DAY_PERIODS_EXCEED_THRESHOLD: u8 = 0x20;
pub const EXCEPTION_TIME_ZONES_EXCEED_THRESHOLD: u8 = 0x10;
pub const EXCEPTION_COMMUNICATION_RATE_UNCHANGEABLE: u8 = 0x08;
pub const EXCEPTION_ILLEGAL_PASSWORD: u8 = 0x04;
pub const EXCEPTION_REQUEST_WITHOUT_DATA: u8 = 0x02;
pub const EXCEPTION_OTHER_ERROR: u8 = 0x01;

// ----------------------------------------------------------------------------
// Command argument limits
// ----------------------------------------------------------------------------

/// Highest password permission level.
pub const MAX_PASSWORD_PERMISSION: u8 = 9;

/// Passwords occupy three bytes.
pub const MAX_PASSWORD: u32 = 0x00FF_FFFF;

/// Communication addresses occupy six bytes.
pub const MAX_COMMUNICATION_ADDRESS: u64 = (1 << 48) - 1;

/// Upper bound on follow-up frames for one read.
pub const MAX_FOLLOW_UP_SEQUENCE: u8 = u8::MAX;

// ----------------------------------------------------------------------------
// Serial timing
// ----------------------------------------------------------------------------

/// Above this baud rate the fixed delays below apply.
pub const MAX_TIMED_BAUDRATE: u32 = 19_200;

/// Per-character delay when the baud rate is unset or fast (µs).
pub const DEFAULT_CHARACTER_DELAY_US: u64 = 750;

/// Per-frame delay when the baud rate is unset or fast (µs).
pub const DEFAULT_FRAME_DELAY_US: u64 = 1_750;

pub const CHARACTER_DELAY_NUMERATOR: u64 = 15_000_000;
pub const FRAME_DELAY_NUMERATOR: u64 = 35_000_000;

pub const DEFAULT_BAUDRATE: u32 = 2400;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
