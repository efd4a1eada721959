//! # DL/T 645-2007 Frame Codec
//!
//! This module encodes requests into DL/T 645 wire frames and verifies and
//! decodes the meter's responses. Structural parsing uses the `nom` crate.
//!
//! ## Frame layout
//!
//! ```text
//! 0x68 | A0 A1 A2 A3 A4 A5 | 0x68 | C | L | DATA (L bytes, +0x33) | CS | 0x16
//! ```
//!
//! - The address is six BCD bytes, least significant byte first.
//! - The control byte `C` packs the direction (bit 7), the slave error flag
//!   (bit 6), the follow-up flag (bit 5) and a five bit function code.
//! - Every data byte is transmitted with 0x33 added, modulo 256.
//! - `CS` is the 8-bit sum of every preceding byte.
//!
//! ## Usage
//!
//! ```rust
//! use dlt645_rs::constants::CONTROL_OFFSET;
//! use dlt645_rs::dlt645::frame::{Dlt645Packager, FramePayload, FunctionCode};
//!
//! let packager = Dlt645Packager::new(304_257_140_001);
//! let request = FramePayload::new(FunctionCode::ReadData, vec![0x00, 0x00, 0x00, 0x00]);
//! let raw = packager.encode(&request).unwrap();
//! assert_eq!(raw[1..7], [0x01, 0x00, 0x14, 0x57, 0x42, 0x30]);
//! assert_eq!(raw[CONTROL_OFFSET], 0x11);
//! ```

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use nom::{
    bytes::complete::{tag, take},
    number::complete::be_u8,
    IResult,
};

use crate::constants::{
    ADDRESS_SIZE, BROADCAST_ADDRESS, CONTROL_MASK_FUNCTION, DATA_OBFUSCATION_OFFSET, FRAME_HEAD,
    FRAME_OVERHEAD, FRAME_TAIL, MAX_DATA_SIZE, MAX_SLAVE_ADDRESS, MIN_FRAME_SIZE,
};
use crate::error::{DltException, Dlt645Error, Result};
use crate::util::bcd::{decode_bcd, encode_bcd};
use crate::util::checksum::checksum;
use crate::util::hex::encode_hex;

const HEAD: &[u8] = &[FRAME_HEAD];
const TAIL: &[u8] = &[FRAME_TAIL];

/// DL/T 645-2007 command identifiers (low five bits of the control byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    BroadcastTiming = 0x08,
    ReadData = 0x11,
    ReadFollowUpData = 0x12,
    ReadCommunicationAddress = 0x13,
    WriteData = 0x14,
    WriteCommunicationAddress = 0x15,
    FreezeCommand = 0x16,
    ChangeCommunicationRate = 0x17,
    ChangePassword = 0x18,
    ClearMaximumDemand = 0x19,
    ClearAmmeter = 0x1A,
    ClearEvent = 0x1B,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let function = match code & CONTROL_MASK_FUNCTION {
            0x08 => FunctionCode::BroadcastTiming,
            0x11 => FunctionCode::ReadData,
            0x12 => FunctionCode::ReadFollowUpData,
            0x13 => FunctionCode::ReadCommunicationAddress,
            0x14 => FunctionCode::WriteData,
            0x15 => FunctionCode::WriteCommunicationAddress,
            0x16 => FunctionCode::FreezeCommand,
            0x17 => FunctionCode::ChangeCommunicationRate,
            0x18 => FunctionCode::ChangePassword,
            0x19 => FunctionCode::ClearMaximumDemand,
            0x1A => FunctionCode::ClearAmmeter,
            0x1B => FunctionCode::ClearEvent,
            _ => return None,
        };
        Some(function)
    }
}

bitflags! {
    /// Flag bits of the control byte. The master never sets them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        /// Frame was sent by the slave.
        const SLAVE_RESPONSE = 0x80;
        /// Slave reports an exception in the first data byte.
        const SLAVE_ERROR = 0x40;
        /// More data blocks remain; read them with `ReadFollowUpData`.
        const FOLLOW_UP = 0x20;
    }
}

/// A protocol message independent of its wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FramePayload {
    pub has_follow_up_data: bool,
    /// Five bit function code; higher bits are ignored.
    pub function_code: u8,
    /// Logical (de-obfuscated) data domain.
    pub data: Vec<u8>,
}

impl FramePayload {
    pub fn new(function: FunctionCode, data: Vec<u8>) -> Self {
        FramePayload {
            has_follow_up_data: false,
            function_code: function.code(),
            data,
        }
    }

    pub fn function(&self) -> Option<FunctionCode> {
        FunctionCode::from_code(self.function_code)
    }
}

/// Adds the 0x33 wire offset to every byte.
pub fn obfuscate(data: &[u8]) -> Vec<u8> {
    data.iter()
        .map(|b| b.wrapping_add(DATA_OBFUSCATION_OFFSET))
        .collect()
}

/// Removes the 0x33 wire offset from every byte.
pub fn deobfuscate(data: &[u8]) -> Vec<u8> {
    data.iter()
        .map(|b| b.wrapping_sub(DATA_OBFUSCATION_OFFSET))
        .collect()
}

/// Converts an address into the six bytes of the frame's address field.
pub fn encode_address(address: u64) -> Result<[u8; ADDRESS_SIZE]> {
    if address > MAX_SLAVE_ADDRESS {
        return Err(Dlt645Error::InvalidArgument(format!(
            "slave address '{address}' must not exceed '{MAX_SLAVE_ADDRESS}'"
        )));
    }
    let bcd = encode_bcd(address, ADDRESS_SIZE);
    let mut field = [0u8; ADDRESS_SIZE];
    for (dst, src) in field.iter_mut().zip(bcd.iter().rev()) {
        *dst = *src;
    }
    Ok(field)
}

/// Reads an address from six bytes in frame order.
pub fn decode_address(field: &[u8]) -> Result<u64> {
    if field.len() != ADDRESS_SIZE {
        return Err(Dlt645Error::FrameError(format!(
            "address field has {} bytes, expected {ADDRESS_SIZE}",
            field.len()
        )));
    }
    let bcd: Vec<u8> = field.iter().rev().copied().collect();
    decode_bcd(&bcd, ADDRESS_SIZE)
}

/// A frame split into its fields; data is still obfuscated.
#[derive(Debug, PartialEq, Eq)]
pub struct RawFrame<'a> {
    pub address: &'a [u8],
    pub control: u8,
    pub data: &'a [u8],
    pub checksum: u8,
}

/// Uses the `nom` crate to split a DL/T 645 frame into its fields.
///
/// The declared data length must match the bytes present before the
/// checksum and end delimiter.
pub fn parse_frame(input: &[u8]) -> IResult<&[u8], RawFrame<'_>> {
    let (input, _) = tag(HEAD)(input)?;
    let (input, address) = take(ADDRESS_SIZE)(input)?;
    let (input, _) = tag(HEAD)(input)?;
    let (input, control) = be_u8(input)?;
    let (input, length) = be_u8(input)?;
    let (input, data) = take(length as usize)(input)?;
    let (input, checksum) = be_u8(input)?;
    let (input, _) = tag(TAIL)(input)?;
    Ok((
        input,
        RawFrame {
            address,
            control,
            data,
            checksum,
        },
    ))
}

/// Encodes, decodes and verifies frames for one slave address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dlt645Packager {
    slave_address: u64,
}

impl Dlt645Packager {
    pub fn new(slave_address: u64) -> Self {
        Dlt645Packager { slave_address }
    }

    pub fn slave_address(&self) -> u64 {
        self.slave_address
    }

    pub fn set_slave_address(&mut self, slave_address: u64) {
        self.slave_address = slave_address;
    }

    /// Encodes `payload` addressed to the configured slave.
    pub fn encode(&self, payload: &FramePayload) -> Result<Vec<u8>> {
        self.encode_to(self.slave_address, payload)
    }

    /// Encodes `payload` addressed to `address`.
    pub fn encode_to(&self, address: u64, payload: &FramePayload) -> Result<Vec<u8>> {
        let data_len = payload.data.len();
        if data_len > MAX_DATA_SIZE {
            return Err(Dlt645Error::DataDomainTooLarge {
                len: data_len,
                max: MAX_DATA_SIZE,
            });
        }

        let mut raw = BytesMut::with_capacity(FRAME_OVERHEAD + data_len);
        raw.put_u8(FRAME_HEAD);
        raw.put_slice(&encode_address(address)?);
        raw.put_u8(FRAME_HEAD);
        raw.put_u8(payload.function_code & CONTROL_MASK_FUNCTION);
        raw.put_u8(data_len as u8);
        raw.put_slice(&obfuscate(&payload.data));

        let cs = checksum(&raw);
        raw.put_u8(cs);
        raw.put_u8(FRAME_TAIL);

        Ok(raw.to_vec())
    }

    /// Decodes a response frame.
    ///
    /// A response with the error flag and a non-empty data domain becomes
    /// [`Dlt645Error::Exception`].
    pub fn decode(&self, raw: &[u8]) -> Result<FramePayload> {
        let length = raw.len();
        if length < FRAME_OVERHEAD {
            return Err(Dlt645Error::FrameError(format!(
                "frame length '{length}' does not meet minimum '{FRAME_OVERHEAD}'"
            )));
        }

        let calculated = checksum(&raw[..length - 2]);
        if calculated != raw[length - 2] {
            return Err(Dlt645Error::InvalidChecksum {
                expected: raw[length - 2],
                calculated,
            });
        }

        let (rest, frame) =
            parse_frame(raw).map_err(|e| Dlt645Error::FrameError(format!("{e:?}")))?;
        if !rest.is_empty() {
            return Err(Dlt645Error::FrameError(format!(
                "{} trailing bytes after end delimiter",
                rest.len()
            )));
        }
        if frame.data.len() > MAX_DATA_SIZE {
            return Err(Dlt645Error::FrameError(format!(
                "data length '{}' exceeds maximum '{MAX_DATA_SIZE}'",
                frame.data.len()
            )));
        }

        let flags = ControlFlags::from_bits_truncate(frame.control);
        let payload = FramePayload {
            has_follow_up_data: flags.contains(ControlFlags::FOLLOW_UP),
            function_code: frame.control & CONTROL_MASK_FUNCTION,
            data: deobfuscate(frame.data),
        };

        if flags.contains(ControlFlags::SLAVE_ERROR) {
            if let Some(&code) = payload.data.first() {
                return Err(DltException::new(payload.function_code, code).into());
            }
        }

        Ok(payload)
    }

    /// Checks the response length and that it came from the addressed slave.
    ///
    /// Requests sent to the broadcast address accept any responder.
    pub fn verify(&self, request: &[u8], response: &[u8]) -> Result<()> {
        if response.len() < MIN_FRAME_SIZE {
            return Err(Dlt645Error::FrameError(format!(
                "response length '{}' does not meet minimum '{MIN_FRAME_SIZE}'",
                response.len()
            )));
        }
        if request.len() < MIN_FRAME_SIZE {
            return Err(Dlt645Error::InvalidArgument(format!(
                "request length '{}' does not meet minimum '{MIN_FRAME_SIZE}'",
                request.len()
            )));
        }

        let request_address = &request[1..=ADDRESS_SIZE];
        let response_address = &response[1..=ADDRESS_SIZE];
        if request_address == encode_address(BROADCAST_ADDRESS)? {
            return Ok(());
        }
        if request_address != response_address {
            return Err(Dlt645Error::AddressMismatch {
                request: encode_hex(request_address),
                response: encode_hex(response_address),
            });
        }
        Ok(())
    }
}
