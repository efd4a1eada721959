//! # DL/T 645 Error Handling
//!
//! This module defines the `Dlt645Error` enum, which represents the different error
//! types that can occur in the dlt645-rs crate, and `DltException`, the structured
//! error a meter reports through the error flag of the control byte.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    EXCEPTION_COMMUNICATION_RATE_UNCHANGEABLE, EXCEPTION_DAY_PERIODS_EXCEED_THRESHOLD,
    EXCEPTION_ILLEGAL_PASSWORD, EXCEPTION_OTHER_ERROR, EXCEPTION_RATES_EXCEED_LIMIT,
    EXCEPTION_REQUEST_WITHOUT_DATA, EXCEPTION_TIME_ZONES_EXCEED_THRESHOLD,
};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Dlt645Error>;

/// Represents the different error types that can occur in the DL/T 645 crate.
#[derive(Debug, Error)]
pub enum Dlt645Error {
    /// A caller-supplied argument is outside its allowed range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The data domain does not fit into a single frame.
    #[error("Data domain length {len} exceeds maximum {max}")]
    DataDomainTooLarge { len: usize, max: usize },

    /// Indicates a checksum mismatch.
    #[error("Invalid checksum: expected 0x{expected:02X}, calculated 0x{calculated:02X}")]
    InvalidChecksum { expected: u8, calculated: u8 },

    /// The response came from a different slave than the one addressed.
    #[error("Response address {response} does not match request {request}")]
    AddressMismatch { request: String, response: String },

    /// The response answers a different command than the one sent.
    #[error("Response function code 0x{response:02X} does not match request 0x{request:02X}")]
    FunctionCodeMismatch { request: u8, response: u8 },

    /// Indicates an error when locating or parsing a DL/T 645 frame.
    #[error("Error parsing DL/T 645 frame: {0}")]
    FrameError(String),

    /// The meter answered with its error flag set.
    #[error(transparent)]
    Exception(#[from] DltException),

    /// A nibble in a BCD byte is not a decimal digit.
    #[error("Invalid BCD byte: 0x{0:02X}")]
    InvalidBcd(u8),

    /// The BCD value does not fit into 64 bits.
    #[error("BCD value overflows u64")]
    BcdOverflow,

    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// A read on the serial port did not complete in time.
    #[error("Serial read timed out after {0:?}")]
    Timeout(Duration),

    /// The response decoded cleanly but its content cannot be used.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for Dlt645Error {
    fn from(e: std::io::Error) -> Self {
        Dlt645Error::SerialPortError(e.to_string())
    }
}

impl From<tokio_serial::Error> for Dlt645Error {
    fn from(e: tokio_serial::Error) -> Self {
        Dlt645Error::SerialPortError(e.to_string())
    }
}

/// The known exception flags a meter may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    RatesExceedLimit,
    DayPeriodsExceedThreshold,
    TimeZonesExceedThreshold,
    CommunicationRateUnchangeable,
    IllegalPassword,
    RequestWithoutData,
    Other,
    Unknown,
}

impl ExceptionKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            EXCEPTION_RATES_EXCEED_LIMIT => ExceptionKind::RatesExceedLimit,
            EXCEPTION_DAY_PERIODS_EXCEED_THRESHOLD => ExceptionKind::DayPeriodsExceedThreshold,
            EXCEPTION_TIME_ZONES_EXCEED_THRESHOLD => ExceptionKind::TimeZonesExceedThreshold,
            EXCEPTION_COMMUNICATION_RATE_UNCHANGEABLE => {
                ExceptionKind::CommunicationRateUnchangeable
            }
            EXCEPTION_ILLEGAL_PASSWORD => ExceptionKind::IllegalPassword,
            EXCEPTION_REQUEST_WITHOUT_DATA => ExceptionKind::RequestWithoutData,
            EXCEPTION_OTHER_ERROR => ExceptionKind::Other,
            _ => ExceptionKind::Unknown,
        }
    }

    /// Human-readable description.
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::RatesExceedLimit => "The number of rates exceeds the limit",
            ExceptionKind::DayPeriodsExceedThreshold => {
                "The number of day periods exceeds the threshold"
            }
            ExceptionKind::TimeZonesExceedThreshold => {
                "The number of time zones in the year exceeds the threshold"
            }
            ExceptionKind::CommunicationRateUnchangeable => {
                "The communication rate cannot be changed"
            }
            ExceptionKind::IllegalPassword => "Incorrect password or no permission",
            ExceptionKind::RequestWithoutData => "Request without data",
            ExceptionKind::Other => "Other error",
            ExceptionKind::Unknown => "Unknown",
        }
    }
}

/// Exception reported by a meter: the response carried the error flag and
/// its first data byte names the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DltException {
    pub function_code: u8,
    pub exception_code: u8,
}

impl DltException {
    pub fn new(function_code: u8, exception_code: u8) -> Self {
        DltException {
            function_code,
            exception_code,
        }
    }

    pub fn kind(&self) -> ExceptionKind {
        ExceptionKind::from_code(self.exception_code)
    }
}

impl fmt::Display for DltException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dlt645: exception '0x{:02X}' ({}), function '0x{:02X}'",
            self.exception_code,
            self.kind().name(),
            self.function_code
        )
    }
}

impl std::error::Error for DltException {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_exception_codes() {
        let cases = [
            (0x40, ExceptionKind::RatesExceedLimit),
            (0x20, ExceptionKind::DayPeriodsExceedThreshold),
            (0x10, ExceptionKind::TimeZonesExceedThreshold),
            (0x08, ExceptionKind::CommunicationRateUnchangeable),
            (0x04, ExceptionKind::IllegalPassword),
            (0x02, ExceptionKind::RequestWithoutData),
            (0x01, ExceptionKind::Other),
        ];
        for (code, kind) in cases {
            assert_eq!(ExceptionKind::from_code(code), kind, "code 0x{code:02X}");
        }
    }

    #[test]
    fn test_combined_flags_are_unknown() {
        assert_eq!(ExceptionKind::from_code(0x06), ExceptionKind::Unknown);
        assert_eq!(ExceptionKind::from_code(0x00), ExceptionKind::Unknown);
        assert_eq!(ExceptionKind::from_code(0x80), ExceptionKind::Unknown);
    }

    #[test]
    fn test_exception_display() {
        let e = DltException::new(0x14, 0x04);
        assert_eq!(
            e.to_string(),
            "dlt645: exception '0x04' (Incorrect password or no permission), function '0x14'"
        );
    }

    #[test]
    fn test_exception_converts_into_error() {
        let err: Dlt645Error = DltException::new(0x11, 0x02).into();
        assert!(matches!(
            err,
            Dlt645Error::Exception(DltException {
                function_code: 0x11,
                exception_code: 0x02
            })
        ));
    }
}
