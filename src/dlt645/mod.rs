//! # DL/T 645-2007 Protocol
//!
//! - [`frame`]: wire frame encoding, decoding and verification
//! - [`serial`]: serial transport with lazy connect and idle auto-close
//! - [`client`]: the master's command set
//! - [`serial_mock`]: in-memory port for tests

pub mod client;
pub mod frame;
pub mod serial;
pub mod serial_mock;

pub use client::{
    parse_communication_address, Client, CommunicationRate, DataDomain, DateTime,
    ReadDataRequest, ReadTime,
};
pub use frame::{ControlFlags, Dlt645Packager, FramePayload, FunctionCode};
pub use serial::{
    calculate_delay, extract_frame, BoxedPort, Parity, PortOpener, SerialConfig, SerialPort,
    SerialTransport, TokioSerialOpener, Transporter,
};
