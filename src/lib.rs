//! # dlt645-rs - A Rust Crate for DL/T 645-2007 Meter Communication
//!
//! The dlt645-rs crate implements the master side of DL/T 645-2007, the
//! Chinese standard for reading and configuring electricity meters over an
//! RS-485 serial bus.
//!
//! ## Features
//!
//! - Encode, verify and decode DL/T 645 frames (BCD addressing, 0x33 data offset, checksums)
//! - Serial transport with lazy connect, idle auto-close and baud-rate derived delays
//! - Frame extraction from noisy lines with wake-up preambles
//! - The full master command set, including multi-frame follow-up reads
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! dlt645-rs = "0.1.0"
//! ```
//!
//! ```rust,no_run
//! use dlt645_rs::{connect, init_logger, ReadDataRequest, SerialConfig};
//!
//! # async fn example() -> Result<(), dlt645_rs::Dlt645Error> {
//! init_logger();
//! let config = SerialConfig::from_json_file("meter.json")?;
//! let mut client = connect(config).await?;
//! let address = client.read_communication_address().await?;
//! let data = client.read_data(&ReadDataRequest::new(0x0001_0000)).await?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod dlt645;
pub mod error;
pub mod logging;
pub mod util;

pub use crate::error::{DltException, Dlt645Error, ExceptionKind, Result};
pub use crate::logging::{
    init_logger, init_logger_with_default, log_debug, log_error, log_info, log_warn,
};

pub use dlt645::{
    parse_communication_address, Client, CommunicationRate, DataDomain, DateTime,
    Dlt645Packager, FramePayload, FunctionCode, ReadDataRequest, ReadTime, SerialConfig,
    SerialTransport, Transporter,
};

/// Opens a client for the meter described by `config`.
///
/// The configuration is validated and the serial port opened immediately.
/// The port is closed again after `config.idle_timeout` without traffic and
/// reopened on the next command.
///
/// # Returns
/// * `Ok(Client)` - Client bound to `config.slave_address`
/// * `Err(Dlt645Error)` - Invalid configuration or the port could not be opened
pub async fn connect(config: SerialConfig) -> Result<Client<SerialTransport>> {
    config.validate()?;
    let slave_address = config.slave_address;
    let mut transport = SerialTransport::new(config);
    transport.connect().await?;
    Ok(Client::new(slave_address, transport))
}

/// Closes the client's serial port.
pub async fn disconnect(client: &mut Client<SerialTransport>) -> Result<()> {
    client.transporter_mut().close().await
}
