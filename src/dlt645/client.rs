//! # DL/T 645 Command Layer
//!
//! [`Client`] exposes the DL/T 645-2007 master operations. Each operation
//! validates its arguments, builds the data domain, and runs one exchange
//! through the frame codec and a [`Transporter`]. Reads whose answer spans
//! several frames are continued with `ReadFollowUpData` requests.
//!
//! ```rust,no_run
//! use dlt645_rs::{connect, ReadDataRequest, SerialConfig};
//!
//! # async fn example() -> Result<(), dlt645_rs::Dlt645Error> {
//! let mut config = SerialConfig::new("/dev/ttyUSB0");
//! config.slave_address = 304_257_140_001;
//! let mut client = connect(config).await?;
//! let energy = client.read_data(&ReadDataRequest::new(0x0001_0000)).await?;
//! println!("{energy:02X?}");
//! # Ok(())
//! # }
//! ```

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};
use log::debug;

use crate::constants::{
    ADDRESS_SIZE, BROADCAST_ADDRESS, MAX_COMMUNICATION_ADDRESS, MAX_FOLLOW_UP_SEQUENCE,
    MAX_PASSWORD, MAX_PASSWORD_PERMISSION,
};
use crate::dlt645::frame::{decode_address, Dlt645Packager, FramePayload, FunctionCode};
use crate::dlt645::serial::Transporter;
use crate::error::{Dlt645Error, Result};
use crate::util::bcd::bcd_byte;
use crate::util::logging::log_frame_structured;

/// Builder for a command's data domain. Integers are appended big-endian.
#[derive(Debug, Clone, Default)]
pub struct DataDomain {
    buf: BytesMut,
}

impl DataDomain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.buf.put_u16(value);
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.buf.put_u32(value);
        self
    }

    /// Appends the low six bytes of `value`.
    pub fn u48(mut self, value: u64) -> Self {
        self.buf.put_uint(value, 6);
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.buf.put_u64(value);
        self
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.buf.put_slice(data);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Point in time a historical read refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadTime {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl ReadTime {
    /// BCD-encodes each field; the year is taken modulo 100.
    pub fn from_naive(time: &NaiveDateTime) -> Self {
        let dt = DateTime::from_naive(time);
        ReadTime {
            year: dt.year,
            month: dt.month,
            day: dt.day,
            hour: dt.hour,
            minute: dt.minute,
        }
    }
}

/// Arguments of a `ReadData` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDataRequest {
    pub marker: u32,
    pub block_quantity: Option<u8>,
    pub time: Option<ReadTime>,
}

impl ReadDataRequest {
    pub fn new(marker: u32) -> Self {
        ReadDataRequest {
            marker,
            block_quantity: None,
            time: None,
        }
    }

    pub fn with_blocks(mut self, block_quantity: u8) -> Self {
        self.block_quantity = Some(block_quantity);
        self
    }

    /// Reads `block_quantity` blocks starting at `time`.
    pub fn at(mut self, block_quantity: u8, time: ReadTime) -> Self {
        self.block_quantity = Some(block_quantity);
        self.time = Some(time);
        self
    }

    /// Builds a request from positional fields where zero means absent.
    ///
    /// A zero quantity drops both quantity and time; a zero year drops the
    /// time.
    pub fn from_raw(
        marker: u32,
        block_quantity: u8,
        year: u8,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
    ) -> Self {
        let request = ReadDataRequest::new(marker);
        match (block_quantity, year) {
            (0, _) => request,
            (q, 0) => request.with_blocks(q),
            (q, year) => request.at(
                q,
                ReadTime {
                    year,
                    month,
                    day,
                    hour,
                    minute,
                },
            ),
        }
    }

    /// Data domain: marker, then quantity, then quantity again with the time.
    pub fn data_domain(&self) -> Vec<u8> {
        let mut domain = DataDomain::new().u32(self.marker);
        if let Some(quantity) = self.block_quantity {
            domain = domain.u8(quantity);
            if let Some(t) = self.time {
                domain = domain
                    .u8(quantity)
                    .u8(t.year)
                    .u8(t.month)
                    .u8(t.day)
                    .u8(t.hour)
                    .u8(t.minute);
            }
        }
        domain.into_vec()
    }
}

/// Broadcast timing fields, sent as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// BCD-encodes each field; the year is taken modulo 100.
    pub fn from_naive(time: &NaiveDateTime) -> Self {
        DateTime {
            year: bcd_byte(time.year().rem_euclid(100) as u8),
            month: bcd_byte(time.month() as u8),
            day: bcd_byte(time.day() as u8),
            hour: bcd_byte(time.hour() as u8),
            minute: bcd_byte(time.minute() as u8),
            second: bcd_byte(time.second().min(59) as u8),
        }
    }

    fn data_domain(&self) -> Vec<u8> {
        DataDomain::new()
            .u8(self.year)
            .u8(self.month)
            .u8(self.day)
            .u8(self.hour)
            .u8(self.minute)
            .u8(self.second)
            .into_vec()
    }
}

impl From<NaiveDateTime> for DateTime {
    fn from(time: NaiveDateTime) -> Self {
        DateTime::from_naive(&time)
    }
}

/// Communication rate characters for `ChangeCommunicationRate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommunicationRate {
    Baud600 = 0x02,
    Baud1200 = 0x04,
    Baud2400 = 0x08,
    Baud4800 = 0x10,
    Baud9600 = 0x20,
    Baud19200 = 0x40,
}

impl CommunicationRate {
    pub fn flag(self) -> u8 {
        self as u8
    }

    pub fn from_baudrate(baudrate: u32) -> Result<Self> {
        match baudrate {
            600 => Ok(CommunicationRate::Baud600),
            1200 => Ok(CommunicationRate::Baud1200),
            2400 => Ok(CommunicationRate::Baud2400),
            4800 => Ok(CommunicationRate::Baud4800),
            9600 => Ok(CommunicationRate::Baud9600),
            19200 => Ok(CommunicationRate::Baud19200),
            other => Err(Dlt645Error::InvalidArgument(format!(
                "communication rate '{other}' is not supported"
            ))),
        }
    }

    pub fn baudrate(self) -> u32 {
        match self {
            CommunicationRate::Baud600 => 600,
            CommunicationRate::Baud1200 => 1200,
            CommunicationRate::Baud2400 => 2400,
            CommunicationRate::Baud4800 => 4800,
            CommunicationRate::Baud9600 => 9600,
            CommunicationRate::Baud19200 => 19200,
        }
    }
}

/// Decodes the address returned by `ReadCommunicationAddress`.
pub fn parse_communication_address(data: &[u8]) -> Result<u64> {
    if data.len() != ADDRESS_SIZE {
        return Err(Dlt645Error::InvalidResponse(format!(
            "communication address has {} bytes, expected {ADDRESS_SIZE}",
            data.len()
        )));
    }
    decode_address(data)
}

fn password_word(permission: u8, password: u32) -> Result<u32> {
    if permission > MAX_PASSWORD_PERMISSION {
        return Err(Dlt645Error::InvalidArgument(format!(
            "password permission '{permission}' must be between '0' and '{MAX_PASSWORD_PERMISSION}'"
        )));
    }
    if password > MAX_PASSWORD {
        return Err(Dlt645Error::InvalidArgument(format!(
            "password '{password}' must fit into 3 bytes"
        )));
    }
    Ok(((permission as u32) << 24) | password)
}

/// DL/T 645-2007 master bound to one slave address.
pub struct Client<T: Transporter> {
    packager: Dlt645Packager,
    transporter: T,
}

impl<T: Transporter> Client<T> {
    pub fn new(slave_address: u64, transporter: T) -> Self {
        Client {
            packager: Dlt645Packager::new(slave_address),
            transporter,
        }
    }

    pub fn slave_address(&self) -> u64 {
        self.packager.slave_address()
    }

    pub fn set_slave_address(&mut self, slave_address: u64) {
        self.packager.set_slave_address(slave_address);
    }

    pub fn transporter(&self) -> &T {
        &self.transporter
    }

    pub fn transporter_mut(&mut self) -> &mut T {
        &mut self.transporter
    }

    pub fn into_transporter(self) -> T {
        self.transporter
    }

    /// Reads a data item, following up until the meter has sent every
    /// frame. The echoed 4-byte marker is removed from the result.
    pub async fn read_data(&mut self, request: &ReadDataRequest) -> Result<Vec<u8>> {
        let mut response = self
            .send(FramePayload::new(
                FunctionCode::ReadData,
                request.data_domain(),
            ))
            .await?;
        let mut results = std::mem::take(&mut response.data);

        let mut seq: u8 = 1;
        while response.has_follow_up_data {
            debug!("Reading follow-up frame {seq} of marker 0x{:08X}", request.marker);
            let data = DataDomain::new().u32(request.marker).u8(seq).into_vec();
            response = self
                .send(FramePayload::new(FunctionCode::ReadFollowUpData, data))
                .await?;
            results.extend_from_slice(&response.data);

            if seq == MAX_FOLLOW_UP_SEQUENCE {
                break;
            }
            seq += 1;
        }

        if results.len() < 4 {
            return Err(Dlt645Error::InvalidResponse(format!(
                "read data returned {} bytes, shorter than its marker",
                results.len()
            )));
        }
        Ok(results.split_off(4))
    }

    pub async fn write_data(
        &mut self,
        marker: u32,
        permission: u8,
        password: u32,
        operator: u32,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let data = DataDomain::new()
            .u32(marker)
            .u32(password_word(permission, password)?)
            .u32(operator)
            .bytes(data)
            .into_vec();
        self.request(FunctionCode::WriteData, data).await
    }

    /// Returns the raw address bytes; see [`parse_communication_address`].
    pub async fn read_communication_address(&mut self) -> Result<Vec<u8>> {
        self.request(FunctionCode::ReadCommunicationAddress, Vec::new())
            .await
    }

    pub async fn write_communication_address(&mut self, address: u64) -> Result<Vec<u8>> {
        if address > MAX_COMMUNICATION_ADDRESS {
            return Err(Dlt645Error::InvalidArgument(format!(
                "communication address '{address}' must fit into 6 bytes"
            )));
        }
        let data = DataDomain::new().u48(address).into_vec();
        self.request(FunctionCode::WriteCommunicationAddress, data)
            .await
    }

    /// Sends the time to every meter on the bus. No meter answers.
    pub async fn broadcast_timing(&mut self, time: DateTime) -> Result<()> {
        let request = FramePayload::new(FunctionCode::BroadcastTiming, time.data_domain());
        let raw = self.packager.encode_to(BROADCAST_ADDRESS, &request)?;
        log_frame_structured("dlt645: broadcast", &raw, request.function_code, false);
        self.transporter.send_no_response(&raw).await
    }

    pub async fn freeze(&mut self, month: u8, day: u8, hour: u8, minute: u8) -> Result<Vec<u8>> {
        let data = DataDomain::new()
            .u8(month)
            .u8(day)
            .u8(hour)
            .u8(minute)
            .into_vec();
        self.request(FunctionCode::FreezeCommand, data).await
    }

    /// Sends a communication rate character, e.g. [`CommunicationRate::flag`].
    pub async fn change_communication_rate(&mut self, rate: u8) -> Result<Vec<u8>> {
        let data = DataDomain::new().u8(rate).into_vec();
        self.request(FunctionCode::ChangeCommunicationRate, data)
            .await
    }

    pub async fn change_password(
        &mut self,
        marker: u32,
        old_permission: u8,
        old_password: u32,
        new_permission: u8,
        new_password: u32,
    ) -> Result<Vec<u8>> {
        let data = DataDomain::new()
            .u32(marker)
            .u32(password_word(old_permission, old_password)?)
            .u32(password_word(new_permission, new_password)?)
            .into_vec();
        self.request(FunctionCode::ChangePassword, data).await
    }

    pub async fn clear_maximum_demand(
        &mut self,
        permission: u8,
        password: u32,
        operator: u32,
    ) -> Result<Vec<u8>> {
        let data = DataDomain::new()
            .u32(password_word(permission, password)?)
            .u32(operator)
            .into_vec();
        self.request(FunctionCode::ClearMaximumDemand, data).await
    }

    pub async fn clear_ammeter(
        &mut self,
        permission: u8,
        password: u32,
        operator: u32,
    ) -> Result<Vec<u8>> {
        let data = DataDomain::new()
            .u32(password_word(permission, password)?)
            .u32(operator)
            .into_vec();
        self.request(FunctionCode::ClearAmmeter, data).await
    }

    pub async fn clear_event(
        &mut self,
        marker: u32,
        permission: u8,
        password: u32,
        operator: u32,
    ) -> Result<Vec<u8>> {
        let data = DataDomain::new()
            .u32(password_word(permission, password)?)
            .u32(operator)
            .u32(marker)
            .into_vec();
        self.request(FunctionCode::ClearEvent, data).await
    }

    async fn request(&mut self, function: FunctionCode, data: Vec<u8>) -> Result<Vec<u8>> {
        let response = self.send(FramePayload::new(function, data)).await?;
        Ok(response.data)
    }

    async fn send(&mut self, request: FramePayload) -> Result<FramePayload> {
        let raw_request = self.packager.encode(&request)?;
        log_frame_structured("dlt645: request", &raw_request, request.function_code, false);

        let raw_response = self.transporter.send(&raw_request).await?;
        self.packager.verify(&raw_request, &raw_response)?;
        let response = self.packager.decode(&raw_response)?;
        log_frame_structured(
            "dlt645: response",
            &raw_response,
            response.function_code,
            response.has_follow_up_data,
        );

        if response.function_code != request.function_code {
            return Err(Dlt645Error::FunctionCodeMismatch {
                request: request.function_code,
                response: response.function_code,
            });
        }
        Ok(response)
    }
}
