//! # DL/T 645 Serial Transport
//!
//! This module owns the serial connection to a meter bus. It opens the port
//! lazily, closes it again after a configurable idle period, pads every
//! request with the wake-up preamble, waits out the baud-rate dependent
//! transmission delay and reads the response frame back from a possibly
//! noisy line.
//!
//! The port sits behind a `tokio::sync::Mutex` that is held for a whole
//! exchange, so the idle-close timer can never close the port mid-exchange.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_serial::SerialPortBuilderExt;

use crate::constants::{
    CHARACTER_DELAY_NUMERATOR, DATA_OFFSET, DEFAULT_BAUDRATE, DEFAULT_CHARACTER_DELAY_US,
    DEFAULT_FRAME_DELAY_US, DEFAULT_IDLE_TIMEOUT, DEFAULT_TIMEOUT, FRAME_DELAY_NUMERATOR,
    FRAME_HEAD, FRAME_OVERHEAD, FRAME_TAIL, LENGTH_OFFSET, LINK_PREAMBLE, MAX_FRAME_SIZE,
    MAX_LEADING_NOISE, MAX_SLAVE_ADDRESS, MAX_TIMED_BAUDRATE, MIN_FRAME_SIZE,
};
use crate::error::{Dlt645Error, Result};
use crate::util::logging::log_frame_hex;

/// Parity setting of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    #[default]
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Configuration for the serial connection.
///
/// Durations are stored in JSON as whole milliseconds. Missing fields take
/// their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// Bound on every single read from the port.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// The port is closed after this long without traffic. Zero disables it.
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
    pub slave_address: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: DEFAULT_BAUDRATE,
            data_bits: 8,
            parity: Parity::Even,
            stop_bits: 1,
            timeout: DEFAULT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            slave_address: 0,
        }
    }
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        SerialConfig {
            port: port.into(),
            ..SerialConfig::default()
        }
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SerialConfig =
            serde_json::from_str(json).map_err(|e| Dlt645Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Dlt645Error::ConfigError(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(Dlt645Error::ConfigError("port name is empty".into()));
        }
        self.data_bits_setting()?;
        self.stop_bits_setting()?;
        if self.slave_address > MAX_SLAVE_ADDRESS {
            return Err(Dlt645Error::ConfigError(format!(
                "slave address '{}' has more than 12 digits",
                self.slave_address
            )));
        }
        Ok(())
    }

    fn data_bits_setting(&self) -> Result<tokio_serial::DataBits> {
        match self.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(Dlt645Error::ConfigError(format!(
                "data bits must be between 5 and 8, got {other}"
            ))),
        }
    }

    fn stop_bits_setting(&self) -> Result<tokio_serial::StopBits> {
        match self.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(Dlt645Error::ConfigError(format!(
                "stop bits must be 1 or 2, got {other}"
            ))),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Byte stream the transport talks to.
pub trait SerialPort: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPort for T {}

pub type BoxedPort = Box<dyn SerialPort>;

/// Opens the port described by a [`SerialConfig`].
pub trait PortOpener: Send + Sync {
    fn open(&self, config: &SerialConfig) -> Result<BoxedPort>;
}

/// Opens real serial devices through `tokio_serial`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSerialOpener;

impl PortOpener for TokioSerialOpener {
    fn open(&self, config: &SerialConfig) -> Result<BoxedPort> {
        let stream = tokio_serial::new(&config.port, config.baudrate)
            .data_bits(config.data_bits_setting()?)
            .stop_bits(config.stop_bits_setting()?)
            .parity(config.parity.into())
            .timeout(config.timeout)
            .open_native_async()?;
        Ok(Box::new(stream))
    }
}

/// Moves raw frames to and from a meter.
#[async_trait]
pub trait Transporter: Send {
    /// Writes `request` and returns the response frame.
    async fn send(&mut self, request: &[u8]) -> Result<Vec<u8>>;

    /// Writes `request` without waiting for an answer.
    async fn send_no_response(&mut self, request: &[u8]) -> Result<()>;
}

struct PortState {
    port: Option<BoxedPort>,
    last_activity: Instant,
}

/// Serial transport with lazy connect and idle auto-close.
pub struct SerialTransport {
    config: SerialConfig,
    opener: Arc<dyn PortOpener>,
    state: Arc<Mutex<PortState>>,
    close_timer: Option<JoinHandle<()>>,
}

impl SerialTransport {
    pub fn new(config: SerialConfig) -> Self {
        Self::with_opener(config, Arc::new(TokioSerialOpener))
    }

    pub fn with_opener(config: SerialConfig, opener: Arc<dyn PortOpener>) -> Self {
        SerialTransport {
            config,
            opener,
            state: Arc::new(Mutex::new(PortState {
                port: None,
                last_activity: Instant::now(),
            })),
            close_timer: None,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Opens the port unless it is already open and arms the idle timer.
    pub async fn connect(&mut self) -> Result<()> {
        let mut state = Arc::clone(&self.state).lock_owned().await;
        if self.open_locked(&mut state)? {
            state.last_activity = Instant::now();
            self.start_close_timer();
        }
        Ok(())
    }

    /// Closes the port. Closing a closed transport is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(timer) = self.close_timer.take() {
            timer.abort();
        }
        let mut state = self.state.lock().await;
        if state.port.take().is_some() {
            info!("Closed serial port {}", self.config.port);
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.port.is_some()
    }

    /// Returns whether the port was newly opened.
    fn open_locked(&self, state: &mut PortState) -> Result<bool> {
        if state.port.is_some() {
            return Ok(false);
        }
        let port = self.opener.open(&self.config)?;
        info!(
            "Opened serial port {} at {} baud",
            self.config.port, self.config.baudrate
        );
        state.port = Some(port);
        Ok(true)
    }

    fn start_close_timer(&mut self) {
        let idle_timeout = self.config.idle_timeout;
        if idle_timeout.is_zero() {
            return;
        }
        if let Some(timer) = self.close_timer.take() {
            timer.abort();
        }

        let state = Arc::clone(&self.state);
        let port_name = self.config.port.clone();
        self.close_timer = Some(tokio::spawn(async move {
            loop {
                let deadline = {
                    let state = state.lock().await;
                    if state.port.is_none() {
                        return;
                    }
                    state.last_activity + idle_timeout
                };
                sleep_until(deadline).await;

                let mut state = state.lock().await;
                if state.last_activity.elapsed() >= idle_timeout {
                    if state.port.take().is_some() {
                        info!("Closed serial port {port_name} after {idle_timeout:?} idle");
                    }
                    return;
                }
            }
        }));
    }

    /// Locks the port, opening it if needed, and records activity.
    async fn begin(&mut self) -> Result<tokio::sync::OwnedMutexGuard<PortState>> {
        let mut state = Arc::clone(&self.state).lock_owned().await;
        self.open_locked(&mut state)?;
        state.last_activity = Instant::now();
        self.start_close_timer();
        Ok(state)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Some(timer) = self.close_timer.take() {
            timer.abort();
        }
    }
}

#[async_trait]
impl Transporter for SerialTransport {
    async fn send(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.begin().await?;
        let Some(port) = state.port.as_mut() else {
            return Err(Dlt645Error::SerialPortError("port is not open".into()));
        };

        let result = exchange(port, &self.config, request).await;
        state.last_activity = Instant::now();
        if let Err(e) = &result {
            close_on_link_error(&mut state, &self.config.port, e);
        }
        result
    }

    async fn send_no_response(&mut self, request: &[u8]) -> Result<()> {
        let mut state = self.begin().await?;
        let Some(port) = state.port.as_mut() else {
            return Err(Dlt645Error::SerialPortError("port is not open".into()));
        };

        let result = write_request(port, request).await;
        state.last_activity = Instant::now();
        if let Err(e) = &result {
            close_on_link_error(&mut state, &self.config.port, e);
        }
        result
    }
}

fn close_on_link_error(state: &mut PortState, port_name: &str, error: &Dlt645Error) {
    if matches!(
        error,
        Dlt645Error::SerialPortError(_) | Dlt645Error::Timeout(_)
    ) && state.port.take().is_some()
    {
        warn!("Closed serial port {port_name} after error: {error}");
    }
}

async fn write_request(port: &mut BoxedPort, request: &[u8]) -> Result<()> {
    let mut padded = Vec::with_capacity(LINK_PREAMBLE.len() + request.len());
    padded.extend_from_slice(&LINK_PREAMBLE);
    padded.extend_from_slice(request);

    log_frame_hex("TX", &padded);
    port.write_all(&padded).await?;
    port.flush().await?;
    Ok(())
}

async fn exchange(port: &mut BoxedPort, config: &SerialConfig, request: &[u8]) -> Result<Vec<u8>> {
    write_request(port, request).await?;

    let chars = LINK_PREAMBLE.len() + request.len() + MAX_FRAME_SIZE;
    sleep(calculate_delay(config.baudrate, chars)).await;

    let raw = read_frame(port, config.timeout).await?;
    log_frame_hex("RX", &raw);
    Ok(extract_frame(&raw)?.to_vec())
}

/// Time to wait between writing a request and reading its response.
///
/// Baud rates of 0 or above 19200 use fixed 750 µs per character and
/// 1750 µs per frame.
pub fn calculate_delay(baudrate: u32, chars: usize) -> Duration {
    let (character_delay, frame_delay) = if baudrate == 0 || baudrate > MAX_TIMED_BAUDRATE {
        (DEFAULT_CHARACTER_DELAY_US, DEFAULT_FRAME_DELAY_US)
    } else {
        (
            CHARACTER_DELAY_NUMERATOR / baudrate as u64,
            FRAME_DELAY_NUMERATOR / baudrate as u64,
        )
    };
    Duration::from_micros(character_delay * chars as u64 + frame_delay)
}

async fn fill_to<R>(port: &mut R, buf: &mut Vec<u8>, target: usize, read_timeout: Duration) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = [0u8; MAX_FRAME_SIZE];
    while buf.len() < target {
        let n = timeout(read_timeout, port.read(&mut chunk))
            .await
            .map_err(|_| Dlt645Error::Timeout(read_timeout))??;
        if n == 0 {
            return Err(Dlt645Error::SerialPortError(
                "port reached end of stream".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

/// Reads one response frame, skipping up to 32 noise bytes ahead of it.
///
/// The returned buffer starts at the start delimiter and holds at least the
/// bytes the length field announces, capped at the largest frame.
pub async fn read_frame<R>(port: &mut R, read_timeout: Duration) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::with_capacity(MAX_FRAME_SIZE + MAX_LEADING_NOISE);
    fill_to(port, &mut buf, MIN_FRAME_SIZE, read_timeout).await?;

    let start = loop {
        match buf.iter().position(|&b| b == FRAME_HEAD) {
            Some(pos) if pos <= MAX_LEADING_NOISE => break pos,
            Some(_) => {
                return Err(Dlt645Error::FrameError(format!(
                    "no start delimiter within the first {MAX_LEADING_NOISE} bytes"
                )))
            }
            None if buf.len() > MAX_LEADING_NOISE => {
                return Err(Dlt645Error::FrameError(format!(
                    "no start delimiter within the first {MAX_LEADING_NOISE} bytes"
                )))
            }
            None => {
                let target = buf.len() + 1;
                fill_to(port, &mut buf, target, read_timeout).await?;
            }
        }
    };
    if start > 0 {
        warn!("Skipped {start} noise bytes before start delimiter");
        buf.drain(..start);
    }

    fill_to(port, &mut buf, DATA_OFFSET, read_timeout).await?;
    let declared = FRAME_OVERHEAD + buf[LENGTH_OFFSET] as usize;
    let total = declared.min(MAX_FRAME_SIZE);
    fill_to(port, &mut buf, total, read_timeout).await?;
    debug!("Read {} bytes, frame declares {declared}", buf.len());

    Ok(buf)
}

/// Locates the frame inside a raw read buffer.
///
/// The frame starts at the first start delimiter. It ends at the position
/// the length field announces when an end delimiter sits there, otherwise
/// at the first end delimiter after the start.
pub fn extract_frame(raw: &[u8]) -> Result<&[u8]> {
    let start = raw
        .iter()
        .position(|&b| b == FRAME_HEAD)
        .ok_or_else(|| Dlt645Error::FrameError("start delimiter not found".into()))?;

    if let Some(&len) = raw.get(start + LENGTH_OFFSET) {
        let end = start + FRAME_OVERHEAD + len as usize - 1;
        if raw.get(end) == Some(&FRAME_TAIL) {
            return Ok(&raw[start..=end]);
        }
    }

    let end = raw[start..]
        .iter()
        .position(|&b| b == FRAME_TAIL)
        .map(|offset| start + offset)
        .ok_or_else(|| Dlt645Error::FrameError("end delimiter not found".into()))?;
    Ok(&raw[start..=end])
}
