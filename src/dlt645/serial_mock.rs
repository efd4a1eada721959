//! Mock serial port implementation for testing
//!
//! This module provides a mock serial port and opener so the DL/T 645
//! transport can be exercised without real hardware.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::constants::{FRAME_HEAD, FRAME_TAIL};
use crate::dlt645::frame::{encode_address, obfuscate};
use crate::dlt645::serial::{BoxedPort, PortOpener, SerialConfig};
use crate::error::{Dlt645Error, Result};
use crate::util::checksum::checksum;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock serial port that simulates bidirectional communication.
///
/// Clones share their buffers, so a test can keep one handle while the
/// transport owns another.
#[derive(Clone, Default)]
pub struct MockSerialPort {
    /// Data written to the port (outgoing)
    pub tx_buffer: Arc<Mutex<Vec<u8>>>,
    /// Data to be read from the port (incoming)
    pub rx_buffer: Arc<Mutex<VecDeque<u8>>>,
    /// Error returned by the next read or write
    pub next_error: Arc<Mutex<Option<io::Error>>>,
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        lock(&self.rx_buffer).extend(data);
    }

    /// Queue a response frame from `address`
    pub fn queue_response(&self, address: u64, control: u8, data: &[u8]) -> Result<()> {
        let frame = response_frame(address, control, data)?;
        self.queue_rx_data(&frame);
        Ok(())
    }

    /// Get data that was written to the port
    pub fn get_tx_data(&self) -> Vec<u8> {
        lock(&self.tx_buffer).clone()
    }

    pub fn clear(&self) {
        lock(&self.tx_buffer).clear();
        lock(&self.rx_buffer).clear();
    }

    /// Set an error to be returned on the next operation
    pub fn set_next_error(&self, error: io::Error) {
        *lock(&self.next_error) = Some(error);
    }
}

/// Builds a slave response frame.
pub fn response_frame(address: u64, control: u8, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > u8::MAX as usize {
        return Err(Dlt645Error::InvalidArgument(format!(
            "response data of {} bytes does not fit the length field",
            data.len()
        )));
    }
    let mut frame = vec![FRAME_HEAD];
    frame.extend_from_slice(&encode_address(address)?);
    frame.push(FRAME_HEAD);
    frame.push(control);
    frame.push(data.len() as u8);
    frame.extend(obfuscate(data));
    frame.push(checksum(&frame));
    frame.push(FRAME_TAIL);
    Ok(frame)
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(error) = lock(&self.next_error).take() {
            return Poll::Ready(Err(error));
        }

        // An empty queue reads as end of stream.
        let mut rx = lock(&self.rx_buffer);
        let available = rx.len().min(buf.remaining());
        if available > 0 {
            let data: Vec<u8> = rx.drain(..available).collect();
            buf.put_slice(&data);
        }

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(error) = lock(&self.next_error).take() {
            return Poll::Ready(Err(error));
        }

        lock(&self.tx_buffer).extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Hands out clones of one [`MockSerialPort`] and counts the opens.
#[derive(Clone, Default)]
pub struct MockPortOpener {
    pub port: MockSerialPort,
    opens: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl MockPortOpener {
    pub fn new(port: MockSerialPort) -> Self {
        MockPortOpener {
            port,
            ..Self::default()
        }
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl PortOpener for MockPortOpener {
    fn open(&self, config: &SerialConfig) -> Result<BoxedPort> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Dlt645Error::SerialPortError(format!(
                "cannot open {}",
                config.port
            )));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.port.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_queue_response_frame() {
        let port = MockSerialPort::new();
        port.queue_response(304_257_140_001, 0x93, &[]).unwrap();

        let rx = lock(&port.rx_buffer);
        assert_eq!(
            rx.iter().copied().collect::<Vec<_>>(),
            vec![0x68, 0x01, 0x00, 0x14, 0x57, 0x42, 0x30, 0x68, 0x93, 0x00, 0x41, 0x16]
        );
    }

    #[tokio::test]
    async fn test_read_write_through_clone() {
        let port = MockSerialPort::new();
        let mut handle = port.clone();
        port.queue_rx_data(&[1, 2, 3]);

        handle.write_all(&[0xFE, 0x68]).await.unwrap();
        let mut buf = [0u8; 8];
        let n = handle.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], &[1, 2, 3]);
        assert_eq!(port.get_tx_data(), vec![0xFE, 0x68]);
        assert_eq!(handle.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_error_is_returned_once() {
        let mut port = MockSerialPort::new();
        port.set_next_error(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        assert!(port.write_all(&[1]).await.is_err());
        assert!(port.write_all(&[1]).await.is_ok());
    }

    #[test]
    fn test_opener_counts_and_fails() {
        let opener = MockPortOpener::default();
        let config = SerialConfig::default();
        opener.fail_next_opens(1);
        assert!(opener.open(&config).is_err());
        assert!(opener.open(&config).is_ok());
        assert_eq!(opener.open_count(), 1);
    }
}
