//! USB bulk transport to the scope.
//!
//! The Owon PDS answers a `START` command on the write endpoint with a 12
//! byte transfer header and the capture payload on the read endpoint. The
//! session only depends on the [`ScopeTransport`] trait, so captures can
//! be replayed from canned buffers in tests.

use std::time::Duration;

use rusb::{Context, DeviceHandle};

use crate::frame::{FrameError, TransferHeader, TRANSFER_HEADER_LEN};

pub(crate) const USB_CONFIG: u8 = 1;
pub(crate) const USB_INTERFACE: u8 = 0;

const WRITE_ENDPOINT: u8 = 0x03;
const READ_ENDPOINT: u8 = 0x81;
const TRANSFER_TIMEOUT: Duration = Duration::from_millis(2000);

/// Capture request command. The trailing NUL is part of the protocol.
pub const CMD_START: &[u8] = b"START\0";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(rusb::Error),

    #[error("Transfer timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed transfer header: {0}")]
    Header(#[from] FrameError),

    #[error("Short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    // Timeouts are kept distinct so callers can retry a slow device
    // instead of treating it as disconnected.
    pub(crate) fn from_usb(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Timeout => Self::Timeout(TRANSFER_TIMEOUT),
            other => Self::Usb(other),
        }
    }
}

/// One request/response exchange with a scope.
///
/// Implementations block until the device answers or their timeout
/// expires; no retries happen at this layer.
pub trait ScopeTransport {
    /// Send a command and return the raw capture payload it produces.
    fn transfer(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Release the underlying device. Idempotent.
    fn close(&mut self);
}

/// rusb-backed transport for an opened Owon PDS device.
///
/// Created by [`PdsConnector::open`](crate::PdsConnector::open).
pub struct UsbTransport {
    handle: Option<DeviceHandle<Context>>,
}

impl UsbTransport {
    pub(crate) fn new(handle: DeviceHandle<Context>) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl ScopeTransport for UsbTransport {
    fn transfer(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::Closed)?;

        log::debug!("sending {} byte capture request", request.len());
        let written = handle
            .write_bulk(WRITE_ENDPOINT, request, TRANSFER_TIMEOUT)
            .map_err(TransportError::from_usb)?;
        if written != request.len() {
            return Err(TransportError::ShortTransfer {
                expected: request.len(),
                actual: written,
            });
        }

        let mut header = [0u8; TRANSFER_HEADER_LEN];
        read_exact(handle, &mut header)?;
        log::trace!("transfer header bytes: {header:02x?}");

        let header = TransferHeader::parse(&header)?;
        log::debug!(
            "reading {} byte payload (bitmap: {})",
            header.payload_len(),
            header.is_bitmap()
        );

        let mut payload = vec![0u8; header.payload_len()];
        read_exact(handle, &mut payload)?;
        Ok(payload)
    }

    fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(error) = handle.release_interface(USB_INTERFACE) {
                log::debug!("releasing interface failed: {error}");
            }
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// Bulk reads may return short; keep reading until the buffer is full.
fn read_exact(handle: &DeviceHandle<Context>, buffer: &mut [u8]) -> Result<(), TransportError> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = handle
            .read_bulk(READ_ENDPOINT, &mut buffer[filled..], TRANSFER_TIMEOUT)
            .map_err(TransportError::from_usb)?;
        if read == 0 {
            return Err(TransportError::ShortTransfer {
                expected: buffer.len(),
                actual: filled,
            });
        }
        filled += read;
    }
    Ok(())
}
