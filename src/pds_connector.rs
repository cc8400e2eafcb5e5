//! Device discovery and session setup.
//!
//! Owon PDS scopes enumerate with a fixed vendor/product id pair; a
//! device is selected by its position among the matches (0 = first).

use rusb::{Context, UsbContext};

use crate::frame::SCOPE_NAME_LEN;
use crate::usb_transport::{TransportError, UsbTransport, USB_CONFIG, USB_INTERFACE};

const USB_VID: u16 = 0x5345;
const USB_PID: u16 = 0x1234;

/// One enumerated scope, identified by its position in enumeration order.
#[derive(Debug, Clone)]
pub struct PdsDevice {
    /// Index to pass to [`PdsConnector::open`].
    pub index: usize,
    pub bus: u8,
    pub address: u8,
}

/// Descriptor strings fetched once when a session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub product: String,
    /// Short device name, the first product token truncated to the
    /// length the scope uses for the name it stamps into vector files.
    pub name: String,
}

impl DeviceIdentity {
    pub(crate) fn from_descriptors(manufacturer: String, product: String) -> Self {
        let name = product
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .chars()
            .take(SCOPE_NAME_LEN)
            .collect();
        Self {
            manufacturer,
            product,
            name,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdsConnectorError {
    #[error("no Owon PDS device at index {index}")]
    DeviceNotFound { index: usize },

    #[error("USB transport error: {0}")]
    Transport(#[from] TransportError),
}

pub struct PdsConnector;

impl PdsConnector {
    /// List all connected Owon PDS devices in enumeration order.
    pub fn available_devices() -> Result<Vec<PdsDevice>, PdsConnectorError> {
        let context = Context::new().map_err(TransportError::from_usb)?;
        let mut found = Vec::new();

        for device in context
            .devices()
            .map_err(TransportError::from_usb)?
            .iter()
        {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(_) => continue,
            };
            if descriptor.vendor_id() == USB_VID && descriptor.product_id() == USB_PID {
                found.push(PdsDevice {
                    index: found.len(),
                    bus: device.bus_number(),
                    address: device.address(),
                });
            }
        }

        Ok(found)
    }

    /// Open the nth matching device and fetch its identity strings.
    pub fn open(index: usize) -> Result<(UsbTransport, DeviceIdentity), PdsConnectorError> {
        let context = Context::new().map_err(TransportError::from_usb)?;
        let mut matched = 0usize;

        for device in context
            .devices()
            .map_err(TransportError::from_usb)?
            .iter()
        {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(_) => continue,
            };
            if descriptor.vendor_id() != USB_VID || descriptor.product_id() != USB_PID {
                continue;
            }
            if matched < index {
                matched += 1;
                continue;
            }

            log::debug!(
                "opening Owon PDS at bus {} address {}",
                device.bus_number(),
                device.address()
            );
            let mut handle = device.open().map_err(TransportError::from_usb)?;
            handle
                .set_active_configuration(USB_CONFIG)
                .map_err(TransportError::from_usb)?;
            handle
                .claim_interface(USB_INTERFACE)
                .map_err(TransportError::from_usb)?;

            // Descriptor strings are informative only; a device without
            // them still captures.
            let manufacturer = handle
                .read_manufacturer_string_ascii(&descriptor)
                .unwrap_or_default();
            let product = handle
                .read_product_string_ascii(&descriptor)
                .unwrap_or_default();
            let identity = DeviceIdentity::from_descriptors(manufacturer, product);
            log::debug!(
                "device identity: {} / {} ({})",
                identity.manufacturer,
                identity.product,
                identity.name
            );

            return Ok((UsbTransport::new(handle), identity));
        }

        Err(PdsConnectorError::DeviceNotFound { index })
    }
}
