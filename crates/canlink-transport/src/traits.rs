use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Vendor id of the CAN adapter.
pub const DEFAULT_VENDOR_ID: u16 = 0x5458;

/// Product id of the CAN adapter.
pub const DEFAULT_PRODUCT_ID: u16 = 0x1222;

/// Interface carrying the bulk endpoints.
pub const DEFAULT_INTERFACE: u8 = 1;

/// Which device and interface to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSelector {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            interface: DEFAULT_INTERFACE,
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} interface {}",
            self.vendor_id, self.product_id, self.interface
        )
    }
}

/// An open pair of bulk endpoints.
///
/// Calls block, so async code must run them on a blocking thread.
pub trait UsbLink: Send + Sync {
    /// Read up to `buf.len()` bytes from the IN endpoint.
    ///
    /// Returns [`TransportError::Timeout`](crate::TransportError::Timeout)
    /// when nothing arrived within `timeout`.
    fn read_bulk(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write `data` to the OUT endpoint, returning the bytes written.
    fn write_bulk(&self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Whether the device is still attached.
    fn is_present(&self) -> bool;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Opens links to a device.
pub trait LinkOpener: Send + Sync {
    fn open(&self, selector: &DeviceSelector) -> Result<Arc<dyn UsbLink>>;
}
