//! USB bulk transport for CAN adapter frames.
//!
//! Provides a blocking link abstraction over the adapter's bulk endpoints and
//! an async [`Transport`] that runs a batched read loop on a caller-supplied
//! tokio runtime:
//! - `rusb` backend (behind the `usb` feature)
//! - In-memory loopback device for tests and simulation
//!
//! Read timeouts and malformed frames are absorbed here; consumers only ever
//! see verified frames.

pub mod error;
pub mod loopback;
pub mod traits;
pub mod transport;

#[cfg(feature = "usb")]
pub mod usb;

pub use error::{Result, TransportError};
pub use loopback::{LoopbackDevice, LoopbackLink, LoopbackOpener};
pub use traits::{
    DeviceSelector, LinkOpener, UsbLink, DEFAULT_INTERFACE, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID,
};
pub use transport::{BoxFuture, FrameSink, Transport, TransportConfig, TransportStats};

#[cfg(feature = "usb")]
pub use usb::{RusbLink, RusbOpener};
