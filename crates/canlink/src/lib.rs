//! Test-bench access to a CAN bus through a USB bulk adapter.
//!
//! The adapter wraps every CAN frame in a fixed 25-byte record with a CRC-32
//! trailer. This crate decodes that stream, routes frames to subscribers,
//! pairs sent frames with the adapter's acknowledgements, and lets test code
//! wait for a frame with given field values.
//!
//! # Crate Structure
//!
//! - [`frame`]: the 25-byte wire codec, checksum and text rendering
//! - [`transport`]: USB bulk link, read loop and the in-memory loopback
//! - [`bus`]: subscriptions, confirmed sends and frame verification
//!
//! Real hardware access needs the `usb` feature. Without it, only the
//! loopback device is available.

/// Re-export frame types.
pub mod frame {
    pub use canlink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use canlink_transport::*;
}

/// Re-export bus types.
pub mod bus {
    pub use canlink_bus::*;
}
