//! Fixed-size CAN-over-USB frame codec.
//!
//! Every frame on the wire is exactly 25 bytes, little-endian:
//! - A 2-byte marker (`0xFFFF` data, `0xAAAA` acknowledgement)
//! - A 4-byte sender tick, node and kind bytes, a 4-byte CAN identifier
//! - A 1-byte data length and an 8-byte zero-padded payload
//! - A 4-byte CRC-32 over the first 21 bytes
//!
//! Frames that fail any check are rejected here and never reach consumers.

pub mod batch;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod marker;
pub mod render;

pub use batch::{decode_batch, BatchStats, FrameBatch};
pub use checksum::checksum;
pub use codec::{
    decode_frame, encode_frame, host_tick, Frame, RawFrame, CHECKSUM_OFFSET, FRAME_SIZE,
    MAX_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use marker::{marker_name, Marker, ACK, DATA};
pub use render::{hex_checksum, hex_identifier, hex_payload, FrameField};
