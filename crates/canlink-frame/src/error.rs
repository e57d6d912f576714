/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The input is not exactly one frame long.
    #[error("invalid frame size ({size} bytes, expected 25)")]
    InvalidSize { size: usize },

    /// The marker is neither DATA (0xFFFF) nor ACK (0xAAAA).
    #[error("unknown frame marker 0x{0:04X}")]
    UnknownMarker(u16),

    /// The declared data length is larger than the payload field.
    #[error("declared data length {0} exceeds 8 bytes")]
    InvalidLength(u8),

    /// The stored checksum does not match the computed one.
    #[error("checksum mismatch (computed 0x{expected:08X}, stored 0x{actual:08X})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The payload or data length exceeds the 8-byte payload field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// More payload bytes were supplied than the declared data length.
    #[error("payload has {size} bytes but data length is {length}")]
    PayloadExceedsLength { size: usize, length: u8 },

    /// A field name did not match any known frame field.
    #[error("unknown frame field: {0}")]
    UnknownField(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
