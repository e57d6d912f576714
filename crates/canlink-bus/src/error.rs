/// Errors raised while building match criteria.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriteriaError {
    /// The payload contains characters other than hex digits and `XX`.
    #[error("invalid payload pattern: {0:?}")]
    InvalidPayload(String),

    /// The payload does not split into whole bytes.
    #[error("payload must have an even number of hex digits: {0:?}")]
    OddPayloadLength(String),

    /// The identifier is neither decimal nor `0x`-prefixed hex.
    #[error("invalid CAN identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The field name does not name a frame field.
    #[error("unknown frame field: {0:?}")]
    UnknownField(String),
}

/// Errors that can occur in bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] canlink_transport::TransportError),

    /// Invalid match criteria.
    #[error("invalid criteria: {0}")]
    Criteria(#[from] CriteriaError),

    /// The frame could not be written to the device.
    #[error("failed to send frame 0x{identifier:X}")]
    SendFailed { identifier: u32 },

    /// Frames arrived before the deadline but none matched.
    #[error("no matching frame among {observed} observed ({criteria})")]
    NoMatchFound { observed: u64, criteria: String },
}

pub type Result<T> = std::result::Result<T, BusError>;
