use canlink_frame::FrameError;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No device with the requested vendor/product id is attached.
    #[error("device not found (VID=0x{vendor_id:04X}, PID=0x{product_id:04X})")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// The interface or one of its bulk endpoints could not be resolved.
    #[error("no bulk {direction} endpoint on interface {interface}")]
    EndpointNotFound {
        interface: u8,
        direction: &'static str,
    },

    /// A bulk transfer timed out. Normal for reads on an idle bus.
    #[error("transfer timed out")]
    Timeout,

    /// The device went away.
    #[error("device disconnected")]
    Disconnected,

    /// No link is open.
    #[error("transport not connected")]
    NotConnected,

    /// The read loop is already running.
    #[error("read loop already running")]
    AlreadyRunning,

    /// Fewer bytes than a full frame were written.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// The frame could not be encoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A libusb error not covered above.
    #[cfg(feature = "usb")]
    #[error("usb error: {0}")]
    Usb(rusb::Error),

    /// A blocking USB call panicked or was aborted.
    #[error("blocking task failed: {0}")]
    Task(String),

    /// An I/O error occurred on the link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for TransportError {
    fn from(err: tokio::task::JoinError) -> Self {
        TransportError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
