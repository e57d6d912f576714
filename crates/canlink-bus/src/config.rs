use std::time::Duration;

use canlink_transport::{DeviceSelector, TransportConfig};

use crate::correlator::DEFAULT_ACK_TIMEOUT;
use crate::verify::VerifyConfig;
use crate::window::DEFAULT_WINDOW_CAPACITY;

/// Configuration for a [`CanBus`](crate::CanBus).
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub transport: TransportConfig,
    /// Frames kept for [`recent_frames`](crate::CanBus::recent_frames) and
    /// verification. Default: 1000.
    pub window_capacity: usize,
    /// Time to wait for an ACK after a confirmed send. Default: 100 ms.
    pub ack_timeout: Duration,
    pub verify: VerifyConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            verify: VerifyConfig::default(),
        }
    }
}

impl BusConfig {
    pub fn with_selector(mut self, selector: DeviceSelector) -> Self {
        self.transport.selector = selector;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = capacity;
        self
    }
}
