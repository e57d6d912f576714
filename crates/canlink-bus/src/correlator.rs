//! Pairs a sent DATA frame with the adapter's ACK for the same identifier.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use canlink_frame::{hex_identifier, Frame, Marker};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::dispatcher::{Dispatcher, Listener};

/// Default time to wait for an acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(100);

/// Result of waiting for an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The adapter acknowledged; `tick` is the ACK frame's tick.
    Acknowledged { tick: u32 },
    /// Nothing arrived in time. Not an error; the caller decides.
    NoAcknowledgement,
}

impl AckOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, AckOutcome::Acknowledged { .. })
    }
}

/// An armed correlation. Must be passed to [`AckCorrelator::wait`] or
/// [`AckCorrelator::cancel`] so the transient listener is removed.
#[derive(Debug)]
pub struct PendingAck {
    identifier: u32,
    listener: Listener,
    rx: oneshot::Receiver<u32>,
}

impl PendingAck {
    pub fn identifier(&self) -> u32 {
        self.identifier
    }
}

/// Resolves pending acknowledgements through transient dispatcher listeners.
#[derive(Debug)]
pub struct AckCorrelator {
    dispatcher: Arc<Dispatcher>,
    timeout: Duration,
}

impl AckCorrelator {
    pub fn new(dispatcher: Arc<Dispatcher>, timeout: Duration) -> Self {
        Self {
            dispatcher,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Listen for an ACK on `identifier`. Call before writing the frame so an
    /// immediate acknowledgement is not missed.
    pub fn arm(&self, identifier: u32) -> PendingAck {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let listener = Listener::sync(move |frame: &Frame| {
            let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(tx) = sender {
                let _ = tx.send(frame.tick);
            }
        });
        self.dispatcher.subscribe(identifier, Marker::Ack, &listener);
        PendingAck {
            identifier,
            listener,
            rx,
        }
    }

    /// Wait up to the configured timeout for the acknowledgement.
    pub async fn wait(&self, pending: PendingAck) -> AckOutcome {
        let PendingAck {
            identifier,
            listener,
            rx,
        } = pending;
        let received = tokio::time::timeout(self.timeout, rx).await;
        self.dispatcher.unsubscribe(identifier, Marker::Ack, &listener);

        match received {
            Ok(Ok(tick)) => {
                debug!(identifier = %hex_identifier(identifier), tick, "frame acknowledged");
                AckOutcome::Acknowledged { tick }
            }
            _ => {
                info!(
                    identifier = %hex_identifier(identifier),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "no acknowledgement received"
                );
                AckOutcome::NoAcknowledgement
            }
        }
    }

    /// Drop a pending correlation without waiting.
    pub fn cancel(&self, pending: PendingAck) {
        self.dispatcher.unsubscribe(pending.identifier, Marker::Ack, &pending.listener);
    }
}
