use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use canlink_frame::{hex_identifier, Frame, Marker};
use canlink_transport::{BoxFuture, FrameSink, LinkOpener, Transport, TransportStats};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::BusConfig;
use crate::correlator::{AckCorrelator, AckOutcome};
use crate::criteria::Criteria;
use crate::dispatcher::{Dispatcher, Listener};
use crate::error::{BusError, Result};
use crate::verify::{Verdict, Watch};
use crate::window::SharedWindow;

/// Records every batch in the window, then dispatches it.
struct BusSink {
    window: SharedWindow,
    dispatcher: Arc<Dispatcher>,
}

impl FrameSink for BusSink {
    fn deliver(&self, frames: Vec<Frame>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.window.extend(&frames);
            self.dispatcher.dispatch_batch(&frames).await;
        })
    }
}

/// The CAN adapter as seen by test code.
///
/// Wires the transport's read loop into the message window and the
/// subscription dispatcher, and offers confirmed sends and frame
/// verification on top.
pub struct CanBus {
    transport: Transport,
    dispatcher: Arc<Dispatcher>,
    window: SharedWindow,
    correlator: AckCorrelator,
    config: BusConfig,
}

impl CanBus {
    /// Create a bus. All tasks run on `runtime`.
    pub fn new(config: BusConfig, opener: Arc<dyn LinkOpener>, runtime: Handle) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        Self {
            transport: Transport::new(config.transport.clone(), opener, runtime),
            correlator: AckCorrelator::new(Arc::clone(&dispatcher), config.ack_timeout),
            window: SharedWindow::new(config.window_capacity),
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub async fn connect(&self) -> bool {
        self.transport.connect().await
    }

    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Start receiving. The bus must be connected.
    pub fn start(&self) -> Result<()> {
        let sink = BusSink {
            window: self.window.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
        };
        self.transport.start(Arc::new(sink))?;
        Ok(())
    }

    /// Stop receiving and disconnect.
    pub async fn stop(&self) {
        self.transport.stop().await;
    }

    pub fn subscribe(&self, identifier: u32, marker: Marker, listener: &Listener) -> bool {
        self.dispatcher.subscribe(identifier, marker, listener)
    }

    pub fn unsubscribe(&self, identifier: u32, marker: Marker, listener: &Listener) -> bool {
        self.dispatcher.unsubscribe(identifier, marker, listener)
    }

    /// Send one DATA frame without waiting for an acknowledgement.
    pub async fn send(
        &self,
        node: u8,
        kind: u8,
        identifier: u32,
        length: u8,
        payload: &[u8],
    ) -> Result<bool> {
        Ok(self
            .transport
            .send(node, kind, identifier, length, payload)
            .await?)
    }

    /// Send one DATA frame and wait for the matching ACK.
    ///
    /// A missing ACK is reported as [`AckOutcome::NoAcknowledgement`]; a
    /// frame that could not be written is [`BusError::SendFailed`].
    pub async fn send_confirmed(
        &self,
        node: u8,
        kind: u8,
        identifier: u32,
        length: u8,
        payload: &[u8],
    ) -> Result<AckOutcome> {
        let pending = self.correlator.arm(identifier);
        match self
            .transport
            .send(node, kind, identifier, length, payload)
            .await
        {
            Ok(true) => Ok(self.correlator.wait(pending).await),
            Ok(false) => {
                self.correlator.cancel(pending);
                Err(BusError::SendFailed { identifier })
            }
            Err(err) => {
                self.correlator.cancel(pending);
                Err(err.into())
            }
        }
    }

    /// Up to `n` most recent frames, oldest first.
    pub fn recent_frames(&self, n: usize) -> Vec<Frame> {
        self.window.recent(n).into_iter().map(|e| e.frame).collect()
    }

    pub fn clear_window(&self) {
        self.window.clear();
    }

    pub fn window(&self) -> &SharedWindow {
        &self.window
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// A watch over this bus's window, not yet baselined.
    pub fn watch(&self, criteria: Criteria) -> Watch {
        Watch::new(self.window.clone(), criteria, self.config.verify.clone())
    }

    /// Wait for a frame arriving from now on that satisfies `criteria`.
    pub async fn verify(&self, criteria: Criteria, timeout: Duration) -> Verdict {
        self.watch(criteria).run(timeout).await
    }

    /// Like [`verify`](Self::verify), collapsed to a boolean.
    ///
    /// Silence until the deadline is `Ok(false)`. Frames that arrived but
    /// did not match are [`BusError::NoMatchFound`].
    pub async fn await_match(&self, criteria: Criteria, timeout: Duration) -> Result<bool> {
        let described = criteria.to_string();
        match self.verify(criteria, timeout).await {
            Verdict::Matched(_) => Ok(true),
            Verdict::NoFramesSeen => Ok(false),
            Verdict::NoMatchAmongSeen { observed } => Err(BusError::NoMatchFound {
                observed,
                criteria: described,
            }),
        }
    }

    /// Collect every frame on `(marker, identifier)` for `duration`.
    pub async fn collect(&self, identifier: u32, marker: Marker, duration: Duration) -> Vec<Frame> {
        self.collect_until(identifier, marker, tokio::time::sleep(duration)).await
    }

    /// Collect every frame on `(marker, identifier)` until `stop` completes.
    ///
    /// Frames gathered before `stop` resolves are returned; the listener is
    /// removed either way.
    pub async fn collect_until<F>(&self, identifier: u32, marker: Marker, stop: F) -> Vec<Frame>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let listener = Listener::sync(move |frame: &Frame| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(*frame);
        });

        self.dispatcher.subscribe(identifier, marker, &listener);
        stop.await;
        self.dispatcher.unsubscribe(identifier, marker, &listener);

        let frames = std::mem::take(
            &mut *collected
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if frames.is_empty() {
            warn!(
                identifier = %hex_identifier(identifier),
                %marker,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "no frames collected"
            );
        } else {
            info!(
                identifier = %hex_identifier(identifier),
                %marker,
                count = frames.len(),
                "frames collected"
            );
        }
        frames
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }
}

impl fmt::Debug for CanBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanBus")
            .field("transport", &self.transport)
            .field("dispatcher", &self.dispatcher)
            .field("window_len", &self.window.len())
            .finish()
    }
}
