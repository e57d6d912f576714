use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use canlink_frame::{decode_batch, encode_frame, Frame, FRAME_SIZE};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{DeviceSelector, LinkOpener, UsbLink};

/// Boxed future returned by [`FrameSink::deliver`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Minimum spacing between repeated read-error warnings.
const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Receives every batch of verified frames, in read order.
///
/// The read loop awaits each delivery before issuing the next read.
pub trait FrameSink: Send + Sync + 'static {
    fn deliver(&self, frames: Vec<Frame>) -> BoxFuture<'_, ()>;
}

/// Configuration for the USB transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub selector: DeviceSelector,
    /// Timeout of each bulk read. Default: 10 ms.
    pub read_timeout: Duration,
    /// Timeout of each bulk write. Default: 100 ms.
    pub write_timeout: Duration,
    /// Frames requested per bulk read. Default: 20.
    pub batch_frames: usize,
    /// Pause after an unexpected read error. Default: 100 ms.
    pub error_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            selector: DeviceSelector::default(),
            read_timeout: Duration::from_millis(10),
            write_timeout: Duration::from_millis(100),
            batch_frames: 20,
            error_backoff: Duration::from_millis(100),
        }
    }
}

impl TransportConfig {
    pub fn with_selector(mut self, selector: DeviceSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Bytes requested per bulk read.
    pub fn read_size(&self) -> usize {
        FRAME_SIZE * self.batch_frames.max(1)
    }
}

/// Snapshot of transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub reads: u64,
    pub read_timeouts: u64,
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub read_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    read_timeouts: AtomicU64,
    frames_received: AtomicU64,
    frames_rejected: AtomicU64,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
    read_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransportStats {
        TransportStats {
            reads: self.reads.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }
}

struct ReadLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the device link and the background read loop.
pub struct Transport {
    config: TransportConfig,
    opener: Arc<dyn LinkOpener>,
    runtime: Handle,
    link: Mutex<Option<Arc<dyn UsbLink>>>,
    reader: Mutex<Option<ReadLoop>>,
    counters: Arc<Counters>,
}

impl Transport {
    /// Create a transport. Nothing is opened until [`connect`](Self::connect).
    pub fn new(config: TransportConfig, opener: Arc<dyn LinkOpener>, runtime: Handle) -> Self {
        Self {
            config,
            opener,
            runtime,
            link: Mutex::new(None),
            reader: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Open the device. Returns `false` if it is absent or unusable.
    pub async fn connect(&self) -> bool {
        let opener = Arc::clone(&self.opener);
        let selector = self.config.selector;
        let opened = self
            .runtime
            .spawn_blocking(move || opener.open(&selector))
            .await
            .map_err(TransportError::from)
            .and_then(|res| res);

        match opened {
            Ok(link) => {
                info!(device = %link.describe(), "device connected");
                *lock(&self.link) = Some(link);
                true
            }
            Err(err) => {
                error!(selector = %selector, error = %err, "device connection failed");
                false
            }
        }
    }

    /// Cancel the read loop and drop the link, releasing the device.
    /// Safe to call repeatedly.
    ///
    /// The loop holds the last link reference and drops it once its
    /// in-flight read returns.
    pub fn disconnect(&self) {
        if let Some(ReadLoop { cancel, .. }) = lock(&self.reader).take() {
            cancel.cancel();
            debug!("read loop cancelled by disconnect");
        }
        if let Some(link) = lock(&self.link).take() {
            info!(device = %link.describe(), "device disconnected");
        }
    }

    /// Re-verify that the device is still attached.
    pub async fn is_connected(&self) -> bool {
        let Some(link) = self.current_link() else {
            return false;
        };
        let probe = Arc::clone(&link);
        let present = self
            .runtime
            .spawn_blocking(move || probe.is_present())
            .await
            .unwrap_or(false);
        if !present {
            let mut slot = lock(&self.link);
            if slot.as_ref().is_some_and(|l| Arc::ptr_eq(l, &link)) {
                slot.take();
                warn!(device = %link.describe(), "device no longer present");
                drop(slot);
                if let Some(reader) = lock(&self.reader).take() {
                    reader.cancel.cancel();
                }
            }
        }
        present
    }

    /// Whether the read loop is running.
    pub fn is_running(&self) -> bool {
        lock(&self.reader)
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Spawn the read loop, delivering every decoded batch to `sink`.
    pub fn start(&self, sink: Arc<dyn FrameSink>) -> Result<()> {
        let link = self.current_link().ok_or(TransportError::NotConnected)?;
        let mut reader = lock(&self.reader);
        if reader.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Err(TransportError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let task = self.runtime.spawn(read_loop(
            link,
            sink,
            self.config.clone(),
            Arc::clone(&self.counters),
            cancel.clone(),
        ));
        *reader = Some(ReadLoop { cancel, task });
        info!(read_size = self.config.read_size(), "read loop started");
        Ok(())
    }

    /// Cancel the read loop, wait for it to finish, then disconnect.
    pub async fn stop(&self) {
        let running = lock(&self.reader).take();
        if let Some(ReadLoop { cancel, task }) = running {
            cancel.cancel();
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "read loop ended abnormally");
                }
            }
        }
        self.disconnect();
        info!("transport stopped");
    }

    /// Encode and write one DATA frame.
    ///
    /// Invalid arguments are an error. Device problems are logged and
    /// reported as `Ok(false)`.
    pub async fn send(
        &self,
        node: u8,
        kind: u8,
        identifier: u32,
        length: u8,
        payload: &[u8],
    ) -> Result<bool> {
        let raw = encode_frame(node, kind, identifier, length, payload)?;

        if !self.is_connected().await {
            warn!(identifier, "send skipped, device not connected");
            Counters::bump(&self.counters.send_failures, 1);
            return Ok(false);
        }
        let Some(link) = self.current_link() else {
            Counters::bump(&self.counters.send_failures, 1);
            return Ok(false);
        };

        let timeout = self.config.write_timeout;
        let written = self
            .runtime
            .spawn_blocking(move || link.write_bulk(raw.as_ref(), timeout))
            .await
            .map_err(TransportError::from)
            .and_then(|res| res)
            .and_then(|n| {
                if n == FRAME_SIZE {
                    Ok(n)
                } else {
                    Err(TransportError::ShortWrite {
                        written: n,
                        expected: FRAME_SIZE,
                    })
                }
            });

        match written {
            Ok(_) => {
                Counters::bump(&self.counters.frames_sent, 1);
                debug!(identifier, length, "frame sent");
                Ok(true)
            }
            Err(err) => {
                Counters::bump(&self.counters.send_failures, 1);
                error!(identifier, error = %err, "frame send failed");
                Ok(false)
            }
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }

    fn current_link(&self) -> Option<Arc<dyn UsbLink>> {
        lock(&self.link).clone()
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("connected", &lock(&self.link).is_some())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn read_loop(
    link: Arc<dyn UsbLink>,
    sink: Arc<dyn FrameSink>,
    config: TransportConfig,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    let read_size = config.read_size();
    let timeout = config.read_timeout;
    let mut last_error_log: Option<Instant> = None;
    let mut suppressed: u64 = 0;

    loop {
        let reader = Arc::clone(&link);
        let read = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; read_size];
            reader.read_bulk(&mut buf, timeout).map(|n| {
                buf.truncate(n);
                buf
            })
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = read => res.map_err(TransportError::from).and_then(|res| res),
        };
        Counters::bump(&counters.reads, 1);

        match outcome {
            Ok(bytes) => {
                let batch = decode_batch(&bytes);
                Counters::bump(&counters.frames_received, batch.stats.decoded as u64);
                Counters::bump(&counters.frames_rejected, batch.stats.rejected as u64);
                if batch.is_empty() {
                    continue;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sink.deliver(batch.frames) => {}
                }
            }
            Err(TransportError::Timeout) => {
                Counters::bump(&counters.read_timeouts, 1);
            }
            Err(TransportError::Disconnected) => {
                warn!(device = %link.describe(), "device disconnected, read loop exiting");
                break;
            }
            Err(err) => {
                Counters::bump(&counters.read_errors, 1);
                let due = last_error_log.is_none_or(|at| at.elapsed() >= ERROR_LOG_INTERVAL);
                if due {
                    warn!(error = %err, suppressed, "read failed");
                    last_error_log = Some(Instant::now());
                    suppressed = 0;
                } else {
                    suppressed += 1;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.error_backoff) => {}
                }
            }
        }
    }

    debug!("read loop exited");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
