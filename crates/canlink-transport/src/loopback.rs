//! In-memory stand-in for the USB adapter.
//!
//! A [`LoopbackDevice`] is the test/simulation side of the wire: inject bytes
//! the adapter would send, inspect frames the host wrote, and pull the plug.
//! With auto-acknowledge enabled, every written DATA frame is answered with an
//! ACK frame carrying the same identifier, like the real adapter does.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use canlink_frame::{decode_frame, host_tick, Frame, Marker};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{DeviceSelector, LinkOpener, UsbLink};

#[derive(Debug)]
struct DeviceState {
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    present: bool,
    auto_ack: bool,
    fail_writes: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<DeviceState>,
    ready: Condvar,
}

/// Handle to a simulated adapter. Clones share the same device.
#[derive(Debug, Clone)]
pub struct LoopbackDevice {
    shared: Arc<Shared>,
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackDevice {
    /// A present device with auto-acknowledge disabled.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DeviceState {
                    inbound: VecDeque::new(),
                    written: Vec::new(),
                    present: true,
                    auto_ack: false,
                    fail_writes: false,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    pub fn with_auto_ack(self, enabled: bool) -> Self {
        self.set_auto_ack(enabled);
        self
    }

    pub fn set_auto_ack(&self, enabled: bool) {
        self.state().auto_ack = enabled;
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn set_fail_writes(&self, enabled: bool) {
        self.state().fail_writes = enabled;
    }

    /// Attach or detach the device. Blocked reads wake up on detach.
    pub fn set_present(&self, present: bool) {
        self.state().present = present;
        self.shared.ready.notify_all();
    }

    pub fn is_present(&self) -> bool {
        self.state().present
    }

    /// Queue raw bytes as if the adapter had sent them.
    pub fn inject(&self, bytes: &[u8]) {
        self.state().inbound.extend(bytes.iter().copied());
        self.shared.ready.notify_all();
    }

    /// Queue an encoded frame.
    pub fn inject_frame(&self, frame: &Frame) {
        self.inject(frame.to_wire().as_ref());
    }

    /// Frames written by the host so far, in order. Writes that do not decode
    /// are skipped.
    pub fn written_frames(&self) -> Vec<Frame> {
        self.state()
            .written
            .iter()
            .filter_map(|bytes| decode_frame(bytes).ok())
            .collect()
    }

    /// Number of bytes still waiting to be read by the host.
    pub fn pending_inbound(&self) -> usize {
        self.state().inbound.len()
    }

    pub fn opener(&self) -> LoopbackOpener {
        LoopbackOpener {
            device: self.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Opens [`LoopbackLink`]s to a shared [`LoopbackDevice`].
#[derive(Debug, Clone)]
pub struct LoopbackOpener {
    device: LoopbackDevice,
}

impl LoopbackOpener {
    pub fn device(&self) -> &LoopbackDevice {
        &self.device
    }
}

impl LinkOpener for LoopbackOpener {
    fn open(&self, selector: &DeviceSelector) -> Result<Arc<dyn UsbLink>> {
        if !self.device.is_present() {
            return Err(TransportError::DeviceNotFound {
                vendor_id: selector.vendor_id,
                product_id: selector.product_id,
            });
        }
        Ok(Arc::new(LoopbackLink {
            device: self.device.clone(),
        }))
    }
}

/// Link end held by the transport.
#[derive(Debug)]
pub struct LoopbackLink {
    device: LoopbackDevice,
}

impl UsbLink for LoopbackLink {
    fn read_bulk(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let guard = self.device.state();
        let (mut state, _) = self
            .device
            .shared
            .ready
            .wait_timeout_while(guard, timeout, |s| s.inbound.is_empty() && s.present)
            .unwrap_or_else(PoisonError::into_inner);

        if !state.present {
            return Err(TransportError::Disconnected);
        }
        if state.inbound.is_empty() {
            return Err(TransportError::Timeout);
        }

        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_bulk(&self, data: &[u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.device.state();
        if !state.present {
            return Err(TransportError::Disconnected);
        }
        if state.fail_writes {
            return Err(std::io::Error::other("simulated write failure").into());
        }
        state.written.push(data.to_vec());

        if state.auto_ack {
            if let Ok(frame) = decode_frame(data) {
                if frame.marker == Marker::Data {
                    let ack = Frame::new(
                        Marker::Ack,
                        host_tick(),
                        frame.node,
                        frame.kind,
                        frame.identifier,
                        frame.data(),
                    )?;
                    trace!(identifier = frame.identifier, "loopback acknowledging frame");
                    state.inbound.extend(ack.to_wire().as_ref().iter().copied());
                    self.device.shared.ready.notify_all();
                }
            }
        }
        Ok(data.len())
    }

    fn is_present(&self) -> bool {
        self.device.is_present()
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canlink_frame::{encode_frame, FRAME_SIZE};

    fn link(device: &LoopbackDevice) -> Arc<dyn UsbLink> {
        device.opener().open(&DeviceSelector::default()).unwrap()
    }

    #[test]
    fn read_times_out_when_idle() {
        let device = LoopbackDevice::new();
        let mut buf = [0u8; 50];
        let err = link(&device)
            .read_bulk(&mut buf, Duration::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[test]
    fn read_returns_injected_bytes() {
        let device = LoopbackDevice::new();
        let frame = Frame::new(Marker::Data, 1, 1, 0, 0x207, &[1, 2]).unwrap();
        device.inject_frame(&frame);

        let mut buf = [0u8; 100];
        let n = link(&device)
            .read_bulk(&mut buf, Duration::from_millis(5))
            .unwrap();
        assert_eq!(n, FRAME_SIZE);
        assert_eq!(decode_frame(&buf[..n]).unwrap(), frame);
        assert_eq!(device.pending_inbound(), 0);
    }

    #[test]
    fn unplugged_device_cannot_be_opened() {
        let device = LoopbackDevice::new();
        device.set_present(false);
        let err = device
            .opener()
            .open(&DeviceSelector::default())
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::DeviceNotFound { .. }));
    }

    #[test]
    fn unplug_surfaces_as_disconnect() {
        let device = LoopbackDevice::new();
        let link = link(&device);
        device.set_present(false);

        let mut buf = [0u8; 25];
        assert!(matches!(
            link.read_bulk(&mut buf, Duration::from_millis(5)),
            Err(TransportError::Disconnected)
        ));
        assert!(!link.is_present());
    }

    #[test]
    fn auto_ack_answers_data_writes() {
        let device = LoopbackDevice::new().with_auto_ack(true);
        let link = link(&device);
        let raw = encode_frame(1, 0, 0x301, 1, &[0x0A]).unwrap();
        assert_eq!(
            link.write_bulk(raw.as_ref(), Duration::from_millis(5)).unwrap(),
            FRAME_SIZE
        );

        let mut buf = [0u8; 25];
        link.read_bulk(&mut buf, Duration::from_millis(5)).unwrap();
        let ack = decode_frame(&buf).unwrap();
        assert_eq!(ack.marker, Marker::Ack);
        assert_eq!(ack.identifier, 0x301);
        assert_eq!(device.written_frames().len(), 1);
    }

    #[test]
    fn failing_writes_are_reported() {
        let device = LoopbackDevice::new();
        device.set_fail_writes(true);
        let raw = encode_frame(1, 0, 0x1, 0, &[]).unwrap();
        assert!(matches!(
            link(&device).write_bulk(raw.as_ref(), Duration::from_millis(5)),
            Err(TransportError::Io(_))
        ));
    }
}
