//! Bounded history of received frames and the "already observed" set.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use canlink_frame::{Frame, FRAME_SIZE};
use xxhash_rust::xxh3::xxh3_64;

/// Default number of frames kept in the window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

/// Default cap of the seen set.
pub const DEFAULT_SEEN_CAPACITY: usize = 10_000;

/// A frame with its arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Monotonic arrival sequence number, never reused.
    pub seq: u64,
    pub received_at: Instant,
    pub frame: Frame,
}

impl WindowEntry {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

/// Content hash of one window entry.
///
/// The arrival sequence is hashed in, so a byte-identical frame received
/// twice yields two fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn of(entry: &WindowEntry) -> Self {
        let mut buf = [0u8; FRAME_SIZE + 8];
        buf[..FRAME_SIZE].copy_from_slice(entry.frame.to_wire().as_ref());
        buf[FRAME_SIZE..].copy_from_slice(&entry.seq.to_le_bytes());
        Self(xxh3_64(&buf))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Capped FIFO of recent frames; the oldest entry is evicted first.
#[derive(Debug)]
pub struct MessageWindow {
    capacity: usize,
    next_seq: u64,
    entries: VecDeque<WindowEntry>,
}

impl Default for MessageWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl MessageWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_seq: 0,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a frame, returning its sequence number.
    pub fn push(&mut self, frame: Frame) -> u64 {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(WindowEntry {
            seq,
            received_at: Instant::now(),
            frame,
        });
        seq
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<WindowEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).copied().collect()
    }

    /// Drop all entries. Sequence numbers keep counting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Sequence number the next pushed frame will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A [`MessageWindow`] shared between the read loop and its readers.
#[derive(Debug, Clone, Default)]
pub struct SharedWindow {
    inner: Arc<Mutex<MessageWindow>>,
}

impl SharedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MessageWindow::new(capacity))),
        }
    }

    pub fn push(&self, frame: Frame) -> u64 {
        self.lock().push(frame)
    }

    pub fn extend(&self, frames: &[Frame]) {
        let mut window = self.lock();
        for frame in frames {
            window.push(*frame);
        }
    }

    pub fn recent(&self, n: usize) -> Vec<WindowEntry> {
        self.lock().recent(n)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn next_seq(&self) -> u64 {
        self.lock().next_seq()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    fn lock(&self) -> MutexGuard<'_, MessageWindow> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Insertion-ordered set of fingerprints.
///
/// [`trim`](Self::trim) evicts the oldest entries once the set grows past
/// its capacity, keeping the newest half.
#[derive(Debug, Clone)]
pub struct SeenSet {
    capacity: usize,
    members: HashSet<Fingerprint>,
    order: VecDeque<Fingerprint>,
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAPACITY)
    }
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            members: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns `true` if the fingerprint was not seen before.
    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        if !self.members.insert(fingerprint) {
            return false;
        }
        self.order.push_back(fingerprint);
        true
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.members.contains(fingerprint)
    }

    /// Evict down to the newest `capacity / 2` entries if over capacity.
    /// Returns the number evicted.
    pub fn trim(&mut self) -> usize {
        if self.order.len() <= self.capacity {
            return 0;
        }
        let evict = self.order.len() - self.capacity / 2;
        for fingerprint in self.order.drain(..evict) {
            self.members.remove(&fingerprint);
        }
        evict
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canlink_frame::Marker;

    fn frame(identifier: u32) -> Frame {
        Frame::new(Marker::Data, 0, 1, 0, identifier, &[]).unwrap()
    }

    #[test]
    fn window_evicts_oldest_first() {
        let mut window = MessageWindow::new(3);
        for id in 1..=5 {
            window.push(frame(id));
        }
        let ids: Vec<u32> = window.recent(10).iter().map(|e| e.frame.identifier).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn recent_returns_newest_in_arrival_order() {
        let mut window = MessageWindow::new(10);
        for id in 1..=5 {
            window.push(frame(id));
        }
        let recent = window.recent(2);
        assert_eq!(recent[0].frame.identifier, 4);
        assert_eq!(recent[1].frame.identifier, 5);
        assert!(recent[0].seq < recent[1].seq);
    }

    #[test]
    fn sequence_survives_clear() {
        let mut window = MessageWindow::new(4);
        let first = window.push(frame(1));
        window.clear();
        let second = window.push(frame(1));
        assert!(second > first);
    }

    #[test]
    fn identical_frames_get_distinct_fingerprints() {
        let mut window = MessageWindow::new(4);
        window.push(frame(7));
        window.push(frame(7));
        let entries = window.recent(2);
        assert_ne!(entries[0].fingerprint(), entries[1].fingerprint());
        assert_eq!(entries[0].fingerprint(), Fingerprint::of(&entries[0]));
    }

    #[test]
    fn seen_set_rejects_duplicates() {
        let mut window = MessageWindow::new(4);
        window.push(frame(1));
        let fp = window.recent(1)[0].fingerprint();

        let mut seen = SeenSet::default();
        assert!(seen.insert(fp));
        assert!(!seen.insert(fp));
        assert!(seen.contains(&fp));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn seen_set_trim_keeps_newest_half() {
        let mut window = MessageWindow::new(20);
        let mut seen = SeenSet::new(10);
        for id in 0..12 {
            window.push(frame(id));
        }
        let entries = window.recent(12);
        for entry in &entries {
            seen.insert(entry.fingerprint());
        }

        assert_eq!(seen.trim(), 7);
        assert_eq!(seen.len(), 5);
        assert!(!seen.contains(&entries[0].fingerprint()));
        assert!(!seen.contains(&entries[6].fingerprint()));
        assert!(seen.contains(&entries[7].fingerprint()));
        assert!(seen.contains(&entries[11].fingerprint()));
    }

    #[test]
    fn seen_set_under_capacity_is_untouched() {
        let mut seen = SeenSet::new(10);
        let mut window = MessageWindow::new(10);
        for id in 0..10 {
            window.push(frame(id));
        }
        for entry in window.recent(10) {
            seen.insert(entry.fingerprint());
        }
        assert_eq!(seen.trim(), 0);
        assert_eq!(seen.len(), 10);
    }
}
