//! Watches the message window for a frame matching [`Criteria`].
//!
//! A [`Watch`] first baselines: everything already in the window is marked
//! seen, so only frames arriving afterwards are evaluated. It then polls the
//! window at an adaptive interval until a frame matches or the deadline
//! passes. Each frame is evaluated at most once.

use std::time::Duration;

use canlink_frame::Frame;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::criteria::Criteria;
use crate::window::{SeenSet, SharedWindow, DEFAULT_SEEN_CAPACITY, DEFAULT_WINDOW_CAPACITY};

/// Tuning of the watch loop.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Entries marked seen while baselining. Default: 1000.
    pub baseline_depth: usize,
    /// Entries fetched per watch cycle. Default: 1000.
    pub fetch_depth: usize,
    /// Pause after baselining. Default: 5 ms.
    pub settle: Duration,
    /// First poll interval. Default: 10 ms.
    pub initial_interval: Duration,
    /// Lower bound of the poll interval. Default: 5 ms.
    pub min_interval: Duration,
    /// Upper bound of the poll interval. Default: 100 ms.
    pub max_interval: Duration,
    /// Interval factor after a cycle with new frames. Default: 0.8.
    pub speedup: f64,
    /// Interval factor after an idle cycle. Default: 1.1.
    pub slowdown: f64,
    /// Seen-set size that triggers trimming. Default: 10,000.
    pub seen_capacity: usize,
    /// Cycles between trims and progress logs. Default: 1000.
    pub trim_every: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            baseline_depth: DEFAULT_WINDOW_CAPACITY,
            fetch_depth: DEFAULT_WINDOW_CAPACITY,
            settle: Duration::from_millis(5),
            initial_interval: Duration::from_millis(10),
            min_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(100),
            speedup: 0.8,
            slowdown: 1.1,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
            trim_every: 1000,
        }
    }
}

/// Adaptive poll interval, always within `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct PollInterval {
    current: Duration,
    min: Duration,
    max: Duration,
    speedup: f64,
    slowdown: f64,
}

impl PollInterval {
    pub fn new(config: &VerifyConfig) -> Self {
        let min = config.min_interval;
        let max = config.max_interval.max(min);
        Self {
            current: config.initial_interval.clamp(min, max),
            min,
            max,
            speedup: config.speedup,
            slowdown: config.slowdown,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Shrink after a busy cycle, grow after an idle one.
    pub fn after_cycle(&mut self, found_new: bool) -> Duration {
        let next = if found_new {
            self.current.mul_f64(self.speedup)
        } else {
            self.current.mul_f64(self.slowdown)
        };
        self.current = next.clamp(self.min, self.max);
        self.current
    }
}

/// Where a [`Watch`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Baselining,
    Watching,
    Matched,
    TimedOut,
}

/// Outcome of a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A frame satisfied every expected field.
    Matched(Frame),
    /// The deadline passed without any new frame arriving.
    NoFramesSeen,
    /// New frames arrived but none matched.
    NoMatchAmongSeen { observed: u64 },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Matched(_))
    }

    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Verdict::Matched(frame) => Some(frame),
            _ => None,
        }
    }
}

/// Counters of one watch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub baselined: usize,
    pub cycles: u64,
    pub observed: u64,
    /// Frames that left the window before any cycle fetched them.
    pub skipped: u64,
}

/// A resumable watch for one [`Criteria`].
///
/// Dropping the future returned by [`run`](Self::run) leaves the seen set
/// intact; running again continues where it stopped.
#[derive(Debug)]
pub struct Watch {
    window: SharedWindow,
    criteria: Criteria,
    config: VerifyConfig,
    seen: SeenSet,
    interval: PollInterval,
    state: WatchState,
    stats: WatchStats,
    matched: Option<Frame>,
    next_seq: u64,
}

impl Watch {
    pub fn new(window: SharedWindow, criteria: Criteria, config: VerifyConfig) -> Self {
        // Fingerprints still inside the fetched window must survive a trim.
        let seen_capacity = config
            .seen_capacity
            .max(config.fetch_depth.max(config.baseline_depth) * 2);
        Self {
            window,
            seen: SeenSet::new(seen_capacity),
            interval: PollInterval::new(&config),
            criteria,
            config,
            state: WatchState::Baselining,
            stats: WatchStats::default(),
            matched: None,
            next_seq: 0,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn stats(&self) -> WatchStats {
        self.stats
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn interval(&self) -> Duration {
        self.interval.current()
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Mark the current window contents as seen, then settle.
    ///
    /// Does nothing once the watch has left the baselining state.
    pub async fn baseline(&mut self) {
        if self.state != WatchState::Baselining {
            return;
        }
        let next_seq = self.window.next_seq();
        let entries = self.window.recent(self.config.baseline_depth);
        for entry in &entries {
            self.seen.insert(entry.fingerprint());
        }
        self.next_seq = entries.last().map_or(next_seq, |e| e.seq + 1).max(next_seq);
        self.stats.baselined = entries.len();
        self.state = WatchState::Watching;
        info!(
            baselined = entries.len(),
            criteria = %self.criteria,
            "baseline established"
        );
        tokio::time::sleep(self.config.settle).await;
    }

    /// One watch cycle: evaluate every frame not seen before.
    ///
    /// Returns the number of new frames and the first match, if any.
    pub fn poll(&mut self) -> (usize, Option<Frame>) {
        let entries = self.window.recent(self.config.fetch_depth);
        if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
            if first.seq > self.next_seq {
                let skipped = first.seq - self.next_seq;
                self.stats.skipped += skipped;
                warn!(
                    skipped,
                    fetch_depth = self.config.fetch_depth,
                    "frames left the window before evaluation"
                );
            }
            self.next_seq = self.next_seq.max(last.seq + 1);
        }

        let mut fresh = 0;
        for entry in entries {
            if !self.seen.insert(entry.fingerprint()) {
                continue;
            }
            fresh += 1;
            self.stats.observed += 1;
            if self.criteria.matches(&entry.frame) {
                self.state = WatchState::Matched;
                self.matched = Some(entry.frame);
                return (fresh, Some(entry.frame));
            }
        }
        (fresh, None)
    }

    /// Baseline if needed, then watch for up to `timeout`.
    pub async fn run(&mut self, timeout: Duration) -> Verdict {
        let started = Instant::now();
        let deadline = started + timeout;
        self.baseline().await;

        loop {
            if let Some(frame) = self.matched {
                return Verdict::Matched(frame);
            }

            let cycle_start = Instant::now();
            self.stats.cycles += 1;
            let (fresh, hit) = self.poll();
            if let Some(frame) = hit {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    observed = self.stats.observed,
                    cycles = self.stats.cycles,
                    "matching frame found"
                );
                return Verdict::Matched(frame);
            }

            let interval = self.interval.after_cycle(fresh > 0);
            if self.stats.cycles % self.config.trim_every.max(1) == 0 {
                let evicted = self.seen.trim();
                debug!(
                    observed = self.stats.observed,
                    remaining_ms = deadline
                        .saturating_duration_since(Instant::now())
                        .as_millis() as u64,
                    interval_ms = interval.as_secs_f64() * 1000.0,
                    evicted,
                    "watch progress"
                );
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let pause = interval
                .saturating_sub(cycle_start.elapsed())
                .min(deadline - now);
            tokio::time::sleep(pause).await;
        }

        self.state = WatchState::TimedOut;
        if self.stats.observed == 0 {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                criteria = %self.criteria,
                "no frames observed before deadline"
            );
            Verdict::NoFramesSeen
        } else {
            error!(
                timeout_ms = timeout.as_millis() as u64,
                observed = self.stats.observed,
                criteria = %self.criteria,
                "no matching frame before deadline"
            );
            Verdict::NoMatchAmongSeen {
                observed: self.stats.observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canlink_frame::Marker;

    fn frame(identifier: u32, payload: &[u8]) -> Frame {
        Frame::new(Marker::Data, 0, 1, 0, identifier, payload).unwrap()
    }

    #[test]
    fn poll_interval_stays_in_bounds() {
        let config = VerifyConfig::default();
        let mut interval = PollInterval::new(&config);
        assert_eq!(interval.current(), Duration::from_millis(10));

        for _ in 0..50 {
            let next = interval.after_cycle(true);
            assert!(next >= config.min_interval && next <= config.max_interval);
        }
        assert_eq!(interval.current(), Duration::from_millis(5));

        for _ in 0..100 {
            let next = interval.after_cycle(false);
            assert!(next >= config.min_interval && next <= config.max_interval);
        }
        assert_eq!(interval.current(), Duration::from_millis(100));
    }

    #[test]
    fn poll_interval_steps() {
        let close = |a: Duration, b: Duration| a.abs_diff(b) < Duration::from_micros(1);
        let mut interval = PollInterval::new(&VerifyConfig::default());
        assert!(close(interval.after_cycle(true), Duration::from_millis(8)));
        assert!(close(interval.after_cycle(false), Duration::from_micros(8800)));
    }

    #[tokio::test]
    async fn baselined_frames_never_match() {
        let window = SharedWindow::new(100);
        window.push(frame(0x207, &[0xFF]));

        let criteria = Criteria::any().identifier_value(0x207);
        let mut watch = Watch::new(window.clone(), criteria, VerifyConfig::default());
        watch.baseline().await;
        assert_eq!(watch.state(), WatchState::Watching);
        assert_eq!(watch.stats().baselined, 1);

        assert_eq!(watch.poll(), (0, None));
        window.push(frame(0x207, &[0xFF]));
        let (fresh, hit) = watch.poll();
        assert_eq!(fresh, 1);
        assert_eq!(hit.map(|f| f.identifier), Some(0x207));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_resumes_with_seen_state() {
        let window = SharedWindow::new(100);
        window.push(frame(0x207, &[0xFF]));

        let criteria = Criteria::any().identifier_value(0x207);
        let mut watch = Watch::new(window.clone(), criteria, VerifyConfig::default());
        window.push(frame(0x100, &[]));
        let cancelled =
            tokio::time::timeout(Duration::from_millis(30), watch.run(Duration::from_secs(5)))
                .await;
        assert!(cancelled.is_err());
        assert_eq!(watch.state(), WatchState::Watching);
        assert_eq!(watch.stats().baselined, 2);
        assert_eq!(watch.seen().len(), 2);

        let verdict = watch.run(Duration::from_millis(50)).await;
        assert_eq!(verdict, Verdict::NoFramesSeen);
        assert_eq!(watch.stats().baselined, 2);
    }

    #[tokio::test]
    async fn counts_frames_evicted_before_a_cycle() {
        let window = SharedWindow::new(4);
        let config = VerifyConfig {
            fetch_depth: 4,
            settle: Duration::ZERO,
            ..VerifyConfig::default()
        };
        let criteria = Criteria::any().identifier_value(0x999);
        let mut watch = Watch::new(window.clone(), criteria, config);
        watch.baseline().await;

        for id in 0..10 {
            window.push(frame(id, &[]));
        }
        assert_eq!(watch.poll().0, 4);
        assert_eq!(watch.stats().skipped, 6);

        window.push(frame(0x10, &[]));
        assert_eq!(watch.poll().0, 1);
        assert_eq!(watch.stats().skipped, 6);
    }

    #[tokio::test]
    async fn each_frame_is_evaluated_once() {
        let window = SharedWindow::new(100);
        let criteria = Criteria::any().identifier_value(0x999);
        let mut watch = Watch::new(window.clone(), criteria, VerifyConfig::default());
        watch.baseline().await;

        window.push(frame(0x1, &[]));
        window.push(frame(0x2, &[]));
        assert_eq!(watch.poll().0, 2);
        assert_eq!(watch.poll().0, 0);
        assert_eq!(watch.stats().observed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_softly_without_traffic() {
        let window = SharedWindow::new(100);
        let mut watch = Watch::new(window, Criteria::any(), VerifyConfig::default());

        let verdict = watch.run(Duration::from_secs(1)).await;
        assert_eq!(verdict, Verdict::NoFramesSeen);
        assert_eq!(watch.state(), WatchState::TimedOut);
        assert_eq!(watch.interval(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn reports_no_match_among_seen() {
        let window = SharedWindow::new(100);
        let criteria = Criteria::any().payload("FF00AA55").unwrap();
        let mut watch = Watch::new(window.clone(), criteria, VerifyConfig::default());
        watch.baseline().await;
        window.push(frame(0x207, &[0x01]));

        let verdict = watch.run(Duration::from_millis(30)).await;
        assert_eq!(verdict, Verdict::NoMatchAmongSeen { observed: 1 });
    }

    #[tokio::test]
    async fn trims_seen_set_on_schedule() {
        let window = SharedWindow::new(50);
        let config = VerifyConfig {
            baseline_depth: 5,
            fetch_depth: 5,
            seen_capacity: 10,
            trim_every: 1,
            settle: Duration::ZERO,
            ..VerifyConfig::default()
        };
        let criteria = Criteria::any().identifier_value(0x999);
        let mut watch = Watch::new(window.clone(), criteria, config);
        watch.baseline().await;

        for round in 0..10u32 {
            for i in 0..3 {
                window.push(frame(round * 3 + i, &[]));
            }
            assert_eq!(watch.poll().0, 3);
        }
        assert!(watch.seen().len() > 10);

        let verdict = watch.run(Duration::ZERO).await;
        assert_eq!(verdict, Verdict::NoMatchAmongSeen { observed: 30 });
        assert!(watch.seen().len() <= 10);
    }
}
