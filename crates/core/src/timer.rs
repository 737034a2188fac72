//! Frame rate meter for the demo loop.

use std::time::{Duration, Instant};

/// Counts presented frames and yields an average rate once per interval.
#[derive(Debug)]
pub struct Timer {
    interval: Duration,
    since: Instant,
    frames: u32,
    total: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self::with_report_interval(Duration::from_secs(1))
    }

    pub fn with_report_interval(interval: Duration) -> Self {
        Self {
            interval,
            since: Instant::now(),
            frames: 0,
            total: 0,
        }
    }

    /// Record one frame. Returns frames per second when an interval closes.
    pub fn frame(&mut self) -> Option<f64> {
        self.frames += 1;
        self.total += 1;

        let window = self.since.elapsed();
        (window >= self.interval).then(|| {
            let rate = f64::from(std::mem::take(&mut self.frames)) / window.as_secs_f64();
            self.since = Instant::now();
            rate
        })
    }

    /// Frames recorded since creation.
    pub fn total_frames(&self) -> u64 {
        self.total
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
