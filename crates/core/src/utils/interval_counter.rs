//! Periodic throughput logging

use std::time::{Duration, Instant};

use tracing::info;

/// Counts events and logs totals plus the per-second rate every `interval`
#[derive(Debug)]
pub struct IntervalCounter {
    name: String,
    interval: Duration,
    total: u64,
    since_report: u64,
    last_report: Instant,
}

impl IntervalCounter {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            total: 0,
            since_report: 0,
            last_report: Instant::now(),
        }
    }

    /// Record `count` events; returns the rate when a report was emitted
    pub fn add(&mut self, count: u64) -> Option<f64> {
        self.total += count;
        self.since_report += count;
        let elapsed = self.last_report.elapsed();
        if elapsed < self.interval {
            return None;
        }
        let rate = self.since_report as f64 / elapsed.as_secs_f64();
        info!("{}: total {}, {:.2}/s", self.name, self.total, rate);
        self.since_report = 0;
        self.last_report = Instant::now();
        Some(rate)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
