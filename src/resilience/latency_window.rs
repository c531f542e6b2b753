//! Rolling latency percentiles.
//!
//! # Responsibilities
//! - Keep recent latencies of calls that reached the operation
//! - Answer percentile queries over the live window
//!
//! # Design Decisions
//! - Same bucket ring as the statistics window, with its own length and
//!   bucket count
//! - Each bucket keeps at most `SAMPLES_PER_BUCKET` latencies; once full the
//!   oldest sample in that bucket is overwritten
//! - Nearest-rank percentiles, computed on request

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerSettings;

/// Upper bound on samples kept per bucket.
pub const SAMPLES_PER_BUCKET: usize = 100;

/// Latency summary over the live percentile window, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyPercentiles {
    pub samples: usize,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Default)]
struct LatencyBucket {
    index: u64,
    samples: Vec<u64>,
    /// Next slot to overwrite once the bucket is full.
    cursor: usize,
}

impl LatencyBucket {
    fn reset(&mut self, index: u64) {
        self.index = index;
        self.samples.clear();
        self.cursor = 0;
    }

    fn push(&mut self, latency_ms: u64) {
        if self.samples.len() < SAMPLES_PER_BUCKET {
            self.samples.push(latency_ms);
        } else {
            self.samples[self.cursor] = latency_ms;
            self.cursor = (self.cursor + 1) % SAMPLES_PER_BUCKET;
        }
    }
}

#[derive(Debug)]
pub struct LatencyWindow {
    bucket_ms: u64,
    started: Instant,
    buckets: Mutex<Vec<LatencyBucket>>,
}

impl LatencyWindow {
    pub fn new(settings: &BreakerSettings) -> Self {
        let count = settings.percentile_buckets.max(1) as usize;
        Self {
            bucket_ms: settings.percentile_bucket_duration().as_millis() as u64,
            started: Instant::now(),
            buckets: Mutex::new(vec![LatencyBucket::default(); count]),
        }
    }

    fn current_index(&self) -> u64 {
        Instant::now().saturating_duration_since(self.started).as_millis() as u64 / self.bucket_ms
    }

    pub fn record(&self, latency: Duration) {
        let mut buckets = self.buckets.lock().expect("latency window mutex poisoned");
        let current = self.current_index();
        let slot = (current % buckets.len() as u64) as usize;
        let bucket = &mut buckets[slot];
        if bucket.index != current {
            bucket.reset(current);
        }
        bucket.push(latency.as_millis() as u64);
    }

    /// Every live sample, sorted ascending.
    fn sorted_samples(&self) -> Vec<u64> {
        let buckets = self.buckets.lock().expect("latency window mutex poisoned");
        let current = self.current_index();
        let len = buckets.len() as u64;

        let mut samples: Vec<u64> = buckets
            .iter()
            .filter(|b| current.saturating_sub(b.index) < len)
            .flat_map(|b| b.samples.iter().copied())
            .collect();
        drop(buckets);

        samples.sort_unstable();
        samples
    }

    /// Nearest-rank percentile `p` (0-100), or `None` with no samples.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        nearest_rank(&self.sorted_samples(), p).map(Duration::from_millis)
    }

    pub fn percentiles(&self) -> LatencyPercentiles {
        let samples = self.sorted_samples();
        let at = |p| nearest_rank(&samples, p).unwrap_or(0);
        LatencyPercentiles {
            samples: samples.len(),
            p50: at(50.0),
            p90: at(90.0),
            p99: at(99.0),
            max: samples.last().copied().unwrap_or(0),
        }
    }
}

fn nearest_rank(sorted: &[u64], p: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}
