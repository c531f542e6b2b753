//! Bucketed rolling statistics window.
//!
//! # Responsibilities
//! - Count outcomes per operation over a fixed-duration window
//! - Answer point-in-time health queries
//!
//! # Design Decisions
//! - Fixed ring of buckets; a stale bucket is zeroed and reused, never shifted
//! - Bucket identity is `elapsed_since_window_start / bucket_len`, so every
//!   caller agrees on which bucket "now" is
//! - One lock per window; unrelated operations never contend
//! - Rejections and short-circuits never count as errors

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerSettings;

/// Classification of one invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    /// In-flight ceiling reached.
    Rejected,
    /// Circuit open; the operation was never reached.
    ShortCircuited,
    /// Caller gave up on the call while the operation was running.
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Timeout => "timeout",
            Outcome::Rejected => "rejected",
            Outcome::ShortCircuited => "short_circuited",
            Outcome::Cancelled => "cancelled",
        }
    }

    /// Whether the operation ran to a verdict.
    pub fn is_attempt(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::Failure | Outcome::Timeout)
    }
}

/// Per-kind outcome totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub success: u64,
    pub failure: u64,
    pub timeout: u64,
    pub rejection: u64,
    pub short_circuit: u64,
    pub cancelled: u64,
    pub total_latency_ms: u64,
}

impl Counts {
    fn add(&mut self, outcome: Outcome, latency_ms: u64) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Failure => self.failure += 1,
            Outcome::Timeout => self.timeout += 1,
            Outcome::Rejected => self.rejection += 1,
            Outcome::ShortCircuited => self.short_circuit += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
        if outcome.is_attempt() {
            self.total_latency_ms = self.total_latency_ms.saturating_add(latency_ms);
        }
    }

    fn merge(&mut self, other: &Counts) {
        self.success += other.success;
        self.failure += other.failure;
        self.timeout += other.timeout;
        self.rejection += other.rejection;
        self.short_circuit += other.short_circuit;
        self.cancelled += other.cancelled;
        self.total_latency_ms = self.total_latency_ms.saturating_add(other.total_latency_ms);
    }

    fn since(&self, baseline: &Counts) -> Counts {
        Counts {
            success: self.success.saturating_sub(baseline.success),
            failure: self.failure.saturating_sub(baseline.failure),
            timeout: self.timeout.saturating_sub(baseline.timeout),
            rejection: self.rejection.saturating_sub(baseline.rejection),
            short_circuit: self.short_circuit.saturating_sub(baseline.short_circuit),
            cancelled: self.cancelled.saturating_sub(baseline.cancelled),
            total_latency_ms: self.total_latency_ms.saturating_sub(baseline.total_latency_ms),
        }
    }

    /// Calls that actually reached the operation.
    pub fn attempts(&self) -> u64 {
        self.success + self.failure + self.timeout
    }

    pub fn errors(&self) -> u64 {
        self.failure + self.timeout
    }

    /// Mean latency over real attempts, in milliseconds.
    pub fn mean_latency_ms(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => self.total_latency_ms as f64 / n as f64,
        }
    }
}

/// Derived, point-in-time health reading. Recomputed on every request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub total_count: u64,
    pub error_count: u64,
    pub error_percentage: f64,
}

impl HealthSnapshot {
    fn from_counts(counts: &Counts, count_rejections: bool) -> Self {
        let mut total_count = counts.attempts();
        if count_rejections {
            total_count += counts.rejection + counts.short_circuit;
        }
        let error_count = counts.errors();
        let error_percentage = if total_count == 0 {
            0.0
        } else {
            error_count as f64 * 100.0 / total_count as f64
        };

        Self {
            total_count,
            error_count,
            error_percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    index: u64,
    counts: Counts,
    /// Counts already present when the circuit last recovered.
    baseline: Counts,
}

impl Bucket {
    fn reset(&mut self, index: u64) {
        *self = Bucket {
            index,
            ..Default::default()
        };
    }
}

/// Fixed-memory rolling window of outcome counters.
#[derive(Debug)]
pub struct RollingWindow {
    bucket_ms: u64,
    count_rejections: bool,
    started: Instant,
    buckets: Mutex<Vec<Bucket>>,
}

impl RollingWindow {
    /// Create a window shaped by the given settings.
    pub fn new(settings: &BreakerSettings) -> Self {
        let bucket_ms = settings.bucket_duration().as_millis() as u64;
        let count = settings.statistical_buckets.max(1) as usize;
        Self {
            bucket_ms,
            count_rejections: settings.count_rejections_in_volume,
            started: Instant::now(),
            buckets: Mutex::new(vec![Bucket::default(); count]),
        }
    }

    fn current_index(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started).as_millis() as u64 / self.bucket_ms
    }

    /// Zero every bucket that has fallen out of the window.
    fn roll(buckets: &mut [Bucket], current: u64) {
        let len = buckets.len() as u64;
        for bucket in buckets.iter_mut() {
            if current.saturating_sub(bucket.index) >= len {
                bucket.reset(bucket.index);
            }
        }
    }

    fn with_live_buckets<R>(&self, f: impl FnOnce(&mut [Bucket]) -> R) -> R {
        let mut buckets = self.buckets.lock().expect("rolling window mutex poisoned");
        let current = self.current_index(Instant::now());
        Self::roll(&mut buckets, current);
        f(&mut buckets)
    }

    /// Record one outcome into the bucket covering "now".
    pub fn record(&self, outcome: Outcome, latency: Duration) {
        let mut buckets = self.buckets.lock().expect("rolling window mutex poisoned");
        let current = self.current_index(Instant::now());
        Self::roll(&mut buckets, current);

        let slot = (current % buckets.len() as u64) as usize;
        let bucket = &mut buckets[slot];
        if bucket.index != current {
            bucket.reset(current);
        }
        bucket.counts.add(outcome, latency.as_millis() as u64);
    }

    /// Raw totals over every live bucket.
    pub fn counts(&self) -> Counts {
        self.with_live_buckets(|buckets| {
            let mut total = Counts::default();
            for bucket in buckets.iter() {
                total.merge(&bucket.counts);
            }
            total
        })
    }

    /// Health over every live bucket.
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot::from_counts(&self.counts(), self.count_rejections)
    }

    /// Health over outcomes recorded after the last recovery.
    ///
    /// Used for trip decisions so that the failures which opened a circuit
    /// cannot re-trip it right after a successful trial.
    pub fn health_since_recovery(&self) -> HealthSnapshot {
        let counts = self.with_live_buckets(|buckets| {
            let mut total = Counts::default();
            for bucket in buckets.iter() {
                total.merge(&bucket.counts.since(&bucket.baseline));
            }
            total
        });
        HealthSnapshot::from_counts(&counts, self.count_rejections)
    }

    /// Exclude everything recorded so far from trip decisions without
    /// discarding it.
    pub fn mark_recovered(&self) {
        self.with_live_buckets(|buckets| {
            for bucket in buckets.iter_mut() {
                bucket.baseline = bucket.counts;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(window_ms: u64, buckets: u32) -> RollingWindow {
        RollingWindow::new(&BreakerSettings::default().statistical_window(window_ms, buckets))
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_counts_attempts() {
        let w = window(1000, 10);
        w.record(Outcome::Success, Duration::from_millis(10));
        w.record(Outcome::Failure, Duration::from_millis(20));
        w.record(Outcome::Timeout, Duration::from_millis(30));
        w.record(Outcome::Success, Duration::from_millis(40));

        let snap = w.snapshot();
        assert_eq!(snap.total_count, 4);
        assert_eq!(snap.error_count, 2);
        assert_eq!(snap.error_percentage, 50.0);
        assert_eq!(w.counts().mean_latency_ms(), 25.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_never_count_as_errors() {
        let w = window(1000, 10);
        w.record(Outcome::Failure, Duration::ZERO);
        w.record(Outcome::Rejected, Duration::ZERO);
        w.record(Outcome::ShortCircuited, Duration::ZERO);

        let snap = w.snapshot();
        assert_eq!(snap.total_count, 1);
        assert_eq!(snap.error_count, 1);

        let counts = w.counts();
        assert_eq!(counts.rejection, 1);
        assert_eq!(counts.short_circuit, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_policy_counts_rejections() {
        let settings = BreakerSettings::default()
            .statistical_window(1000, 10)
            .count_rejections_in_volume(true);
        let w = RollingWindow::new(&settings);
        w.record(Outcome::Failure, Duration::ZERO);
        w.record(Outcome::Rejected, Duration::ZERO);
        w.record(Outcome::ShortCircuited, Duration::ZERO);
        w.record(Outcome::Success, Duration::ZERO);

        let snap = w.snapshot();
        assert_eq!(snap.total_count, 4);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.error_percentage, 25.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buckets_expire_with_the_window() {
        let w = window(1000, 10);
        w.record(Outcome::Failure, Duration::ZERO);

        tokio::time::advance(Duration::from_millis(500)).await;
        w.record(Outcome::Success, Duration::ZERO);
        assert_eq!(w.snapshot().total_count, 2);

        // First bucket is now older than the window
        tokio::time::advance(Duration::from_millis(550)).await;
        let snap = w.snapshot();
        assert_eq!(snap.total_count, 1);
        assert_eq!(snap.error_count, 0);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(w.snapshot(), HealthSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_reuse_after_wraparound() {
        let w = window(100, 2);
        w.record(Outcome::Failure, Duration::ZERO);

        // Same slot (index 2 % 2 == 0) one full window later
        tokio::time::advance(Duration::from_millis(100)).await;
        w.record(Outcome::Success, Duration::ZERO);

        let counts = w.counts();
        assert_eq!(counts.failure, 0);
        assert_eq!(counts.success, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_baseline() {
        let w = window(1000, 10);
        for _ in 0..5 {
            w.record(Outcome::Failure, Duration::ZERO);
        }
        w.mark_recovered();
        w.record(Outcome::Success, Duration::ZERO);

        // Raw history is kept
        assert_eq!(w.snapshot().total_count, 6);

        let recent = w.health_since_recovery();
        assert_eq!(recent.total_count, 1);
        assert_eq!(recent.error_count, 0);
    }
}
