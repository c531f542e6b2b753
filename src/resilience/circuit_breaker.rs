//! Circuit breaker for operation protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: operation assumed down, calls fail fast
//! - Half-Open: one trial call is in flight, everyone else fails fast
//!
//! # State Transitions
//! ```text
//! Closed → Open: volume >= request_volume_threshold
//!                AND error% >= error_threshold_percentage
//! Open → Half-Open: first call after the sleep window (lazy, no timer)
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails or is abandoned; sleep window restarts
//! ```
//!
//! # Design Decisions
//! - Per-operation circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial call in Half-Open; admission is a test-and-set under the lock

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerSettings;
use crate::observability::metrics;
use crate::resilience::registry::OperationKey;
use crate::resilience::rolling_window::HealthSnapshot;

/// Circuit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct CircuitInner {
    status: CircuitStatus,
    /// Set while Open and for the duration of the Half-Open trial.
    opened_at: Option<Instant>,
}

/// Result of asking the circuit whether a call may proceed.
#[derive(Debug)]
pub enum Admission<'a> {
    /// Circuit closed; call proceeds normally.
    Allowed,
    /// Caller holds the single Half-Open trial.
    Trial(TrialPermit<'a>),
    /// Circuit open (or trial already taken); do not call the operation.
    ShortCircuited,
}

/// Per-operation state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: OperationKey,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(key: OperationKey) -> Self {
        Self {
            key,
            inner: Mutex::new(CircuitInner {
                status: CircuitStatus::Closed,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitInner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }

    pub fn status(&self) -> CircuitStatus {
        self.lock().status
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.lock().opened_at
    }

    pub fn is_open(&self) -> bool {
        self.status() == CircuitStatus::Open
    }

    /// Decide whether a call may proceed, moving Open → Half-Open when the
    /// sleep window has elapsed.
    pub fn try_admit(&self, sleep_window: Duration) -> Admission<'_> {
        let mut inner = self.lock();
        match inner.status {
            CircuitStatus::Closed => Admission::Allowed,
            CircuitStatus::HalfOpen => Admission::ShortCircuited,
            CircuitStatus::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| Instant::now().saturating_duration_since(at) >= sleep_window)
                    .unwrap_or(true);
                if !elapsed {
                    return Admission::ShortCircuited;
                }

                inner.status = CircuitStatus::HalfOpen;
                drop(inner);

                tracing::info!(operation = %self.key, "Circuit half-open, admitting trial call");
                metrics::record_state_transition(&self.key, CircuitStatus::Open, CircuitStatus::HalfOpen);
                Admission::Trial(TrialPermit {
                    breaker: self,
                    resolved: false,
                })
            }
        }
    }

    /// Trip the circuit if it is Closed and `health` breaches the thresholds.
    ///
    /// Returns true when this call performed the Closed → Open transition.
    pub fn evaluate(&self, health: &HealthSnapshot, settings: &BreakerSettings) -> bool {
        let mut inner = self.lock();
        if inner.status != CircuitStatus::Closed {
            return false;
        }

        let breached = health.total_count >= settings.request_volume_threshold
            && health.error_percentage >= f64::from(settings.error_threshold_percentage);
        if !breached {
            return false;
        }

        inner.status = CircuitStatus::Open;
        inner.opened_at = Some(Instant::now());
        drop(inner);

        tracing::warn!(
            operation = %self.key,
            total_count = health.total_count,
            error_count = health.error_count,
            error_percentage = health.error_percentage,
            "Circuit opened"
        );
        metrics::record_state_transition(&self.key, CircuitStatus::Closed, CircuitStatus::Open);
        true
    }

    fn resolve_trial(&self, success: bool) {
        let mut inner = self.lock();
        if inner.status != CircuitStatus::HalfOpen {
            return;
        }

        let to = if success {
            inner.status = CircuitStatus::Closed;
            inner.opened_at = None;
            CircuitStatus::Closed
        } else {
            inner.status = CircuitStatus::Open;
            inner.opened_at = Some(Instant::now());
            CircuitStatus::Open
        };
        drop(inner);

        if success {
            tracing::info!(operation = %self.key, "Trial call succeeded, circuit closed");
        } else {
            tracing::warn!(operation = %self.key, "Trial call failed, circuit re-opened");
        }
        metrics::record_state_transition(&self.key, CircuitStatus::HalfOpen, to);
    }
}

/// The single Half-Open trial. Dropping it unresolved re-opens the circuit.
#[derive(Debug)]
pub struct TrialPermit<'a> {
    breaker: &'a CircuitBreaker,
    resolved: bool,
}

impl TrialPermit<'_> {
    /// Trial succeeded: Half-Open → Closed.
    pub fn succeed(mut self) {
        self.resolved = true;
        self.breaker.resolve_trial(true);
    }

    /// Trial failed: Half-Open → Open, sleep window restarts.
    pub fn fail(mut self) {
        self.resolved = true;
        self.breaker.resolve_trial(false);
    }
}

impl Drop for TrialPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::debug!(operation = %self.breaker.key, "Trial call abandoned");
            self.breaker.resolve_trial(false);
        }
    }
}
