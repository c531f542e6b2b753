//! Command execution under a circuit breaker.
//!
//! # Responsibilities
//! - Consult the circuit before calling the operation
//! - Enforce the in-flight ceiling and the per-call deadline
//! - Record exactly one outcome per invocation attempt, including calls the
//!   caller abandons mid-flight
//! - Drive circuit transitions and apply the fallback
//!
//! # Design Decisions
//! - Short-circuits and rejections never reach the operation and are never
//!   counted as errors
//! - Errors the failure filter declines are recorded as successful attempts
//!   and returned to the caller without fallback
//! - Fallback errors are returned as the fallback produced them

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::time::Instant;

use crate::config::BreakerSettings;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{Admission, TrialPermit};
use crate::resilience::error::CommandError;
use crate::resilience::registry::{self, BreakerEntry, BreakerRegistry, OperationKey};
use crate::resilience::rolling_window::Outcome;
use crate::resilience::timeouts::{self, DeadlineExceeded};

/// Substitute computation receiving the error and the original arguments.
pub type Fallback<A, T, E> =
    Arc<dyn Fn(CommandError<E>, A) -> BoxFuture<'static, Result<T, CommandError<E>>> + Send + Sync>;

/// Decides whether an operation error counts against the circuit.
pub type FailureFilter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// The behavioural half of a command's configuration.
pub struct CommandHooks<A, T, E> {
    fallback: Option<Fallback<A, T, E>>,
    is_failure: Option<FailureFilter<E>>,
}

impl<A, T, E> CommandHooks<A, T, E> {
    pub fn new() -> Self {
        Self {
            fallback: None,
            is_failure: None,
        }
    }

    /// Use `f(error, args)` instead of failing.
    pub fn fallback<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CommandError<E>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CommandError<E>>> + Send + 'static,
    {
        self.fallback = Some(Arc::new(move |error, args| f(error, args).boxed()));
        self
    }

    /// Only errors for which `f` returns true count as failures.
    pub fn is_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_failure = Some(Arc::new(f));
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    fn counts_as_failure(&self, error: &E) -> bool {
        self.is_failure.as_ref().map_or(true, |f| f(error))
    }

    async fn recover(&self, error: CommandError<E>, args: Option<A>) -> Result<T, CommandError<E>> {
        match (&self.fallback, args) {
            (Some(fallback), Some(args)) => fallback(error, args).await,
            _ => Err(error),
        }
    }
}

impl<A, T, E> Default for CommandHooks<A, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, T, E> Clone for CommandHooks<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            fallback: self.fallback.clone(),
            is_failure: self.is_failure.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for CommandHooks<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHooks")
            .field("fallback", &self.fallback.is_some())
            .field("is_failure", &self.is_failure.is_some())
            .finish()
    }
}

/// Runs operations through their circuit breakers.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    registry: Arc<BreakerRegistry>,
}

impl Default for CommandExecutor {
    /// An executor backed by the process-wide registry.
    fn default() -> Self {
        Self::new(registry::global())
    }
}

impl CommandExecutor {
    pub fn new(registry: Arc<BreakerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Execute `operation(args)` under the breaker for `key`.
    ///
    /// `settings` only take effect if this is the first time `key` is seen.
    pub async fn execute<A, T, E, F, Fut>(
        &self,
        key: &OperationKey,
        settings: &BreakerSettings,
        hooks: &CommandHooks<A, T, E>,
        args: A,
        operation: F,
    ) -> Result<T, CommandError<E>>
    where
        A: Clone,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let entry = self.registry.get_or_create(key, settings);
        let settings = entry.settings();
        let fallback_args = hooks.has_fallback().then(|| args.clone());

        let trial = match entry.circuit().try_admit(settings.sleep_window()) {
            Admission::Allowed => None,
            Admission::Trial(permit) => Some(permit),
            Admission::ShortCircuited => {
                tracing::debug!(operation = %key, "Circuit open, short-circuiting call");
                record(&entry, Outcome::ShortCircuited, Duration::ZERO);
                return hooks.recover(CommandError::OpenCircuit, fallback_args).await;
            }
        };

        let Some(slot) = entry.try_acquire_slot() else {
            tracing::debug!(
                operation = %key,
                in_flight = entry.in_flight(),
                limit = settings.rejection_threshold,
                "In-flight ceiling reached, rejecting call"
            );
            settle(&entry, Outcome::Rejected, Duration::ZERO, trial);
            return hooks.recover(CommandError::Rejected, fallback_args).await;
        };

        let started = Instant::now();
        let attempt = InFlightAttempt {
            entry: &entry,
            started,
            settled: false,
        };
        let result = timeouts::with_deadline(settings.timeout(), operation(args)).await;
        let latency = started.elapsed();
        attempt.settle();
        drop(slot);

        match result {
            Ok(Ok(value)) => {
                settle(&entry, Outcome::Success, latency, trial);
                Ok(value)
            }
            Ok(Err(error)) if hooks.counts_as_failure(&error) => {
                settle(&entry, Outcome::Failure, latency, trial);
                hooks.recover(CommandError::Operation(error), fallback_args).await
            }
            Ok(Err(error)) => {
                tracing::debug!(operation = %key, "Error not counted as failure");
                settle(&entry, Outcome::Success, latency, trial);
                Err(CommandError::Operation(error))
            }
            Err(DeadlineExceeded) => {
                tracing::debug!(operation = %key, timeout_ms = settings.timeout_ms, "Call timed out");
                settle(&entry, Outcome::Timeout, latency, trial);
                hooks.recover(CommandError::TimedOut, fallback_args).await
            }
        }
    }
}

/// Records a `Cancelled` outcome if the caller drops `execute` while the
/// operation is running.
struct InFlightAttempt<'a> {
    entry: &'a BreakerEntry,
    started: Instant,
    settled: bool,
}

impl InFlightAttempt<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlightAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(operation = %self.entry.key(), "Call cancelled by caller");
            record(self.entry, Outcome::Cancelled, self.started.elapsed());
        }
    }
}

fn record(entry: &BreakerEntry, outcome: Outcome, latency: Duration) {
    entry.window().record(outcome, latency);
    if outcome.is_attempt() {
        entry.latency().record(latency);
    }
    metrics::record_outcome(entry.key(), outcome, latency);
}

/// Record an admitted call's outcome and let the circuit react to it.
fn settle(entry: &BreakerEntry, outcome: Outcome, latency: Duration, trial: Option<TrialPermit<'_>>) {
    record(entry, outcome, latency);
    match trial {
        Some(permit) if outcome == Outcome::Success => {
            entry.window().mark_recovered();
            permit.succeed();
        }
        Some(permit) => permit.fail(),
        None => {
            entry
                .circuit()
                .evaluate(&entry.window().health_since_recovery(), entry.settings());
        }
    }
}
