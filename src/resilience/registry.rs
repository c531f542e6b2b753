//! Breaker registry.
//!
//! # Responsibilities
//! - Map an operation identity to exactly one circuit/window pair
//! - Create entries lazily on first use; first settings win
//! - Track in-flight calls per operation
//! - Provide the process-wide instance and its full reset
//!
//! # Design Decisions
//! - Sharded concurrent map; lookups for unrelated operations never contend
//! - Entries are handed out as `Arc`, so a reset never invalidates a call
//!   already holding one
//! - `reset_all` is for test isolation only and must not race live traffic

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::config::BreakerSettings;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::error::KeyError;
use crate::resilience::latency_window::LatencyWindow;
use crate::resilience::rolling_window::RollingWindow;

/// Identity of a protected operation: `(group, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationKey {
    group: String,
    name: String,
}

impl OperationKey {
    /// Both parts must be non-empty.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Result<Self, KeyError> {
        let group = group.into();
        let name = name.into();
        if group.is_empty() {
            return Err(KeyError::EmptyGroup);
        }
        if name.is_empty() {
            return Err(KeyError::EmptyName);
        }
        Ok(Self { group, name })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Everything the engine keeps for one operation.
#[derive(Debug)]
pub struct BreakerEntry {
    key: OperationKey,
    settings: BreakerSettings,
    circuit: CircuitBreaker,
    window: RollingWindow,
    latency: LatencyWindow,
    in_flight: AtomicUsize,
}

impl BreakerEntry {
    fn new(key: OperationKey, settings: BreakerSettings) -> Self {
        Self {
            circuit: CircuitBreaker::new(key.clone()),
            window: RollingWindow::new(&settings),
            latency: LatencyWindow::new(&settings),
            key,
            settings,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Settings captured when the entry was created.
    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    /// Latencies of calls that reached the operation.
    pub fn latency(&self) -> &LatencyWindow {
        &self.latency
    }

    /// Number of calls currently executing the real operation.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim an in-flight slot, or `None` when the ceiling is reached.
    /// A ceiling of zero means unlimited.
    pub fn try_acquire_slot(self: &Arc<Self>) -> Option<InFlightGuard> {
        let limit = self.settings.rejection_threshold;
        let mut prev = self.in_flight.load(Ordering::Acquire);
        loop {
            if limit > 0 && prev >= limit {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                prev, prev + 1, Ordering::AcqRel, Ordering::Acquire
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        metrics::record_in_flight(&self.key, prev + 1);
        Some(InFlightGuard {
            entry: self.clone(),
        })
    }
}

/// A RAII guard that releases an in-flight slot.
#[derive(Debug)]
pub struct InFlightGuard {
    entry: Arc<BreakerEntry>,
}

impl Deref for InFlightGuard {
    type Target = BreakerEntry;
    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.entry.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::record_in_flight(&self.entry.key, now);
    }
}

/// Operation identity → breaker entry.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    entries: DashMap<OperationKey, Arc<BreakerEntry>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `key`, creating it with `settings` if absent.
    ///
    /// Idempotent: later calls get the same entry and their settings are
    /// ignored.
    pub fn get_or_create(&self, key: &OperationKey, settings: &BreakerSettings) -> Arc<BreakerEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Arc::clone(entry.value());
        }

        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(operation = %key, "Creating circuit breaker");
            Arc::new(BreakerEntry::new(key.clone(), settings.clone()))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, key: &OperationKey) -> Option<Arc<BreakerEntry>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Snapshot of every registered entry.
    pub fn all_entries(&self) -> Vec<Arc<BreakerEntry>> {
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry. Not safe against concurrent live traffic.
    pub fn reset_all(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::debug!(dropped, "Circuit breaker registry reset");
    }
}

static GLOBAL: OnceLock<Arc<BreakerRegistry>> = OnceLock::new();

/// The process-wide registry.
pub fn global() -> Arc<BreakerRegistry> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(BreakerRegistry::new())))
}

/// Clear all engine state process-wide. Intended for use between test runs.
pub fn reset_all_circuit_breakers() {
    global().reset_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitStatus;
    use crate::resilience::rolling_window::HealthSnapshot;

    fn key(name: &str) -> OperationKey {
        OperationKey::new("Inventory", name).unwrap()
    }

    #[test]
    fn test_key_validation_and_display() {
        assert_eq!(OperationKey::new("", "a"), Err(KeyError::EmptyGroup));
        assert_eq!(OperationKey::new("g", ""), Err(KeyError::EmptyName));
        assert_eq!(key("lookup").to_string(), "Inventory.lookup");
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = BreakerRegistry::new();
        let first = registry.get_or_create(&key("lookup"), &BreakerSettings::default());
        let other = BreakerSettings::default().timeout_ms(1);
        let second = registry.get_or_create(&key("lookup"), &other);

        assert!(Arc::ptr_eq(&first, &second));
        // First settings win
        assert_eq!(second.settings().timeout_ms, 10_000);
        assert_eq!(registry.len(), 1);

        let third = registry.get_or_create(&key("reserve"), &other);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reset_all_gives_fresh_breakers() {
        let registry = BreakerRegistry::new();
        let settings = BreakerSettings::default();
        let before = registry.get_or_create(&key("lookup"), &settings);
        let tripping = HealthSnapshot {
            total_count: 10,
            error_count: 10,
            error_percentage: 100.0,
        };
        assert!(before.circuit().evaluate(&tripping, &settings));

        registry.reset_all();
        assert!(registry.is_empty());

        let after = registry.get_or_create(&key("lookup"), &settings);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.circuit().status(), CircuitStatus::Closed);
    }

    #[test]
    fn test_in_flight_ceiling() {
        let registry = BreakerRegistry::new();
        let entry = registry.get_or_create(&key("lookup"), &BreakerSettings::default().rejection_threshold(2));

        let a = entry.try_acquire_slot().unwrap();
        let b = entry.try_acquire_slot().unwrap();
        assert_eq!(entry.in_flight(), 2);
        assert!(entry.try_acquire_slot().is_none());

        drop(a);
        assert_eq!(entry.in_flight(), 1);
        let _c = entry.try_acquire_slot().unwrap();
        drop(b);
    }

    #[test]
    fn test_zero_ceiling_is_unlimited() {
        let registry = BreakerRegistry::new();
        let entry = registry.get_or_create(&key("lookup"), &BreakerSettings::default());
        let guards: Vec<_> = (0..64).map(|_| entry.try_acquire_slot().unwrap()).collect();
        assert_eq!(entry.in_flight(), 64);
        drop(guards);
        assert_eq!(entry.in_flight(), 0);
    }

    #[test]
    fn test_global_registry_is_shared() {
        assert!(Arc::ptr_eq(&global(), &global()));
    }
}
