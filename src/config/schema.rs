//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the breaker
//! engine. All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::registry::OperationKey;

/// Root configuration for the breaker engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Settings applied to every protected operation.
    pub defaults: BreakerSettings,

    /// Per-operation overrides, keyed by `group.name`.
    pub commands: HashMap<String, BreakerOverrides>,

    /// Open-circuit observer settings.
    pub observer: ObserverConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl EngineConfig {
    /// Resolve the effective settings for one operation.
    pub fn settings_for(&self, key: &OperationKey) -> BreakerSettings {
        match self.commands.get(&key.to_string()) {
            Some(overrides) => self.defaults.clone().with_overrides(overrides),
            None => self.defaults.clone(),
        }
    }
}

/// Numeric breaker configuration captured when an operation is first wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// How long the circuit stays open before a single trial call is allowed.
    pub sleep_window_ms: u64,

    /// Error percentage (0-100) at or above which the circuit trips.
    pub error_threshold_percentage: u8,

    /// Minimum attempts in the window before health is evaluated at all.
    pub request_volume_threshold: u64,

    /// Per-call deadline.
    pub timeout_ms: u64,

    /// Length of the rolling statistics window.
    pub statistical_window_ms: u64,

    /// Number of buckets the window is sliced into.
    pub statistical_buckets: u32,

    /// Maximum concurrent in-flight calls (0 = unlimited).
    pub rejection_threshold: usize,

    /// Whether rejected and short-circuited calls count toward the volume
    /// threshold. They never count as errors.
    pub count_rejections_in_volume: bool,

    /// Length of the latency percentile window.
    pub percentile_window_ms: u64,

    /// Number of buckets the percentile window is sliced into.
    pub percentile_buckets: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            sleep_window_ms: 3000,
            error_threshold_percentage: 50,
            request_volume_threshold: 10,
            timeout_ms: 10_000,
            statistical_window_ms: 10_000,
            statistical_buckets: 10,
            rejection_threshold: 0,
            count_rejections_in_volume: false,
            percentile_window_ms: 10_000,
            percentile_buckets: 10,
        }
    }
}

impl BreakerSettings {
    /// Apply every field present in `overrides`, keeping the rest.
    pub fn with_overrides(mut self, overrides: &BreakerOverrides) -> Self {
        if let Some(v) = overrides.sleep_window_ms {
            self.sleep_window_ms = v;
        }
        if let Some(v) = overrides.error_threshold_percentage {
            self.error_threshold_percentage = v;
        }
        if let Some(v) = overrides.request_volume_threshold {
            self.request_volume_threshold = v;
        }
        if let Some(v) = overrides.timeout_ms {
            self.timeout_ms = v;
        }
        if let Some(v) = overrides.statistical_window_ms {
            self.statistical_window_ms = v;
        }
        if let Some(v) = overrides.statistical_buckets {
            self.statistical_buckets = v;
        }
        if let Some(v) = overrides.rejection_threshold {
            self.rejection_threshold = v;
        }
        if let Some(v) = overrides.count_rejections_in_volume {
            self.count_rejections_in_volume = v;
        }
        if let Some(v) = overrides.percentile_window_ms {
            self.percentile_window_ms = v;
        }
        if let Some(v) = overrides.percentile_buckets {
            self.percentile_buckets = v;
        }
        self
    }

    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(self.sleep_window_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Duration covered by one bucket, never shorter than a millisecond.
    pub fn bucket_duration(&self) -> Duration {
        let buckets = u64::from(self.statistical_buckets.max(1));
        Duration::from_millis((self.statistical_window_ms / buckets).max(1))
    }

    /// Duration covered by one percentile bucket, never shorter than a
    /// millisecond.
    pub fn percentile_bucket_duration(&self) -> Duration {
        let buckets = u64::from(self.percentile_buckets.max(1));
        Duration::from_millis((self.percentile_window_ms / buckets).max(1))
    }

    pub fn sleep_window_ms(mut self, ms: u64) -> Self {
        self.sleep_window_ms = ms;
        self
    }

    pub fn error_threshold_percentage(mut self, pct: u8) -> Self {
        self.error_threshold_percentage = pct;
        self
    }

    pub fn request_volume_threshold(mut self, volume: u64) -> Self {
        self.request_volume_threshold = volume;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn statistical_window(mut self, window_ms: u64, buckets: u32) -> Self {
        self.statistical_window_ms = window_ms;
        self.statistical_buckets = buckets;
        self
    }

    pub fn rejection_threshold(mut self, max_in_flight: usize) -> Self {
        self.rejection_threshold = max_in_flight;
        self
    }

    pub fn count_rejections_in_volume(mut self, enabled: bool) -> Self {
        self.count_rejections_in_volume = enabled;
        self
    }

    pub fn percentile_window(mut self, window_ms: u64, buckets: u32) -> Self {
        self.percentile_window_ms = window_ms;
        self.percentile_buckets = buckets;
        self
    }
}

/// Partial settings. Present fields win over the defaults they are applied to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerOverrides {
    pub sleep_window_ms: Option<u64>,
    pub error_threshold_percentage: Option<u8>,
    pub request_volume_threshold: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub statistical_window_ms: Option<u64>,
    pub statistical_buckets: Option<u32>,
    pub rejection_threshold: Option<usize>,
    pub count_rejections_in_volume: Option<bool>,
    pub percentile_window_ms: Option<u64>,
    pub percentile_buckets: Option<u32>,
}

/// Open-circuit observer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Run the observer at all.
    pub enabled: bool,

    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Destination (and sender) address for outbound notifications.
    pub notification_address: Option<String>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 5000,
            notification_address: None,
        }
    }
}

impl ObserverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
