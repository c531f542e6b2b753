//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds, window shape, intervals)
//! - Check that per-command override keys name an operation
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{BreakerSettings, EngineConfig};
use crate::resilience::registry::OperationKey;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{scope}: error_threshold_percentage must be 0-100, got {value}")]
    ErrorThreshold { scope: String, value: u8 },

    #[error("{scope}: timeout_ms must be greater than zero")]
    ZeroTimeout { scope: String },

    #[error("{scope}: statistical_buckets must be greater than zero")]
    ZeroBuckets { scope: String },

    #[error("{scope}: statistical_window_ms ({window_ms}) must be a non-zero multiple of statistical_buckets ({buckets})")]
    WindowShape {
        scope: String,
        window_ms: u64,
        buckets: u32,
    },

    #[error("{scope}: percentile_window_ms ({window_ms}) must be a non-zero multiple of percentile_buckets ({buckets})")]
    PercentileWindowShape {
        scope: String,
        window_ms: u64,
        buckets: u32,
    },

    #[error("commands.\"{0}\": key must have the form group.name")]
    CommandKey(String),

    #[error("observer.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,

    #[error("observer.notification_address must not be empty when set")]
    EmptyNotificationAddress,
}

/// Validate one settings block, appending problems to `errors`.
pub fn validate_settings(scope: &str, settings: &BreakerSettings, errors: &mut Vec<ValidationError>) {
    if settings.error_threshold_percentage > 100 {
        errors.push(ValidationError::ErrorThreshold {
            scope: scope.to_string(),
            value: settings.error_threshold_percentage,
        });
    }

    if settings.timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout { scope: scope.to_string() });
    }

    if settings.statistical_buckets == 0 {
        errors.push(ValidationError::ZeroBuckets { scope: scope.to_string() });
    } else {
        let buckets = u64::from(settings.statistical_buckets);
        let window = settings.statistical_window_ms;
        if window < buckets || window % buckets != 0 {
            errors.push(ValidationError::WindowShape {
                scope: scope.to_string(),
                window_ms: window,
                buckets: settings.statistical_buckets,
            });
        }
    }

    let buckets = u64::from(settings.percentile_buckets);
    let window = settings.percentile_window_ms;
    if buckets == 0 || window < buckets || window % buckets != 0 {
        errors.push(ValidationError::PercentileWindowShape {
            scope: scope.to_string(),
            window_ms: window,
            buckets: settings.percentile_buckets,
        });
    }
}

/// Validate the whole engine configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_settings("defaults", &config.defaults, &mut errors);

    let mut names: Vec<&String> = config.commands.keys().collect();
    names.sort();
    for name in names {
        let Some((group, op)) = name.split_once('.') else {
            errors.push(ValidationError::CommandKey(name.clone()));
            continue;
        };
        let Ok(key) = OperationKey::new(group, op) else {
            errors.push(ValidationError::CommandKey(name.clone()));
            continue;
        };
        let scope = format!("commands.\"{}\"", name);
        validate_settings(&scope, &config.settings_for(&key), &mut errors);
    }

    if config.observer.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }

    if let Some(address) = &config.observer.notification_address {
        if address.trim().is_empty() {
            errors.push(ValidationError::EmptyNotificationAddress);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
