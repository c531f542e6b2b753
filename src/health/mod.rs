//! Breaker health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Observer (observer.rs):
//!     Periodic timer
//!     → Snapshot every registered breaker
//!     → Filter: circuit Open AND error_count > 0
//!     → Alert
//!
//! Sinks (notification.rs):
//!     Alert
//!     → AlertLog (always)
//!     → Notifier (when a notifier and an address are configured)
//! ```
//!
//! # Design Decisions
//! - Observation is read-only; it never drives circuit transitions
//! - Sinks are traits so the mailer/logger stay outside this crate

pub mod notification;
pub mod observer;

pub use notification::{AlertLog, LogNotifier, Notification, Notifier, TracingAlertLog};
pub use observer::{Alert, StateObserver, ALERT_GROUP};
