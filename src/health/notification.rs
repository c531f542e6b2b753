//! Alert sinks.
//!
//! # Responsibilities
//! - Define the outbound notification consumed by an external mailer
//! - Define the error log every alert is written to
//!
//! # Design Decisions
//! - Sinks are synchronous; implementations doing I/O hand off to their own
//!   task so the observer never blocks on delivery
//! - Delivery failures are the sink's concern, not the observer's

use serde::Serialize;
use uuid::Uuid;

/// One outbound alert message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub to: String,
    pub subject: String,
    pub from: String,
    pub group: String,
}

/// Outbound notification channel (mail, chat, pager...).
pub trait Notifier: Send + Sync {
    /// Build a notification. The default stamps a fresh UUID v4.
    fn create_notification(&self, message: &str, to: &str, subject: &str, from: &str, group: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            message: message.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            from: from.to_string(),
            group: group.to_string(),
        }
    }

    fn send(&self, notification: Notification);
}

/// Error log every alert is written to.
pub trait AlertLog: Send + Sync {
    fn log_error(&self, message: &str);
}

/// Writes alerts as `error` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertLog;

impl AlertLog for TracingAlertLog {
    fn log_error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

/// Notifier that only records deliveries in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: Notification) {
        tracing::warn!(
            id = %notification.id,
            to = %notification.to,
            subject = %notification.subject,
            "Notification dispatched"
        );
    }
}
