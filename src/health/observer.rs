//! Open-circuit observer.
//!
//! # Responsibilities
//! - Periodically poll every registered breaker
//! - Alert on circuits that are Open with errors in their window
//!
//! # Design Decisions
//! - Read-only: never changes circuit state
//! - At most one alert per qualifying operation per tick
//! - Runs on its own timer, independent of command execution

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::ObserverConfig;
use crate::health::notification::{AlertLog, Notifier, TracingAlertLog};
use crate::observability::metrics;
use crate::resilience::registry::{BreakerRegistry, OperationKey};
use crate::resilience::rolling_window::HealthSnapshot;

/// Notification group every alert is filed under.
pub const ALERT_GROUP: &str = "Back off";

/// One open-circuit alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub key: OperationKey,
    pub snapshot: HealthSnapshot,
    pub subject: String,
    pub message: String,
}

impl Alert {
    pub fn new(key: OperationKey, snapshot: HealthSnapshot) -> Self {
        let subject = format!("\"{}\" is active for {}", ALERT_GROUP, key);
        let stats = serde_json::to_string(&snapshot).unwrap_or_else(|_| format!("{:?}", snapshot));
        let message = format!("{}. Health stats: {}", subject, stats);
        Self {
            key,
            snapshot,
            subject,
            message,
        }
    }
}

pub struct StateObserver {
    registry: Arc<BreakerRegistry>,
    enabled: bool,
    poll_interval: Duration,
    notification_address: Option<String>,
    log: Arc<dyn AlertLog>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl StateObserver {
    /// A zero poll interval falls back to the default interval.
    pub fn new(registry: Arc<BreakerRegistry>, config: &ObserverConfig) -> Self {
        let mut poll_interval = config.poll_interval();
        if poll_interval.is_zero() {
            poll_interval = ObserverConfig::default().poll_interval();
            tracing::warn!(
                interval_ms = poll_interval.as_millis() as u64,
                "Observer poll interval is zero, using default"
            );
        }

        Self {
            registry,
            enabled: config.enabled,
            poll_interval,
            notification_address: config.notification_address.clone(),
            log: Arc::new(TracingAlertLog),
            notifier: None,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn AlertLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.enabled {
            tracing::info!("Circuit state observer disabled");
            return;
        }

        tracing::info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            notifications = self.notifier.is_some() && self.notification_address.is_some(),
            "Circuit state observer starting"
        );

        // First tick one full interval from now
        let mut ticker = time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Circuit state observer received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One observer tick. Returns the alerts emitted.
    pub fn check_all(&self) -> Vec<Alert> {
        let mut entries = self.registry.all_entries();
        entries.sort_by(|a, b| a.key().cmp(b.key()));

        let mut alerts = Vec::new();
        for entry in entries {
            if !entry.circuit().is_open() {
                continue;
            }

            let snapshot = entry.window().snapshot();
            if snapshot.error_count == 0 {
                continue;
            }

            let alert = Alert::new(entry.key().clone(), snapshot);
            self.emit(&alert);
            alerts.push(alert);
        }
        alerts
    }

    fn emit(&self, alert: &Alert) {
        self.log.log_error(&alert.message);
        metrics::record_open_alert(&alert.key);

        if let (Some(notifier), Some(address)) = (&self.notifier, &self.notification_address) {
            let notification =
                notifier.create_notification(&alert.message, address, &alert.subject, address, ALERT_GROUP);
            notifier.send(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerSettings;
    use crate::health::notification::Notification;
    use crate::resilience::rolling_window::Outcome;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLog(Mutex<Vec<String>>);

    impl AlertLog for RecordingLog {
        fn log_error(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<Notification>>);

    impl Notifier for RecordingNotifier {
        fn send(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    fn config(address: Option<&str>) -> ObserverConfig {
        ObserverConfig {
            notification_address: address.map(str::to_string),
            ..Default::default()
        }
    }

    fn open_breaker(registry: &BreakerRegistry, name: &str, failures: u64) {
        let key = OperationKey::new("DumbService", name).unwrap();
        let settings = BreakerSettings::default();
        let entry = registry.get_or_create(&key, &settings);
        for _ in 0..failures {
            entry.window().record(Outcome::Failure, Duration::ZERO);
        }
        let forced = HealthSnapshot {
            total_count: 10,
            error_count: 10,
            error_percentage: 100.0,
        };
        assert!(entry.circuit().evaluate(&forced, &settings));
    }

    #[test]
    fn test_alert_format() {
        let key = OperationKey::new("DumbService", "someMethod").unwrap();
        let alert = Alert::new(
            key,
            HealthSnapshot {
                total_count: 1,
                error_count: 1,
                error_percentage: 100.0,
            },
        );
        assert_eq!(alert.subject, "\"Back off\" is active for DumbService.someMethod");
        assert_eq!(
            alert.message,
            "\"Back off\" is active for DumbService.someMethod. Health stats: \
             {\"total_count\":1,\"error_count\":1,\"error_percentage\":100.0}"
        );
    }

    #[test]
    fn test_open_circuit_with_errors_alerts_once() {
        let registry = Arc::new(BreakerRegistry::new());
        open_breaker(&registry, "someMethod", 1);

        let log = Arc::new(RecordingLog::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let observer = StateObserver::new(registry, &config(Some("circuit-notify@cb.com")))
            .with_log(log.clone())
            .with_notifier(notifier.clone());

        let alerts = observer.check_all();
        assert_eq!(alerts.len(), 1);
        assert_eq!(log.0.lock().unwrap().len(), 1);

        let sent = notifier.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "circuit-notify@cb.com");
        assert_eq!(sent[0].from, "circuit-notify@cb.com");
        assert_eq!(sent[0].group, ALERT_GROUP);
        assert_eq!(sent[0].subject, alerts[0].subject);
        assert_eq!(sent[0].message, alerts[0].message);
    }

    #[test]
    fn test_no_alert_without_errors_or_when_closed() {
        let registry = Arc::new(BreakerRegistry::new());
        open_breaker(&registry, "openButClean", 0);
        let closed = OperationKey::new("DumbService", "closed").unwrap();
        let entry = registry.get_or_create(&closed, &BreakerSettings::default());
        entry.window().record(Outcome::Failure, Duration::ZERO);

        let log = Arc::new(RecordingLog::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let observer = StateObserver::new(registry, &config(Some("circuit-notify@cb.com")))
            .with_log(log.clone())
            .with_notifier(notifier.clone());

        assert!(observer.check_all().is_empty());
        assert!(log.0.lock().unwrap().is_empty());
        assert!(notifier.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_logs_but_does_not_notify_without_address() {
        let registry = Arc::new(BreakerRegistry::new());
        open_breaker(&registry, "someMethod", 3);

        let log = Arc::new(RecordingLog::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let observer = StateObserver::new(registry, &config(None))
            .with_log(log.clone())
            .with_notifier(notifier.clone());

        assert_eq!(observer.check_all().len(), 1);
        assert_eq!(log.0.lock().unwrap().len(), 1);
        assert!(notifier.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_uses_default() {
        let registry = Arc::new(BreakerRegistry::new());
        open_breaker(&registry, "someMethod", 1);
        let log = Arc::new(RecordingLog::default());
        let config = ObserverConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };

        let observer = StateObserver::new(registry, &config).with_log(log.clone());
        assert_eq!(observer.poll_interval(), ObserverConfig::default().poll_interval());

        let (tx, rx) = broadcast::channel(1);
        let handle = observer.spawn(rx);
        tokio::time::sleep(Duration::from_millis(5010)).await;
        assert_eq!(log.0.lock().unwrap().len(), 1);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_observer_does_not_touch_state() {
        let registry = Arc::new(BreakerRegistry::new());
        open_breaker(&registry, "someMethod", 1);
        let observer = StateObserver::new(registry.clone(), &config(None))
            .with_log(Arc::new(RecordingLog::default()));

        let key = OperationKey::new("DumbService", "someMethod").unwrap();
        let opened_at = registry.get(&key).unwrap().circuit().opened_at();
        observer.check_all();
        observer.check_all();
        let entry = registry.get(&key).unwrap();
        assert!(entry.circuit().is_open());
        assert_eq!(entry.circuit().opened_at(), opened_at);
    }
}
