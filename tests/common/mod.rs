//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use command_breaker::health::{AlertLog, Notification, Notifier};
use command_breaker::{BreakerRegistry, BreakerSettings, CommandError, CommandExecutor, CommandHooks, Protected};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DumbError {
    #[error("DumbService.throw exploded")]
    Exploded,
    #[error("Boom! You are unauthorized")]
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackValue {
    pub fallback_value: String,
    pub args: ThrowArgs,
}

/// A service with one method per breaker behaviour under test.
#[derive(Debug)]
pub struct DumbService {
    pub name: &'static str,
    pub calls: AtomicUsize,
}

impl Default for DumbService {
    fn default() -> Self {
        Self {
            name: "DumbService",
            calls: AtomicUsize::new(0),
        }
    }
}

impl DumbService {
    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn do_some_async_stuff(&self) -> Result<u32, DumbError> {
        self.hit();
        Ok(43)
    }

    pub async fn do_some_async_stuff_unprotected(&self) -> Result<u32, DumbError> {
        self.hit();
        Ok(42)
    }

    pub async fn do_some_async_stuff_in_limited_time(&self) -> Result<u32, DumbError> {
        self.hit();
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(1)
    }

    pub async fn unauthorized(&self) -> Result<u32, DumbError> {
        self.hit();
        Err(DumbError::Unauthorized)
    }

    pub async fn throw(&self, should_throw: bool) -> Result<&'static str, DumbError> {
        self.hit();
        if should_throw {
            Err(DumbError::Exploded)
        } else {
            Ok("healthy")
        }
    }

    pub async fn throw_with_fallback(&self, _a: String, _b: String, _c: Vec<String>) -> Result<FallbackValue, DumbError> {
        self.hit();
        Err(DumbError::Exploded)
    }
}

/// The capability interface callers see, implemented by the protected
/// delegate with the same signatures.
#[allow(async_fn_in_trait)]
pub trait DumbApi {
    async fn do_some_async_stuff(&self) -> Result<u32, CommandError<DumbError>>;
    async fn do_some_async_stuff_unprotected(&self) -> Result<u32, CommandError<DumbError>>;
    async fn do_some_async_stuff_in_limited_time(&self) -> Result<u32, CommandError<DumbError>>;
    async fn unauthorized(&self) -> Result<u32, CommandError<DumbError>>;
    async fn throw(&self, should_throw: bool) -> Result<&'static str, CommandError<DumbError>>;
    async fn throw_with_fallback(&self, a: String, b: String, c: Vec<String>) -> Result<FallbackValue, CommandError<DumbError>>;
}

impl DumbApi for Protected<DumbService> {
    async fn do_some_async_stuff(&self) -> Result<u32, CommandError<DumbError>> {
        self.call("do_some_async_stuff", (), |svc, _| async move { svc.do_some_async_stuff().await })
            .await
    }

    async fn do_some_async_stuff_unprotected(&self) -> Result<u32, CommandError<DumbError>> {
        self.call("do_some_async_stuff_unprotected", (), |svc, _| async move {
            svc.do_some_async_stuff_unprotected().await
        })
        .await
    }

    async fn do_some_async_stuff_in_limited_time(&self) -> Result<u32, CommandError<DumbError>> {
        self.call("do_some_async_stuff_in_limited_time", (), |svc, _| async move {
            svc.do_some_async_stuff_in_limited_time().await
        })
        .await
    }

    async fn unauthorized(&self) -> Result<u32, CommandError<DumbError>> {
        self.call("unauthorized", (), |svc, _| async move { svc.unauthorized().await })
            .await
    }

    async fn throw(&self, should_throw: bool) -> Result<&'static str, CommandError<DumbError>> {
        self.call("throw", should_throw, |svc, should_throw| async move { svc.throw(should_throw).await })
            .await
    }

    async fn throw_with_fallback(&self, a: String, b: String, c: Vec<String>) -> Result<FallbackValue, CommandError<DumbError>> {
        self.call("throw_with_fallback", (a, b, c), |svc, (a, b, c)| async move {
            svc.throw_with_fallback(a, b, c).await
        })
        .await
    }
}

pub type ThrowArgs = (String, String, Vec<String>);

/// A protected `DumbService` on its own registry.
pub fn protected_dumb_service() -> Protected<DumbService> {
    let registry = Arc::new(BreakerRegistry::new());
    let only_real_failures = CommandHooks::<(), u32, DumbError>::new().is_failure(|e| *e != DumbError::Unauthorized);
    let echo_fallback = CommandHooks::new().fallback(|err: CommandError<DumbError>, args: ThrowArgs| async move {
        Ok(FallbackValue {
            fallback_value: err.to_string(),
            args,
        })
    });

    Protected::builder(DumbService::default(), "DumbService")
        .protect("do_some_async_stuff", BreakerSettings::default())
        .protect("do_some_async_stuff_in_limited_time", BreakerSettings::default().timeout_ms(100))
        .protect_with(
            "unauthorized",
            BreakerSettings::default().sleep_window_ms(400),
            only_real_failures,
        )
        .protect(
            "throw",
            BreakerSettings::default()
                .error_threshold_percentage(50)
                .sleep_window_ms(400),
        )
        .protect_with("throw_with_fallback", BreakerSettings::default(), echo_fallback)
        .executor(CommandExecutor::new(registry))
        .build()
        .unwrap()
}

#[derive(Default)]
pub struct RecordingLog(pub Mutex<Vec<String>>);

impl RecordingLog {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl AlertLog for RecordingLog {
    fn log_error(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct RecordingNotifier(pub Mutex<Vec<Notification>>);

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: Notification) {
        self.0.lock().unwrap().push(notification);
    }
}
