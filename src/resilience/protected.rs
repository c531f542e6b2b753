//! Explicit protection of a service's methods.
//!
//! A `Protected<S>` owns a service and a plan naming which of its methods run
//! under a breaker, with which settings and hooks. Callers implement their
//! service's own trait for `Protected<S>` and forward every method through
//! [`Protected::call`]; methods absent from the plan run directly.
//!
//! Hooks are captured when the method is planned and stored type-erased; a
//! call whose argument, value or error types differ from the planned hooks
//! runs with default hooks and logs a warning.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::config::{BreakerSettings, EngineConfig};
use crate::resilience::command::{CommandExecutor, CommandHooks};
use crate::resilience::error::{CommandError, KeyError};
use crate::resilience::registry::OperationKey;

type ErasedHooks = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone)]
struct PlannedMethod {
    key: OperationKey,
    settings: BreakerSettings,
    hooks: Option<ErasedHooks>,
}

impl PlannedMethod {
    fn hooks<A, T, E>(&self) -> Option<&CommandHooks<A, T, E>>
    where
        A: 'static,
        T: 'static,
        E: 'static,
    {
        let erased = self.hooks.as_ref()?;
        let hooks = erased.downcast_ref::<CommandHooks<A, T, E>>();
        if hooks.is_none() {
            tracing::warn!(
                operation = %self.key,
                "Planned hooks do not match the call's types, using defaults"
            );
        }
        hooks
    }
}

/// Builds a [`Protected`] from an explicit per-method plan.
#[derive(Debug)]
pub struct ProtectedBuilder<S> {
    inner: S,
    group: String,
    executor: Option<CommandExecutor>,
    plan: Vec<(String, BreakerSettings, Option<ErasedHooks>)>,
}

impl<S> ProtectedBuilder<S> {
    /// Run `method` under a breaker with `settings`.
    pub fn protect(mut self, method: impl Into<String>, settings: BreakerSettings) -> Self {
        self.plan.push((method.into(), settings, None));
        self
    }

    /// Run `method` under a breaker with `settings`, applying `hooks` on
    /// every call.
    pub fn protect_with<A, T, E>(
        mut self,
        method: impl Into<String>,
        settings: BreakerSettings,
        hooks: CommandHooks<A, T, E>,
    ) -> Self
    where
        A: 'static,
        T: 'static,
        E: 'static,
    {
        let hooks: ErasedHooks = Arc::new(hooks);
        self.plan.push((method.into(), settings, Some(hooks)));
        self
    }

    /// Protect each of `methods` with the settings `config` resolves for it.
    pub fn protect_from_config(mut self, config: &EngineConfig, methods: &[&str]) -> Self {
        for method in methods {
            let settings = match OperationKey::new(self.group.clone(), *method) {
                Ok(key) => config.settings_for(&key),
                // Rejected again in build()
                Err(_) => config.defaults.clone(),
            };
            self.plan.push((method.to_string(), settings, None));
        }
        self
    }

    /// Use a specific executor instead of the process-wide one.
    pub fn executor(mut self, executor: CommandExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> Result<Protected<S>, KeyError> {
        if self.group.is_empty() {
            return Err(KeyError::EmptyGroup);
        }

        let mut plan = HashMap::with_capacity(self.plan.len());
        for (method, settings, hooks) in self.plan {
            let key = OperationKey::new(self.group.clone(), method.clone())?;
            plan.insert(method, PlannedMethod { key, settings, hooks });
        }

        tracing::debug!(group = %self.group, methods = plan.len(), "Service protected");

        Ok(Protected {
            inner: Arc::new(self.inner),
            group: self.group,
            executor: self.executor.unwrap_or_default(),
            plan: Arc::new(plan),
        })
    }
}

/// A service whose planned methods run under circuit breakers.
#[derive(Debug)]
pub struct Protected<S> {
    inner: Arc<S>,
    group: String,
    executor: CommandExecutor,
    plan: Arc<HashMap<String, PlannedMethod>>,
}

impl<S> Clone for Protected<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            group: self.group.clone(),
            executor: self.executor.clone(),
            plan: Arc::clone(&self.plan),
        }
    }
}

impl<S> Protected<S> {
    pub fn builder(inner: S, group: impl Into<String>) -> ProtectedBuilder<S> {
        ProtectedBuilder {
            inner,
            group: group.into(),
            executor: None,
            plan: Vec::new(),
        }
    }

    /// The wrapped service, for everything that is not a planned method.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn is_protected(&self, method: &str) -> bool {
        self.plan.contains_key(method)
    }

    pub fn key_for(&self, method: &str) -> Option<&OperationKey> {
        self.plan.get(method).map(|p| &p.key)
    }

    /// Call `method` through its breaker with its planned hooks, directly
    /// when it is not planned.
    pub async fn call<A, T, E, F, Fut>(&self, method: &str, args: A, op: F) -> Result<T, CommandError<E>>
    where
        A: Clone + 'static,
        T: 'static,
        E: 'static,
        F: FnOnce(Arc<S>, A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let inner = Arc::clone(&self.inner);
        let Some(planned) = self.plan.get(method) else {
            return op(inner, args).await.map_err(CommandError::Operation);
        };

        let defaults = CommandHooks::new();
        let hooks = planned.hooks().unwrap_or(&defaults);
        self.executor
            .execute(&planned.key, &planned.settings, hooks, args, move |args| op(inner, args))
            .await
    }

    /// Like [`Protected::call`], but `hooks` replace the planned ones for
    /// this call.
    pub async fn call_with<A, T, E, F, Fut>(
        &self,
        method: &str,
        hooks: &CommandHooks<A, T, E>,
        args: A,
        op: F,
    ) -> Result<T, CommandError<E>>
    where
        A: Clone,
        F: FnOnce(Arc<S>, A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let inner = Arc::clone(&self.inner);
        match self.plan.get(method) {
            Some(planned) => {
                self.executor
                    .execute(&planned.key, &planned.settings, hooks, args, move |args| op(inner, args))
                    .await
            }
            None => op(inner, args).await.map_err(CommandError::Operation),
        }
    }
}
