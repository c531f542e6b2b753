//! Circuit breakers for calls to unreliable dependencies.
//!
//! Every protected operation, identified by `(group, name)`, gets its own
//! rolling statistics window and Closed/Open/Half-Open state machine. Calls
//! are mediated by [`CommandExecutor`] (directly, or through a
//! [`Protected`] service wrapper); a [`StateObserver`] periodically reports
//! open circuits through pluggable sinks.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{BreakerSettings, EngineConfig};
pub use health::StateObserver;
pub use lifecycle::Shutdown;
pub use resilience::{
    reset_all_circuit_breakers, BreakerRegistry, CircuitStatus, CommandError, CommandExecutor, CommandHooks,
    OperationKey, Protected,
};
