//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a protected operation:
//!     → registry.rs (look up or lazily create the operation's entry)
//!     → circuit_breaker.rs (closed? open? single half-open trial?)
//!     → registry.rs (claim an in-flight slot or reject)
//!     → timeouts.rs (race the operation against its deadline)
//!     → rolling_window.rs (record exactly one outcome)
//!     → latency_window.rs (latency of calls that reached the operation)
//!     → circuit_breaker.rs (re-evaluate; trip or resolve the trial)
//!     → command.rs (fallback on any failure path)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every protected call has a deadline
//! - State is per operation; no lock is shared between operations
//! - Short-circuits and rejections are telemetry, never errors
//! - Wrapping is explicit (protected.rs), no runtime interception

pub mod circuit_breaker;
pub mod command;
pub mod error;
pub mod latency_window;
pub mod protected;
pub mod registry;
pub mod rolling_window;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitStatus};
pub use command::{CommandExecutor, CommandHooks};
pub use error::{CommandError, KeyError};
pub use latency_window::{LatencyPercentiles, LatencyWindow};
pub use protected::{Protected, ProtectedBuilder};
pub use registry::{reset_all_circuit_breakers, BreakerEntry, BreakerRegistry, OperationKey};
pub use rolling_window::{Counts, HealthSnapshot, Outcome, RollingWindow};
