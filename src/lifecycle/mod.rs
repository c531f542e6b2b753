//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every background task (observer) sees recv() → exits
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl-C) → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
