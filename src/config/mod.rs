//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → settings_for(key) resolves [defaults] + [commands."group.name"]
//!     → BreakerSettings handed to the executor on first wrap
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a breaker keeps the settings it was
//!   created with for its whole life
//! - All fields have defaults to allow minimal configs
//! - Overrides merge field by field, never as whole objects

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BreakerOverrides;
pub use schema::BreakerSettings;
pub use schema::EngineConfig;
pub use schema::ObservabilityConfig;
pub use schema::ObserverConfig;
