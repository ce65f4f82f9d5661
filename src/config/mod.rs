//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the CORS allow-list atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the CORS allow-list is hot-swapped
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuditConfig, AuthConfig, CorsConfig, LimitsConfig, ListenerConfig, ObservabilityConfig,
    RateLimitConfig, ShieldConfig, StaticTokenConfig, TimeoutConfig,
};
