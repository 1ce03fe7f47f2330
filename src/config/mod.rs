//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize; unknown keys rejected)
//!     → validation.rs (semantic checks)
//!     → ShieldConfig (validated, immutable)
//!     → RuleStore::from_config
//!
//! On change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new RuleStore swapped in (in-flight requests keep theirs)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    IntegrityConfig, ObservabilityConfig, RateLimitStoreConfig, RateLimitStoreKind, RouteConfig,
    ServerConfig, ShieldConfig,
};
