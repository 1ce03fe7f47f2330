//! Routing subsystem: maps request paths to security policies.
//!
//! # Data Flow
//! ```text
//! Rule compilation (at startup or config reload):
//!     defaults + [security] + [[routes]] + registered fragments
//!     → matcher.rs (parse patterns)
//!     → store.rs (merge duplicates, run transformers, sort by specificity)
//!     → Freeze as immutable RuleStore
//!
//! Per request:
//!     path → RuleStore::resolve → effective SecurityPolicy
//! ```
//!
//! # Design Decisions
//! - Rules compiled once, immutable at runtime
//! - No regex in hot path (segment matching only)
//! - Deterministic: the same rule set always resolves a path the same way,
//!   whatever the registration order

pub mod matcher;
pub mod store;

pub use matcher::{PatternError, RoutePattern};
pub use store::{PolicyTransformer, RouteRule, RuleStore, RuleStoreBuilder};
