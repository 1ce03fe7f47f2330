//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every subscriber's receiver fires → server drains
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Shutdown is a broadcast channel so any number of tasks can wait on it
//! - Config reload is driven by the file watcher, not by SIGHUP

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
