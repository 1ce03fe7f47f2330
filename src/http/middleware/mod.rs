//! Request middleware owned by the HTTP layer.
//!
//! Rate limiting and the request guards live in `crate::security`; this
//! module only sets up the per-request context they read.

pub mod context;

pub use context::context_middleware;
