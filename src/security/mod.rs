//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (policy already resolved into the RequestContext):
//!     → rate_limit/ (per-client token bucket)
//!     → guards.rs (size, methods, injection, basic auth)
//!     → upstream render
//!
//! Response:
//!     → nonce.rs (markup nonces) | hashes.rs (prerendered CSP hashes)
//!     → headers.rs (final header set, nonce substitution)
//! ```
//!
//! # Design Decisions
//! - Every check reads its options from the resolved route policy
//! - Rejections follow the `throw_error` convention (see `crate::error`)

pub mod guards;
pub mod hashes;
pub mod headers;
pub mod nonce;
pub mod rate_limit;
