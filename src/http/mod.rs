//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/ (resolve policy into the RequestContext)
//!     → [security: rate limit, guards]
//!     → request.rs (rewrite for the renderer, forward nonce and rejection)
//!     → renderer
//!     → response.rs (rewrite HTML, apply headers)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{X_SHIELD_NONCE, X_SHIELD_REJECTION};
pub use server::{AppState, HttpServer, ServerError};
