//! Request-time rejections shared by every guarding component.
//!
//! # Design Decisions
//! - Each component detects its own condition and produces a `ShieldError`
//! - Whether the error aborts the request or travels on as a plain value is
//!   decided by the component's `throw_error` option (see [`settle`])
//! - Status codes and messages are fixed per kind

use axum::{
    http::{header, Extensions, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// Errors raised while guarding or finalizing a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShieldError {
    #[error("Too Many Requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Payload Too Large")]
    PayloadTooLarge,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Bad Request")]
    BadRequest,

    #[error("Access denied")]
    Unauthorized { realm: String },

    #[error("Nonce required but missing")]
    NonceRequiredButMissing,
}

impl ShieldError {
    /// HTTP status code for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            ShieldError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ShieldError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ShieldError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ShieldError::BadRequest => StatusCode::BAD_REQUEST,
            ShieldError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ShieldError::NonceRequiredButMissing => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ShieldError::TooManyRequests { .. } => "too_many_requests",
            ShieldError::PayloadTooLarge => "payload_too_large",
            ShieldError::MethodNotAllowed => "method_not_allowed",
            ShieldError::BadRequest => "bad_request",
            ShieldError::Unauthorized { .. } => "unauthorized",
            ShieldError::NonceRequiredButMissing => "nonce_missing",
        }
    }

    /// One-line descriptor (`"<status> <message>"`) handed to the renderer
    /// when a rejection is recoverable.
    pub fn describe(&self) -> String {
        format!("{} {}", self.status().as_u16(), self)
    }
}

impl IntoResponse for ShieldError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.to_string()).into_response();
        match &self {
            ShieldError::TooManyRequests { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            ShieldError::Unauthorized { realm } => {
                if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", realm)) {
                    response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
                }
            }
            _ => {}
        }
        response
    }
}

/// A rejection that was downgraded to a plain value (`throw_error = false`).
///
/// Stored in the request extensions; the proxy handler forwards it to the
/// renderer in the `x-shield-rejection` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection(pub ShieldError);

impl Rejection {
    /// Record on the request; the first rejection recorded is kept.
    pub fn attach(self, extensions: &mut Extensions) {
        if extensions.get::<Rejection>().is_none() {
            tracing::debug!(kind = self.0.kind(), "Recoverable rejection forwarded");
            extensions.insert(self);
        }
    }
}

/// Apply the throw/return convention to a detected condition.
///
/// `Err` means the request must be aborted with the error's response,
/// `Ok(Some(_))` means the caller continues and decides itself.
pub fn settle(
    outcome: Result<(), ShieldError>,
    throw_error: bool,
) -> Result<Option<Rejection>, ShieldError> {
    match outcome {
        Ok(()) => Ok(None),
        Err(err) if throw_error => Err(err),
        Err(err) => Ok(Some(Rejection(err))),
    }
}
