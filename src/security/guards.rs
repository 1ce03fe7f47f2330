//! Request guards driven by the resolved route policy.
//!
//! # Responsibilities
//! - Request size limit (`content-length`, uploads get their own limit)
//! - Allowed methods
//! - Markup/script injection in query parameters
//! - HTTP basic auth
//!
//! # Design Decisions
//! - Checks are pure functions over request parts; the middleware only
//!   applies the throw/return convention
//! - Guards run in a fixed order and stop at the first fatal rejection

use std::sync::LazyLock;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::context::RequestContext;
use crate::error::{settle, ShieldError};
use crate::observability::metrics;
use crate::policy::{BasicAuthOptions, MethodGuardOptions, RequestSizeOptions};

static INJECTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<\s*/?\s*(script|iframe|object|embed|svg|img|style|link|meta|base|form|body)\b|javascript\s*:|vbscript\s*:|\bon[a-z]+\s*=",
    )
    .expect("injection pattern is a valid regex")
});

pub fn check_request_size(headers: &HeaderMap, options: &RequestSizeOptions) -> Result<(), ShieldError> {
    let Some(length) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
    else {
        return Ok(());
    };

    let is_upload = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().starts_with("multipart/form-data"));
    let limit = if is_upload {
        options.max_upload_file_request_in_bytes()
    } else {
        options.max_request_size_in_bytes()
    };

    if length > limit {
        return Err(ShieldError::PayloadTooLarge);
    }
    Ok(())
}

pub fn check_method(method: &Method, options: &MethodGuardOptions) -> Result<(), ShieldError> {
    if options.covers(method.as_str()) {
        Ok(())
    } else {
        Err(ShieldError::MethodNotAllowed)
    }
}

/// Reject query parameters that carry markup or script.
pub fn check_xss(method: &Method, query: Option<&str>, options: &MethodGuardOptions) -> Result<(), ShieldError> {
    if !options.covers(method.as_str()) {
        return Ok(());
    }
    let Some(query) = query else {
        return Ok(());
    };

    let suspicious = url::form_urlencoded::parse(query.as_bytes())
        .any(|(key, value)| INJECTION_PATTERN.is_match(&key) || INJECTION_PATTERN.is_match(&value));
    if suspicious {
        return Err(ShieldError::BadRequest);
    }
    Ok(())
}

pub fn check_basic_auth(headers: &HeaderMap, options: &BasicAuthOptions) -> Result<(), ShieldError> {
    let denied = || ShieldError::Unauthorized {
        realm: options.realm().to_string(),
    };

    let credentials = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .ok_or_else(denied)?;

    let (name, pass) = credentials.split_once(':').ok_or_else(denied)?;
    let expected_name = options.name.as_deref().unwrap_or_default();
    let expected_pass = options.pass.as_deref().unwrap_or_default();

    let matched = digest(name).as_slice().ct_eq(digest(expected_name).as_slice())
        & digest(pass).as_slice().ct_eq(digest(expected_pass).as_slice());
    if bool::from(matched) {
        Ok(())
    } else {
        Err(denied())
    }
}

/// Fixed-length digest so the comparison time does not depend on length.
fn digest(value: &str) -> Vec<u8> {
    Sha256::digest(value.as_bytes()).to_vec()
}

/// Middleware running every guard enabled for the route.
pub async fn guards_middleware(mut request: Request<Body>, next: Next) -> Response {
    let Some(ctx) = request.extensions().get::<RequestContext>().cloned() else {
        return next.run(request).await;
    };
    let policy = ctx.policy();

    let mut outcomes = Vec::with_capacity(4);
    if let Some(options) = policy.request_size_limiter() {
        outcomes.push((check_request_size(request.headers(), options), options.throw_error()));
    }
    if let Some(options) = policy.allowed_methods_restricter() {
        outcomes.push((check_method(request.method(), options), options.throw_error()));
    }
    if let Some(options) = policy.xss_validator() {
        outcomes.push((
            check_xss(request.method(), request.uri().query(), options),
            options.throw_error(),
        ));
    }
    if let Some(options) = policy.basic_auth() {
        outcomes.push((check_basic_auth(request.headers(), options), options.throw_error()));
    }

    for (outcome, throw_error) in outcomes {
        match settle(outcome, throw_error) {
            Ok(None) => {}
            Ok(Some(rejection)) => rejection.attach(request.extensions_mut()),
            Err(error) => {
                tracing::info!(
                    request_id = %ctx.id(),
                    path = %ctx.path(),
                    kind = error.kind(),
                    "Request rejected"
                );
                metrics::record_rejection(error.kind());
                return error.into_response();
            }
        }
    }

    next.run(request).await
}
