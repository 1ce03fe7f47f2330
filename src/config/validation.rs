//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Route patterns must compile
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Options that would silently misbehave (basic auth without credentials)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShieldConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ShieldConfig;
use crate::policy::SecurityPolicy;
use crate::routing::RoutePattern;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("server.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("server.upstream `{0}` must be an http:// URL")]
    InvalidUpstream(String),

    #[error("server.request_timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("{0}")]
    InvalidPattern(String),

    #[error("route `{0}` is declared more than once")]
    DuplicateRoute(String),

    #[error("{scope}: rate_limiter.interval_ms must be greater than zero")]
    ZeroRateLimitInterval { scope: String },

    #[error("{scope}: basic_auth needs both name and pass")]
    IncompleteBasicAuth { scope: String },

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.server.bind_address.clone()));
    }
    match url::Url::parse(&config.server.upstream) {
        Ok(url) if url.scheme() == "http" && url.host_str().is_some() => {}
        _ => errors.push(ValidationError::InvalidUpstream(config.server.upstream.clone())),
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    validate_policy("security", &config.security, &mut errors);

    let mut seen = HashSet::new();
    for route in &config.routes {
        match RoutePattern::parse(&route.pattern) {
            Ok(pattern) => {
                if !seen.insert(pattern.to_string()) {
                    errors.push(ValidationError::DuplicateRoute(pattern.to_string()));
                }
            }
            Err(e) => errors.push(ValidationError::InvalidPattern(e.to_string())),
        }
        validate_policy(&format!("routes[{}]", route.pattern), &route.security, &mut errors);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_policy(scope: &str, policy: &SecurityPolicy, errors: &mut Vec<ValidationError>) {
    if let Some(limiter) = policy.rate_limiter() {
        if limiter.interval_ms == Some(0) {
            errors.push(ValidationError::ZeroRateLimitInterval {
                scope: scope.to_string(),
            });
        }
    }
    if let Some(auth) = policy.basic_auth() {
        if auth.name.is_none() || auth.pass.is_none() {
            errors.push(ValidationError::IncompleteBasicAuth {
                scope: scope.to_string(),
            });
        }
    }
}
