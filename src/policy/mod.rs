//! Security policy model.
//!
//! # Data Flow
//! ```text
//! config file ([security], [[routes]])
//!     → SecurityPolicy fragments (partial, every field optional)
//!     → routing::RuleStore (merge least → most specific)
//!     → effective SecurityPolicy for one request
//! ```
//!
//! # Design Decisions
//! - One type for fragments and resolved policies; unset means "inherit"
//! - Merge law lives in `merge.rs`: lists replace, maps recurse
//! - Header values are structured where a codec exists (CSP, HSTS,
//!   Permissions-Policy) and opaque strings otherwise

pub mod csp;
pub mod defaults;
pub mod headers;
pub mod hsts;
pub mod merge;
pub mod options;
pub mod permissions;

use serde::{Deserialize, Serialize};

pub use csp::{CspDirectives, DirectiveValue};
pub use headers::{HeaderKey, HeaderPolicies, PolicyValue};
pub use hsts::StrictTransportSecurity;
pub use merge::Merge;
pub use options::{
    BasicAuthOptions, MethodGuardOptions, NonceMode, NonceOptions, RateLimiterOptions,
    RequestSizeOptions, SsgOptions, Toggle,
};
pub use permissions::{PermissionValue, PermissionsPolicy};

/// Security policy for a route, either a fragment or a fully resolved one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityPolicy {
    /// Managed response headers; `false` leaves every header untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Toggle<HeaderPolicies>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Toggle<NonceOptions>>,

    /// Subresource integrity injection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sri: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<Toggle<RateLimiterOptions>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_size_limiter: Option<Toggle<RequestSizeOptions>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub xss_validator: Option<Toggle<MethodGuardOptions>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_methods_restricter: Option<Toggle<MethodGuardOptions>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<Toggle<BasicAuthOptions>>,

    /// Strip `x-powered-by` from responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_powered_by: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssg: Option<Toggle<SsgOptions>>,
}

fn active<T>(toggle: &Option<Toggle<T>>) -> Option<&T> {
    toggle.as_ref().and_then(Toggle::enabled)
}

impl SecurityPolicy {
    /// Managed headers, `None` when headers are off or never configured.
    pub fn headers(&self) -> Option<&HeaderPolicies> {
        active(&self.headers)
    }

    pub fn headers_mut(&mut self) -> &mut HeaderPolicies {
        if !matches!(self.headers, Some(Toggle::On(_))) {
            self.headers = Some(Toggle::On(HeaderPolicies::new()));
        }
        match self.headers.as_mut() {
            Some(Toggle::On(headers)) => headers,
            _ => unreachable!("headers toggled on above"),
        }
    }

    /// Convenience for building fragments in code.
    pub fn with_header(mut self, key: HeaderKey, value: PolicyValue) -> Self {
        self.headers_mut().insert(key, value);
        self
    }

    pub fn header(&self, key: HeaderKey) -> Option<&PolicyValue> {
        self.headers().and_then(|headers| headers.get(key))
    }

    pub fn csp(&self) -> Option<&CspDirectives> {
        self.headers().and_then(HeaderPolicies::csp)
    }

    pub fn nonce(&self) -> Option<&NonceOptions> {
        active(&self.nonce)
    }

    pub fn sri_enabled(&self) -> bool {
        self.sri.unwrap_or(false)
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiterOptions> {
        active(&self.rate_limiter)
    }

    pub fn request_size_limiter(&self) -> Option<&RequestSizeOptions> {
        active(&self.request_size_limiter)
    }

    pub fn xss_validator(&self) -> Option<&MethodGuardOptions> {
        active(&self.xss_validator)
    }

    pub fn allowed_methods_restricter(&self) -> Option<&MethodGuardOptions> {
        active(&self.allowed_methods_restricter)
    }

    pub fn basic_auth(&self) -> Option<&BasicAuthOptions> {
        active(&self.basic_auth)
    }

    pub fn hide_powered_by(&self) -> bool {
        self.hide_powered_by.unwrap_or(false)
    }

    pub fn ssg(&self) -> Option<&SsgOptions> {
        active(&self.ssg)
    }
}

impl Merge for SecurityPolicy {
    fn merge(&mut self, upper: &Self) {
        self.headers.merge(&upper.headers);
        self.nonce.merge(&upper.nonce);
        self.sri.merge(&upper.sri);
        self.rate_limiter.merge(&upper.rate_limiter);
        self.request_size_limiter.merge(&upper.request_size_limiter);
        self.xss_validator.merge(&upper.xss_validator);
        self.allowed_methods_restricter
            .merge(&upper.allowed_methods_restricter);
        self.basic_auth.merge(&upper.basic_auth);
        self.hide_powered_by.merge(&upper.hide_powered_by);
        self.ssg.merge(&upper.ssg);
    }
}
