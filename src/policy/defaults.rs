//! Built-in policy carried by the `/**` rule before any configuration.

use crate::policy::csp::{CspDirectives, DirectiveValue};
use crate::policy::headers::{HeaderKey, HeaderPolicies, PolicyValue};
use crate::policy::hsts::StrictTransportSecurity;
use crate::policy::options::{
    MethodGuardOptions, NonceOptions, RateLimiterOptions, RequestSizeOptions, SsgOptions, Toggle,
};
use crate::policy::permissions::{deny, PermissionsPolicy};
use crate::policy::SecurityPolicy;

pub fn default_csp() -> CspDirectives {
    CspDirectives::new()
        .with("base-uri", DirectiveValue::sources(["'none'"]))
        .with("font-src", DirectiveValue::sources(["'self'", "https:", "data:"]))
        .with("form-action", DirectiveValue::sources(["'self'"]))
        .with("frame-ancestors", DirectiveValue::sources(["'self'"]))
        .with("img-src", DirectiveValue::sources(["'self'", "data:"]))
        .with("object-src", DirectiveValue::sources(["'none'"]))
        .with("script-src-attr", DirectiveValue::sources(["'none'"]))
        .with(
            "style-src",
            DirectiveValue::sources(["'self'", "https:", "'unsafe-inline'"]),
        )
        .with(
            "script-src",
            DirectiveValue::sources([
                "'self'",
                "https:",
                "'unsafe-inline'",
                "'strict-dynamic'",
                "'nonce-{{nonce}}'",
            ]),
        )
        .with("upgrade-insecure-requests", DirectiveValue::Flag(true))
}

pub fn default_headers() -> HeaderPolicies {
    let text = |value: &str| PolicyValue::Text(value.to_string());

    HeaderPolicies::new()
        .with(HeaderKey::CrossOriginResourcePolicy, text("same-origin"))
        .with(HeaderKey::CrossOriginOpenerPolicy, text("same-origin"))
        .with(HeaderKey::CrossOriginEmbedderPolicy, text("require-corp"))
        .with(HeaderKey::ContentSecurityPolicy, PolicyValue::Csp(default_csp()))
        .with(HeaderKey::OriginAgentCluster, text("?1"))
        .with(HeaderKey::ReferrerPolicy, text("no-referrer"))
        .with(
            HeaderKey::StrictTransportSecurity,
            PolicyValue::Hsts(StrictTransportSecurity::new(15_552_000, true, false)),
        )
        .with(HeaderKey::XContentTypeOptions, text("nosniff"))
        .with(HeaderKey::XDnsPrefetchControl, text("off"))
        .with(HeaderKey::XDownloadOptions, text("noopen"))
        .with(HeaderKey::XFrameOptions, text("SAMEORIGIN"))
        .with(HeaderKey::XPermittedCrossDomainPolicies, text("none"))
        .with(HeaderKey::XXssProtection, text("0"))
        .with(
            HeaderKey::PermissionsPolicy,
            PolicyValue::Permissions(
                PermissionsPolicy::new()
                    .with("camera", deny())
                    .with("display-capture", deny())
                    .with("fullscreen", deny())
                    .with("geolocation", deny())
                    .with("microphone", deny()),
            ),
        )
}

/// The policy every request starts from.
pub fn default_policy() -> SecurityPolicy {
    SecurityPolicy {
        headers: Some(Toggle::On(default_headers())),
        nonce: Some(Toggle::On(NonceOptions::default())),
        sri: Some(true),
        rate_limiter: Some(Toggle::On(RateLimiterOptions {
            tokens_per_interval: Some(150),
            interval_ms: Some(300_000),
            headers: Some(false),
            throw_error: Some(true),
            whitelist: None,
        })),
        request_size_limiter: Some(Toggle::On(RequestSizeOptions {
            max_request_size_in_bytes: Some(2_000_000),
            max_upload_file_request_in_bytes: Some(8_000_000),
            throw_error: Some(true),
        })),
        xss_validator: Some(Toggle::On(MethodGuardOptions {
            methods: Some(vec!["GET".to_string(), "POST".to_string()]),
            throw_error: Some(true),
        })),
        allowed_methods_restricter: Some(Toggle::On(MethodGuardOptions {
            methods: Some(vec!["*".to_string()]),
            throw_error: Some(true),
        })),
        basic_auth: Some(Toggle::Off),
        hide_powered_by: Some(true),
        ssg: Some(Toggle::On(SsgOptions {
            meta: Some(true),
            hash_scripts: Some(true),
            hash_styles: Some(false),
            nonce: Some(true),
        })),
    }
}
