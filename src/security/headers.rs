//! Response header finalization.
//!
//! # Responsibilities
//! - Write every managed security header from the resolved policy
//! - Remove headers the policy disables, leave unmanaged ones untouched
//! - Fill or strip nonce placeholders, including in an upstream CSP
//! - Persist the nonce cookie in `check` mode, strip `x-powered-by`
//!
//! # Design Decisions
//! - The structured policy is encoded once per response, after CSP hashes
//!   collected from the body have been merged in
//! - A placeholder that needs a nonce the request never got is an error,
//!   never a silently broken header

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::codec;
use crate::context::RequestContext;
use crate::error::ShieldError;
use crate::policy::{HeaderKey, NonceMode, PolicyValue, SecurityPolicy};
use crate::security::nonce::{self, NonceSubstitution, NONCE_PLACEHOLDER};

const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Finalize `headers` for the response of `ctx`.
pub fn emit(headers: &mut HeaderMap, ctx: &RequestContext) -> Result<(), ShieldError> {
    let policy = ctx.policy();

    if policy.hide_powered_by() {
        headers.remove(X_POWERED_BY);
    }

    if let Some(managed) = policy.headers() {
        for (key, value) in managed.iter() {
            let name = key.http_name();
            let encoded = match value {
                PolicyValue::Disabled => {
                    headers.remove(&name);
                    continue;
                }
                PolicyValue::Csp(directives) if ctx.is_prerender() => {
                    let mut directives = directives.clone();
                    ctx.hashes().apply(&mut directives);
                    codec::csp::encode(&directives)
                }
                other => match codec::encode(*key, other) {
                    Some(encoded) => encoded,
                    None => continue,
                },
            };

            let encoded = if *key == HeaderKey::ContentSecurityPolicy {
                substitute(&encoded, ctx, true)?
            } else {
                encoded
            };
            insert(headers, name, &encoded);
        }
    }

    reconcile_upstream_csp(headers, ctx)?;

    if let Some(nonce_options) = policy.nonce() {
        if nonce_options.mode() == NonceMode::Check && !ctx.is_prerender() {
            if let Some(cookie) = ctx
                .nonce()
                .and_then(|n| nonce::nonce_cookie(nonce_options.cookie_name(), n))
            {
                headers.append(header::SET_COOKIE, cookie);
            }
        }
    }

    Ok(())
}

/// An upstream renderer may set its own CSP with placeholders when the
/// policy does not manage the header. Only the placeholder tokens are
/// touched, and only when the route has a nonce policy.
fn reconcile_upstream_csp(headers: &mut HeaderMap, ctx: &RequestContext) -> Result<(), ShieldError> {
    if managed_csp(ctx.policy()) || ctx.policy().nonce().is_none() {
        return Ok(());
    }
    let Some(upstream) = headers
        .get(header::CONTENT_SECURITY_POLICY)
        .and_then(|value| value.to_str().ok())
        .filter(|value| value.contains(NONCE_PLACEHOLDER))
        .map(str::to_string)
    else {
        return Ok(());
    };

    let reconciled = substitute(&upstream, ctx, false)?;
    insert(headers, header::CONTENT_SECURITY_POLICY, &reconciled);
    Ok(())
}

fn managed_csp(policy: &SecurityPolicy) -> bool {
    policy.header(HeaderKey::ContentSecurityPolicy).is_some()
}

/// Fill or strip nonce placeholders in an encoded CSP value. Concrete
/// `'nonce-...'` sources are only stripped from a header the policy manages.
fn substitute(encoded: &str, ctx: &RequestContext, managed: bool) -> Result<String, ShieldError> {
    let policy = ctx.policy();
    let strip = if managed {
        NonceSubstitution::Strip
    } else {
        NonceSubstitution::StripPlaceholder
    };

    let substitution = if ctx.is_prerender() {
        match policy.ssg() {
            Some(ssg) if ssg.nonce() && policy.nonce().is_some() => NonceSubstitution::KeepPlaceholder,
            _ => strip,
        }
    } else if policy.nonce().is_some() {
        match ctx.consume_nonce() {
            Some(nonce) => NonceSubstitution::Substitute(nonce),
            None if encoded.contains(NONCE_PLACEHOLDER) => {
                tracing::error!(request_id = %ctx.id(), path = %ctx.path(), "CSP needs a nonce but none was generated");
                return Err(ShieldError::NonceRequiredButMissing);
            }
            None => return Ok(encoded.to_string()),
        }
    } else {
        strip
    };

    Ok(nonce::apply_to_csp(encoded, substitution))
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, "Skipping header with invalid characters"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RenderMode;
    use crate::policy::defaults::default_policy;
    use crate::policy::{NonceOptions, Toggle};
    use crate::security::hashes::CspHashes;

    fn context(policy: SecurityPolicy, mode: RenderMode) -> RequestContext {
        RequestContext::new("/", policy, mode)
    }

    #[test]
    fn test_default_headers_with_nonce() {
        let ctx = context(default_policy(), RenderMode::Dynamic);
        let nonce = ctx.ensure_nonce(None).clone();
        let mut headers = HeaderMap::new();
        emit(&mut headers, &ctx).unwrap();

        let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert!(csp.contains(&format!("'nonce-{}'", nonce)));
        assert!(!csp.contains(NONCE_PLACEHOLDER));
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["strict-transport-security"], "max-age=15552000; includeSubDomains");
        assert_eq!(headers["x-xss-protection"], "0");
        assert_eq!(ctx.nonce_state(), crate::security::nonce::NonceState::Consumed);
    }

    #[test]
    fn test_nonce_disabled_strips_placeholder() {
        let mut policy = default_policy();
        policy.nonce = Some(Toggle::Off);
        let ctx = context(policy, RenderMode::Dynamic);
        let mut headers = HeaderMap::new();
        emit(&mut headers, &ctx).unwrap();

        let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert!(!csp.contains("nonce"));
        assert!(csp.contains("script-src 'self' https: 'unsafe-inline' 'strict-dynamic';"));
    }

    #[test]
    fn test_missing_nonce_is_an_error() {
        let ctx = context(default_policy(), RenderMode::Dynamic);
        let mut headers = HeaderMap::new();
        assert_eq!(emit(&mut headers, &ctx), Err(ShieldError::NonceRequiredButMissing));
    }

    #[test]
    fn test_disabled_header_removed_unmanaged_kept() {
        let policy = SecurityPolicy::default()
            .with_header(HeaderKey::XFrameOptions, PolicyValue::Disabled);
        let ctx = context(policy, RenderMode::Dynamic);
        let mut headers = HeaderMap::new();
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        headers.insert("x-custom", HeaderValue::from_static("1"));
        emit(&mut headers, &ctx).unwrap();

        assert!(headers.get("x-frame-options").is_none());
        assert_eq!(headers["x-custom"], "1");
    }

    #[test]
    fn test_no_headers_configured_leaves_response_untouched() {
        let policy = SecurityPolicy {
            headers: Some(Toggle::Off),
            ..Default::default()
        };
        let ctx = context(policy, RenderMode::Dynamic);
        let mut headers = HeaderMap::new();
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        emit(&mut headers, &ctx).unwrap();
        assert_eq!(headers["x-frame-options"], "DENY");
    }

    #[test]
    fn test_upstream_csp_placeholder_filled() {
        let policy = SecurityPolicy {
            nonce: Some(Toggle::On(NonceOptions::default())),
            ..Default::default()
        };
        let ctx = context(policy, RenderMode::Dynamic);
        let nonce = ctx.ensure_nonce(None).clone();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("script-src 'nonce-{{nonce}}'"),
        );
        emit(&mut headers, &ctx).unwrap();
        assert_eq!(
            headers[header::CONTENT_SECURITY_POLICY],
            format!("script-src 'nonce-{}'", nonce).as_str()
        );
    }

    #[test]
    fn test_unmanaged_upstream_csp_without_nonce_policy_untouched() {
        let policy = SecurityPolicy {
            headers: Some(Toggle::Off),
            ..Default::default()
        };
        let ctx = context(policy, RenderMode::Dynamic);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("script-src 'nonce-upstream123'"),
        );
        emit(&mut headers, &ctx).unwrap();
        assert_eq!(headers[header::CONTENT_SECURITY_POLICY], "script-src 'nonce-upstream123'");

        let ctx = context(SecurityPolicy::default(), RenderMode::Dynamic);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("script-src 'nonce-{{nonce}}'"),
        );
        emit(&mut headers, &ctx).unwrap();
        assert_eq!(headers[header::CONTENT_SECURITY_POLICY], "script-src 'nonce-{{nonce}}'");
    }

    #[test]
    fn test_unmanaged_upstream_csp_keeps_concrete_nonces() {
        let policy = SecurityPolicy {
            nonce: Some(Toggle::On(NonceOptions::default())),
            ..Default::default()
        };
        let ctx = context(policy, RenderMode::Prerender);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("script-src 'nonce-upstream123' 'nonce-{{nonce}}'"),
        );
        emit(&mut headers, &ctx).unwrap();
        assert_eq!(headers[header::CONTENT_SECURITY_POLICY], "script-src 'nonce-upstream123'");
    }

    #[test]
    fn test_prerender_keeps_placeholder_and_adds_hashes() {
        let ctx = context(default_policy(), RenderMode::Prerender);
        let mut hashes = CspHashes::default();
        hashes.scripts.insert("'sha256-abc'".into());
        ctx.add_hashes(hashes);

        let mut headers = HeaderMap::new();
        emit(&mut headers, &ctx).unwrap();
        let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert!(csp.contains("'nonce-{{nonce}}' 'sha256-abc'"));
        assert!(headers.get(header::SET_COOKIE).is_none());
    }

    #[test]
    fn test_check_mode_sets_cookie() {
        let mut policy = default_policy();
        policy.nonce = Some(Toggle::On(NonceOptions {
            mode: Some(NonceMode::Check),
            ..Default::default()
        }));
        let ctx = context(policy, RenderMode::Dynamic);
        let nonce = ctx.ensure_nonce(None).clone();
        let mut headers = HeaderMap::new();
        emit(&mut headers, &ctx).unwrap();

        let cookie = headers[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("__shield_nonce={};", nonce)));
    }

    #[test]
    fn test_hide_powered_by() {
        let policy = SecurityPolicy {
            hide_powered_by: Some(true),
            ..Default::default()
        };
        let ctx = context(policy, RenderMode::Dynamic);
        let mut headers = HeaderMap::new();
        headers.insert("x-powered-by", HeaderValue::from_static("Renderer"));
        emit(&mut headers, &ctx).unwrap();
        assert!(headers.get("x-powered-by").is_none());
    }
}
