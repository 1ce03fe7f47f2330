//! The engine tying resolution, nonces, integrity and headers together.
//!
//! # Data Flow
//! ```text
//! begin(path, request headers, mode)
//!     → RuleStore::resolve(path)          (current snapshot)
//!     → nonce (cookie in check mode, else fresh; never for prerender)
//!     → RequestContext
//!
//! process_document(ctx, document)
//!     → integrity (if sri enabled)
//!     → nonce attributes (dynamic) | CSP hashes + meta CSP (prerender)
//!
//! finalize_headers(ctx, response headers)
//!     → security::headers::emit
//! ```
//!
//! # Design Decisions
//! - The rule store sits behind `ArcSwap`; each request works on the
//!   snapshot it started with, reloads never block readers

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::HeaderMap;

use crate::codec;
use crate::context::{RenderMode, RequestContext};
use crate::error::ShieldError;
use crate::integrity::IntegrityInjector;
use crate::markup::Document;
use crate::policy::NonceMode;
use crate::routing::RuleStore;
use crate::security::hashes::{self, CspHashes};
use crate::security::headers;
use crate::security::nonce::{self, NonceSubstitution};

pub struct Shield {
    rules: ArcSwap<RuleStore>,
    integrity: Option<IntegrityInjector>,
}

impl Shield {
    pub fn new(rules: RuleStore) -> Self {
        Self {
            rules: ArcSwap::from_pointee(rules),
            integrity: None,
        }
    }

    pub fn with_integrity(mut self, injector: IntegrityInjector) -> Self {
        self.integrity = Some(injector);
        self
    }

    /// Current rule store snapshot.
    pub fn rules(&self) -> Arc<RuleStore> {
        self.rules.load_full()
    }

    /// Swap in a new rule store; in-flight requests keep their snapshot.
    pub fn replace_rules(&self, rules: RuleStore) {
        tracing::info!(rules = rules.len(), "Rule store replaced");
        self.rules.store(Arc::new(rules));
    }

    /// Resolve the policy for `path` and set up the request context.
    pub fn begin(&self, path: &str, request_headers: &HeaderMap, mode: RenderMode) -> RequestContext {
        let policy = self.rules.load().resolve(path);
        let ctx = RequestContext::new(path, policy, mode);

        if mode == RenderMode::Dynamic {
            if let Some(options) = ctx.policy().nonce() {
                let existing = match options.mode() {
                    NonceMode::Check => nonce::nonce_from_cookie(request_headers, options.cookie_name()),
                    NonceMode::Renew => None,
                };
                ctx.ensure_nonce(existing);
            }
        }

        tracing::debug!(
            request_id = %ctx.id(),
            path = %path,
            mode = ?mode,
            nonce = ctx.nonce().is_some(),
            "Policy resolved"
        );
        ctx
    }

    /// Rewrite a rendered page in place: integrity first, then nonces or
    /// (pre-rendered) CSP hashes.
    pub async fn process_document(&self, ctx: &RequestContext, document: &mut Document) {
        let policy = ctx.policy();

        if policy.sri_enabled() {
            if let Some(injector) = &self.integrity {
                let stamped = injector.apply(document).await;
                tracing::trace!(request_id = %ctx.id(), stamped, "Integrity attributes added");
            }
        }

        if !ctx.is_prerender() {
            if let (Some(_), Some(nonce)) = (policy.nonce(), ctx.nonce()) {
                nonce::inject_markup(document, nonce);
            }
            return;
        }

        let Some(ssg) = policy.ssg() else {
            return;
        };
        let collected = CspHashes::collect(document, ssg);
        ctx.add_hashes(collected);

        if ssg.meta() {
            if let Some(csp) = policy.csp() {
                let mut meta_csp = hashes::meta_policy(csp);
                ctx.hashes().apply(&mut meta_csp);
                let substitution = if ssg.nonce() && policy.nonce().is_some() {
                    NonceSubstitution::KeepPlaceholder
                } else {
                    NonceSubstitution::Strip
                };
                let content = nonce::apply_to_csp(&codec::csp::encode(&meta_csp), substitution);
                document.insert_head_first(hashes::meta_element(&content));
            }
        }
    }

    pub async fn process_html(&self, ctx: &RequestContext, html: &str) -> String {
        let mut document = Document::parse(html);
        self.process_document(ctx, &mut document).await;
        document.render()
    }

    pub fn finalize_headers(&self, ctx: &RequestContext, response_headers: &mut HeaderMap) -> Result<(), ShieldError> {
        headers::emit(response_headers, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::IntegrityTable;
    use crate::policy::{HeaderKey, PolicyValue, SecurityPolicy, Toggle};
    use axum::http::{header, HeaderValue};

    fn shield() -> Shield {
        let mut builder = RuleStore::builder();
        builder.register_pattern(crate::routing::RoutePattern::catch_all(), crate::policy::defaults::default_policy());
        builder
            .register("/embed/**", SecurityPolicy::default().with_header(HeaderKey::XFrameOptions, PolicyValue::Disabled))
            .unwrap();

        let mut table = IntegrityTable::new();
        table.insert("/app.js".into(), "sha384-app".into());
        Shield::new(builder.build()).with_integrity(IntegrityInjector::new(Arc::new(table)))
    }

    const PAGE: &str = r#"<html><head><title>x</title></head><body><script src="/app.js"></script><script>boot()</script></body></html>"#;

    #[tokio::test]
    async fn test_dynamic_page() {
        let shield = shield();
        let ctx = shield.begin("/", &HeaderMap::new(), RenderMode::Dynamic);
        let nonce = ctx.nonce().cloned().unwrap();

        let html = shield.process_html(&ctx, PAGE).await;
        assert!(html.contains(&format!(
            r#"<script src="/app.js" integrity="sha384-app" crossorigin="anonymous" nonce="{}"></script>"#,
            nonce
        )));
        assert!(html.contains(&format!(r#"<script nonce="{}">boot()</script>"#, nonce)));

        let mut response_headers = HeaderMap::new();
        shield.finalize_headers(&ctx, &mut response_headers).unwrap();
        assert!(response_headers[header::CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap()
            .contains(nonce.as_str()));
    }

    #[tokio::test]
    async fn test_prerendered_page() {
        let shield = shield();
        let ctx = shield.begin("/", &HeaderMap::new(), RenderMode::Prerender);
        assert!(ctx.nonce().is_none());

        let html = shield.process_html(&ctx, PAGE).await;
        assert!(!html.contains("nonce=\""));
        assert!(html.contains(r#"<head><meta http-equiv="Content-Security-Policy" content=""#));
        let meta_start = html.find("content=\"").unwrap();
        let meta = &html[meta_start..html.find("\"><title>").unwrap()];
        assert!(!meta.contains("frame-ancestors"));
        assert!(meta.contains("'sha384-app'"));
        assert!(meta.contains("'nonce-{{nonce}}'"));
        assert!(meta.contains("'sha256-"));
    }

    #[tokio::test]
    async fn test_check_mode_reads_cookie() {
        let mut builder = RuleStore::builder();
        let policy: SecurityPolicy = toml::from_str(r#"nonce = { mode = "check" }"#).unwrap();
        builder.register("/**", policy).unwrap();
        let shield = Shield::new(builder.build());

        let cookie_nonce = nonce::Nonce::generate();
        let mut request_headers = HeaderMap::new();
        request_headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("__shield_nonce={}", cookie_nonce)).unwrap(),
        );
        let ctx = shield.begin("/", &request_headers, RenderMode::Dynamic);
        assert_eq!(ctx.nonce(), Some(&cookie_nonce));
    }

    #[test]
    fn test_replace_rules() {
        let shield = shield();
        let before = shield.rules();
        let mut builder = RuleStore::builder();
        builder
            .register("/**", SecurityPolicy { headers: Some(Toggle::Off), ..Default::default() })
            .unwrap();
        shield.replace_rules(builder.build());

        assert!(shield.rules().resolve("/").headers().is_none());
        assert!(before.resolve("/").headers().is_some());
    }
}
