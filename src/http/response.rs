//! Response handling and transformation.
//!
//! # Responsibilities
//! - Buffer and rewrite HTML documents from the renderer
//! - Apply the resolved security headers to every response
//! - Map upstream failures to gateway status codes
//!
//! # Design Decisions
//! - Only `text/html` bodies are buffered; everything else streams through
//! - Hop-by-hop headers from the renderer are dropped; framing is hyper's
//! - Encoded HTML (`Content-Encoding` other than identity) is passed
//!   through untouched, headers are still applied
//! - A body over the buffer limit becomes 502 rather than an unprocessed
//!   page missing its nonces

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};

use crate::context::RequestContext;
use crate::http::request::HOP_BY_HOP;
use crate::shield::Shield;

/// Rewrite the upstream response and apply headers.
pub async fn finalize(
    shield: &Shield,
    ctx: &RequestContext,
    method: &Method,
    max_body_bytes: usize,
    response: Response<Body>,
) -> Response {
    let (mut parts, body) = response.into_parts();
    for name in HOP_BY_HOP {
        parts.headers.remove(*name);
    }

    let body = if *method != Method::HEAD && is_processable_html(&parts.headers) {
        let bytes = match axum::body::to_bytes(body, max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.id(),
                    limit = max_body_bytes,
                    error = %e,
                    "Upstream document not buffered"
                );
                return gateway_error(shield, ctx, StatusCode::BAD_GATEWAY, "Upstream response too large");
            }
        };
        match String::from_utf8(bytes.to_vec()) {
            Ok(html) => {
                let processed = shield.process_html(ctx, &html).await;
                parts.headers.insert(header::CONTENT_LENGTH, processed.len().into());
                Body::from(processed)
            }
            Err(_) => {
                tracing::debug!(request_id = %ctx.id(), "Non UTF-8 document passed through");
                Body::from(bytes)
            }
        }
    } else {
        body
    };

    if let Err(e) = shield.finalize_headers(ctx, &mut parts.headers) {
        tracing::error!(request_id = %ctx.id(), error = %e, "Security headers could not be finalized");
        return e.into_response();
    }

    Response::from_parts(parts, body)
}

/// Error response produced by the shield itself, still carrying the
/// resolved security headers.
pub fn gateway_error(shield: &Shield, ctx: &RequestContext, status: StatusCode, message: &'static str) -> Response {
    let mut response = (status, message).into_response();
    if let Err(e) = shield.finalize_headers(ctx, response.headers_mut()) {
        return e.into_response();
    }
    response
}

fn is_processable_html(headers: &HeaderMap) -> bool {
    let is_html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false);

    let encoded = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| !value.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false);

    is_html && !encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RenderMode;
    use crate::policy::defaults::default_policy;
    use crate::routing::{RoutePattern, RuleStore};

    fn shield() -> Shield {
        let mut builder = RuleStore::builder();
        builder.register_pattern(RoutePattern::catch_all(), default_policy());
        Shield::new(builder.build())
    }

    fn upstream(content_type: &str, body: &'static str) -> Response<Body> {
        Response::builder()
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, body.len())
            .header("x-powered-by", "renderer")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_html_rewritten() {
        let shield = shield();
        let ctx = shield.begin("/", &HeaderMap::new(), RenderMode::Dynamic);
        let nonce = ctx.nonce().cloned().unwrap();

        let response = finalize(
            &shield,
            &ctx,
            &Method::GET,
            1024,
            upstream("text/html; charset=utf-8", "<html><head></head><body><script>go()</script></body></html>"),
        )
        .await;

        assert!(response.headers().get("x-powered-by").is_none());
        assert!(response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        let length: usize = response.headers()[header::CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), length);
        assert!(String::from_utf8_lossy(&body).contains(&format!("<script nonce=\"{}\">", nonce)));
    }

    #[tokio::test]
    async fn test_non_html_untouched() {
        let shield = shield();
        let ctx = shield.begin("/", &HeaderMap::new(), RenderMode::Dynamic);
        let response = finalize(&shield, &ctx, &Method::GET, 1024, upstream("application/json", "{\"a\":1}")).await;

        assert!(response.headers().contains_key("x-frame-options"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_oversized_document() {
        let shield = shield();
        let ctx = shield.begin("/", &HeaderMap::new(), RenderMode::Dynamic);
        let response = finalize(&shield, &ctx, &Method::GET, 8, upstream("text/html", "<html><body></body></html>")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().contains_key("x-content-type-options"));
    }

    #[test]
    fn test_encoded_html_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/html".parse().unwrap());
        assert!(is_processable_html(&headers));
        headers.insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
        assert!(!is_processable_html(&headers));
    }
}
