//! Upstream request construction.
//!
//! # Responsibilities
//! - Rewrite the request URI to the rendering upstream
//! - Strip hop-by-hop headers, append `X-Forwarded-For`
//! - Hand the request nonce and any recoverable rejection to the renderer
//!
//! # Design Decisions
//! - The original `Host` header is preserved; the renderer sees the public host
//! - `Accept-Encoding` is dropped so HTML comes back uncompressed and can be
//!   post-processed

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{
    header,
    uri::{Authority, PathAndQuery, Scheme},
    HeaderName, HeaderValue, Request, Uri,
};

use crate::context::RequestContext;
use crate::error::Rejection;

pub const X_SHIELD_NONCE: HeaderName = HeaderName::from_static("x-shield-nonce");
pub const X_SHIELD_REJECTION: HeaderName = HeaderName::from_static("x-shield-rejection");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

pub(crate) const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream `{0}` must be an absolute http:// URL")]
    InvalidUpstream(String),

    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),
}

/// Scheme and authority of the rendering upstream.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
}

impl Upstream {
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let invalid = || UpstreamError::InvalidUpstream(raw.to_string());
        let uri: Uri = raw.parse().map_err(|_| invalid())?;
        let scheme = uri.scheme().cloned().ok_or_else(invalid)?;
        let authority = uri.authority().cloned().ok_or_else(invalid)?;
        if scheme != Scheme::HTTP {
            return Err(invalid());
        }
        Ok(Self { scheme, authority })
    }

    pub fn uri_for(&self, original: &Uri) -> Result<Uri, UpstreamError> {
        let path_and_query = original
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }
}

/// Turn the client request into the request sent to the renderer.
pub fn build_upstream_request(
    request: Request<Body>,
    upstream: &Upstream,
    peer: SocketAddr,
    ctx: &RequestContext,
) -> Result<Request<Body>, UpstreamError> {
    let rejection = request.extensions().get::<Rejection>().cloned();
    let (mut parts, body) = request.into_parts();

    parts.uri = upstream.uri_for(&parts.uri)?;

    for name in HOP_BY_HOP {
        parts.headers.remove(*name);
    }
    parts.headers.remove(header::ACCEPT_ENCODING);

    let forwarded_for = match parts
        .headers
        .get(&X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
    {
        Some(existing) => format!("{}, {}", existing, peer.ip()),
        None => peer.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        parts.headers.insert(X_FORWARDED_FOR, value);
    }

    parts.headers.remove(&X_SHIELD_NONCE);
    parts.headers.remove(&X_SHIELD_REJECTION);
    if let Some(nonce) = ctx.nonce() {
        if let Ok(value) = HeaderValue::from_str(nonce.as_str()) {
            parts.headers.insert(X_SHIELD_NONCE, value);
        }
    }
    if let Some(Rejection(error)) = rejection {
        if let Ok(value) = HeaderValue::from_str(&error.describe()) {
            parts.headers.insert(X_SHIELD_REJECTION, value);
        }
    }

    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RenderMode;
    use crate::error::ShieldError;
    use crate::policy::SecurityPolicy;

    fn peer() -> SocketAddr {
        "203.0.113.9:5000".parse().unwrap()
    }

    #[test]
    fn test_upstream_parse() {
        assert!(Upstream::parse("http://127.0.0.1:3000").is_ok());
        assert!(Upstream::parse("127.0.0.1:3000").is_err());
        assert!(Upstream::parse("https://renderer.internal").is_err());
    }

    #[test]
    fn test_request_rewritten() {
        let upstream = Upstream::parse("http://127.0.0.1:3000").unwrap();
        let ctx = RequestContext::new("/docs", SecurityPolicy::default(), RenderMode::Dynamic);
        let nonce = ctx.ensure_nonce(None).clone();

        let mut request = Request::builder()
            .uri("/docs?page=2")
            .header("host", "example.com")
            .header("connection", "keep-alive")
            .header("accept-encoding", "gzip")
            .header("x-shield-nonce", "forged")
            .body(Body::empty())
            .unwrap();
        Rejection(ShieldError::BadRequest).attach(request.extensions_mut());

        let upstream_request = build_upstream_request(request, &upstream, peer(), &ctx).unwrap();
        assert_eq!(upstream_request.uri(), "http://127.0.0.1:3000/docs?page=2");
        let headers = upstream_request.headers();
        assert_eq!(headers["host"], "example.com");
        assert!(headers.get("connection").is_none());
        assert!(headers.get("accept-encoding").is_none());
        assert_eq!(headers["x-forwarded-for"], "203.0.113.9");
        assert_eq!(headers["x-shield-nonce"], nonce.as_str());
        assert_eq!(headers["x-shield-rejection"], "400 Bad Request");
    }

    #[test]
    fn test_forwarded_for_appended() {
        let upstream = Upstream::parse("http://127.0.0.1:3000").unwrap();
        let ctx = RequestContext::new("/", SecurityPolicy::default(), RenderMode::Dynamic);
        let request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "198.51.100.1")
            .body(Body::empty())
            .unwrap();

        let upstream_request = build_upstream_request(request, &upstream, peer(), &ctx).unwrap();
        assert_eq!(upstream_request.headers()["x-forwarded-for"], "198.51.100.1, 203.0.113.9");
        assert!(upstream_request.headers().get("x-shield-nonce").is_none());
    }
}
