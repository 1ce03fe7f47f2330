//! Token bucket rate limiting.
//!
//! # Responsibilities
//! - Key requests by normalized client address
//! - Admit exactly `tokens_per_interval` requests per window
//! - Expose `x-ratelimit-*` headers when configured
//!
//! # Design Decisions
//! - Limits come from the resolved route policy, so the context middleware
//!   runs first
//! - The bucket refills all at once when the window elapses
//! - Storage errors fail open: a broken store must not take the site down

pub mod store;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::context::RequestContext;
use crate::error::{settle, ShieldError};
use crate::observability::metrics;
use crate::policy::RateLimiterOptions;

pub use store::{MemoryStore, RateLimitState, RateLimitStore, StoreError};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Bucket numbers reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Milliseconds until the bucket refills.
    pub reset_ms: u64,
}

impl RateLimitInfo {
    pub fn reset_secs(&self) -> u64 {
        self.reset_ms.div_ceil(1000)
    }

    pub fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset_secs()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed(RateLimitInfo),
    Limited(RateLimitInfo),
    /// Allow-listed client or unavailable store.
    Bypassed,
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub async fn check(&self, key: &str, options: &RateLimiterOptions) -> RateLimitDecision {
        self.check_at(key, options, now_ms()).await
    }

    /// Check against an explicit clock reading (Unix milliseconds).
    pub async fn check_at(
        &self,
        key: &str,
        options: &RateLimiterOptions,
        now_ms: u64,
    ) -> RateLimitDecision {
        if options.whitelist().iter().any(|allowed| allowed == key) {
            return RateLimitDecision::Bypassed;
        }

        let limit = options.tokens_per_interval();
        let interval_ms = options.interval_ms();

        let existing = match self.store.get(key).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(client = %key, error = %e, "Rate limit store read failed, admitting request");
                return RateLimitDecision::Bypassed;
            }
        };

        let mut state = match existing {
            Some(state) if now_ms.saturating_sub(state.window_start_ms) < interval_ms => state,
            _ => RateLimitState {
                remaining: limit,
                window_start_ms: now_ms,
            },
        };

        let elapsed = now_ms.saturating_sub(state.window_start_ms);
        let reset_ms = interval_ms.saturating_sub(elapsed);

        if state.remaining == 0 {
            return RateLimitDecision::Limited(RateLimitInfo {
                limit,
                remaining: 0,
                reset_ms,
            });
        }

        state.remaining -= 1;
        if let Err(e) = self
            .store
            .set(key, state, Duration::from_millis(reset_ms.max(1)))
            .await
        {
            tracing::warn!(client = %key, error = %e, "Rate limit store write failed");
        }

        RateLimitDecision::Allowed(RateLimitInfo {
            limit,
            remaining: state.remaining,
            reset_ms,
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Client identity: first `x-forwarded-for` entry, else the peer address.
pub fn client_key(headers: &HeaderMap, peer: SocketAddr) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match forwarded {
        Some(value) => match value.parse::<IpAddr>() {
            Ok(ip) => normalize_ip(ip).to_string(),
            Err(_) => match value.parse::<SocketAddr>() {
                Ok(addr) => normalize_ip(addr.ip()).to_string(),
                Err(_) => value.to_string(),
            },
        },
        None => normalize_ip(peer.ip()).to_string(),
    }
}

/// Unwrap IPv4-mapped IPv6 and collapse every loopback to `127.0.0.1`.
fn normalize_ip(ip: IpAddr) -> IpAddr {
    let ip = match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    };
    if ip.is_loopback() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        ip
    }
}

/// Middleware enforcing the route's rate limit.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(options) = request
        .extensions()
        .get::<RequestContext>()
        .and_then(|ctx| ctx.policy().rate_limiter().cloned())
    else {
        return next.run(request).await;
    };

    let key = client_key(request.headers(), addr);
    let decision = limiter.check(&key, &options).await;

    let info = match decision {
        RateLimitDecision::Bypassed => return next.run(request).await,
        RateLimitDecision::Allowed(info) => info,
        RateLimitDecision::Limited(info) => {
            tracing::warn!(client = %key, limit = info.limit, "Rate limit exceeded");
            metrics::record_rate_limited();
            let error = ShieldError::TooManyRequests {
                retry_after_secs: info.reset_secs(),
            };
            match settle(Err(error), options.throw_error()) {
                Err(error) => {
                    let mut response = error.into_response();
                    if options.headers() {
                        info.write_headers(response.headers_mut());
                    }
                    return response;
                }
                Ok(Some(rejection)) => rejection.attach(request.extensions_mut()),
                Ok(None) => {}
            }
            info
        }
    };

    let mut response = next.run(request).await;
    if options.headers() {
        info.write_headers(response.headers_mut());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(tokens: u32, interval_ms: u64) -> RateLimiterOptions {
        RateLimiterOptions {
            tokens_per_interval: Some(tokens),
            interval_ms: Some(interval_ms),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_admits_exactly_n_then_resets() {
        let limiter = RateLimiter::in_memory();
        let opts = options(3, 1_000);
        let t0 = 1_000_000;

        for i in 0..3 {
            let decision = limiter.check_at("1.2.3.4", &opts, t0 + i).await;
            assert!(matches!(decision, RateLimitDecision::Allowed(_)), "request {}", i);
        }
        assert!(matches!(
            limiter.check_at("1.2.3.4", &opts, t0 + 10).await,
            RateLimitDecision::Limited(_)
        ));
        assert!(matches!(
            limiter.check_at("5.6.7.8", &opts, t0 + 10).await,
            RateLimitDecision::Allowed(_)
        ));
        assert!(matches!(
            limiter.check_at("1.2.3.4", &opts, t0 + 1_000).await,
            RateLimitDecision::Allowed(_)
        ));
    }

    #[tokio::test]
    async fn test_info_counts_down() {
        let limiter = RateLimiter::in_memory();
        let opts = options(2, 10_000);

        let RateLimitDecision::Allowed(first) = limiter.check_at("k", &opts, 0).await else {
            panic!("first request limited");
        };
        assert_eq!(first.remaining, 1);
        assert_eq!(first.limit, 2);
        assert_eq!(first.reset_secs(), 10);

        let RateLimitDecision::Allowed(second) = limiter.check_at("k", &opts, 4_000).await else {
            panic!("second request limited");
        };
        assert_eq!(second.remaining, 0);
        assert_eq!(second.reset_ms, 6_000);
    }

    #[tokio::test]
    async fn test_whitelist_bypasses() {
        let limiter = RateLimiter::in_memory();
        let opts = RateLimiterOptions {
            whitelist: Some(vec!["10.0.0.1".into()]),
            ..options(0, 1_000)
        };
        assert_eq!(limiter.check_at("10.0.0.1", &opts, 0).await, RateLimitDecision::Bypassed);
        assert!(matches!(
            limiter.check_at("10.0.0.2", &opts, 0).await,
            RateLimitDecision::Limited(_)
        ));
    }

    #[test]
    fn test_client_key() {
        let peer: SocketAddr = "[::1]:9000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, peer), "127.0.0.1");

        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_key(&headers, peer), "203.0.113.7");

        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("::ffff:198.51.100.2"));
        assert_eq!(client_key(&headers, peer), "198.51.100.2");

        let mapped: SocketAddr = "[::ffff:127.0.0.1]:80".parse().unwrap();
        assert_eq!(client_key(&HeaderMap::new(), mapped), "127.0.0.1");
    }

    #[test]
    fn test_headers_written() {
        let info = RateLimitInfo {
            limit: 150,
            remaining: 149,
            reset_ms: 299_001,
        };
        let mut headers = HeaderMap::new();
        info.write_headers(&mut headers);
        assert_eq!(headers["x-ratelimit-limit"], "150");
        assert_eq!(headers["x-ratelimit-remaining"], "149");
        assert_eq!(headers["x-ratelimit-reset"], "300");
    }
}
