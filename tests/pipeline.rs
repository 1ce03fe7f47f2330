//! End-to-end tests: client → shield → mock renderer.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;

mod common;

#[tokio::test]
async fn test_dynamic_page_gets_nonce_and_headers() {
    let renderer_addr: SocketAddr = "127.0.0.1:29101".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29102".parse().unwrap();
    common::start_mock_renderer(renderer_addr).await;
    let (shutdown, _updates) = common::start_shield(common::config(shield_addr, renderer_addr, "")).await;

    let res = common::client()
        .get(format!("http://{}/", shield_addr))
        .send()
        .await
        .expect("Shield unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers().clone();
    assert!(headers.get("x-powered-by").is_none());
    assert!(headers.get("x-request-id").is_some());
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert_eq!(headers["x-xss-protection"], "0");
    assert_eq!(headers["strict-transport-security"], "max-age=15552000; includeSubDomains");

    let body = res.text().await.unwrap();
    let nonce = common::echoed(&body, "nonce");
    assert_eq!(nonce.len(), 32, "renderer should receive the request nonce");

    let csp = headers["content-security-policy"].to_str().unwrap();
    assert!(csp.contains(&format!("'nonce-{}'", nonce)));
    assert!(!csp.contains("{{nonce}}"));
    assert!(body.contains(&format!("<script nonce=\"{}\">window.boot()</script>", nonce)));
    assert!(body.contains(&format!("<script src=\"/app.js\" nonce=\"{}\"></script>", nonce)));

    shutdown.trigger();
}

#[tokio::test]
async fn test_each_request_gets_a_fresh_nonce() {
    let renderer_addr: SocketAddr = "127.0.0.1:29111".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29112".parse().unwrap();
    common::start_mock_renderer(renderer_addr).await;
    let (shutdown, _updates) = common::start_shield(common::config(shield_addr, renderer_addr, "")).await;

    let client = common::client();
    let url = format!("http://{}/", shield_addr);
    let first = client.get(&url).send().await.unwrap().text().await.unwrap();
    let second = client.get(&url).send().await.unwrap().text().await.unwrap();
    assert_ne!(common::echoed(&first, "nonce"), common::echoed(&second, "nonce"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_route_override_and_non_html_passthrough() {
    let renderer_addr: SocketAddr = "127.0.0.1:29121".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29122".parse().unwrap();
    common::start_mock_renderer(renderer_addr).await;
    let config = common::config(
        shield_addr,
        renderer_addr,
        r#"
        [[routes]]
        pattern = "/api/**"
        [routes.security.headers]
        xXSSProtection = "1; mode=block"
        xFrameOptions = false
        "#,
    );
    let (shutdown, _updates) = common::start_shield(config).await;

    let res = common::client()
        .get(format!("http://{}/api/items", shield_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-xss-protection"], "1; mode=block");
    assert!(res.headers().get("x-frame-options").is_none());
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert_eq!(res.text().await.unwrap(), "{\"ok\":true}");

    shutdown.trigger();
}

#[tokio::test]
async fn test_rate_limit_rejects_after_budget() {
    let renderer_addr: SocketAddr = "127.0.0.1:29131".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29132".parse().unwrap();
    common::start_mock_renderer(renderer_addr).await;
    let config = common::config(
        shield_addr,
        renderer_addr,
        r#"
        [security.rate_limiter]
        tokens_per_interval = 3
        interval_ms = 60000
        headers = true
        "#,
    );
    let (shutdown, _updates) = common::start_shield(config).await;

    let client = common::client();
    let url = format!("http://{}/", shield_addr);
    for expected_remaining in ["2", "1", "0"] {
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-limit"], "3");
        assert_eq!(res.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);

    shutdown.trigger();
}

#[tokio::test]
async fn test_prerendered_page_uses_hashes() {
    let renderer_addr: SocketAddr = "127.0.0.1:29141".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29142".parse().unwrap();
    common::start_mock_renderer(renderer_addr).await;
    let (shutdown, _updates) = common::start_shield(common::config(shield_addr, renderer_addr, "")).await;

    let res = common::client()
        .get(format!("http://{}/blog/post", shield_addr))
        .header("x-shield-prerender", "1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let csp = res.headers()["content-security-policy"].to_str().unwrap().to_string();
    assert!(csp.contains("'sha256-"));
    assert!(csp.contains("frame-ancestors 'self'"));

    let body = res.text().await.unwrap();
    assert_eq!(common::echoed(&body, "nonce"), "");
    assert!(!body.contains("nonce=\""));
    assert!(body.contains("<head><meta http-equiv=\"Content-Security-Policy\" content=\""));
    let meta_start = body.find("content=\"").unwrap();
    let meta = &body[meta_start..body.find("\"><title>").unwrap()];
    assert!(meta.contains("'sha256-"));
    assert!(!meta.contains("frame-ancestors"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_guards_fatal_and_recoverable() {
    let renderer_addr: SocketAddr = "127.0.0.1:29151".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29152".parse().unwrap();
    common::start_mock_renderer(renderer_addr).await;
    let config = common::config(
        shield_addr,
        renderer_addr,
        r#"
        [security.allowed_methods_restricter]
        methods = ["GET", "HEAD"]

        [[routes]]
        pattern = "/search"
        [routes.security]
        xss_validator = { methods = ["GET"], throw_error = false }
        "#,
    );
    let (shutdown, _updates) = common::start_shield(config).await;

    let client = common::client();

    let res = client.delete(format!("http://{}/", shield_addr)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    let res = client
        .get(format!("http://{}/", shield_addr))
        .query(&[("q", "<script>alert(1)</script>")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("http://{}/search", shield_addr))
        .query(&[("q", "<script>alert(1)</script>")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert_eq!(common::echoed(&body, "rejection"), "400 Bad Request");

    shutdown.trigger();
}

#[tokio::test]
async fn test_basic_auth_route() {
    let renderer_addr: SocketAddr = "127.0.0.1:29161".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29162".parse().unwrap();
    common::start_mock_renderer(renderer_addr).await;
    let config = common::config(
        shield_addr,
        renderer_addr,
        r#"
        [[routes]]
        pattern = "/admin/**"
        [routes.security]
        basic_auth = { name = "ops", pass = "s3cret", realm = "staff only" }
        "#,
    );
    let (shutdown, _updates) = common::start_shield(config).await;

    let client = common::client();
    let url = format!("http://{}/admin/panel", shield_addr);

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["www-authenticate"], "Basic realm=\"staff only\"");

    let res = client.get(&url).basic_auth("ops", Some("s3cret")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(format!("http://{}/", shield_addr)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    shutdown.trigger();
}

#[tokio::test]
async fn test_upstream_down_still_sends_headers() {
    let renderer_addr: SocketAddr = "127.0.0.1:29171".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29172".parse().unwrap();
    let (shutdown, _updates) = common::start_shield(common::config(shield_addr, renderer_addr, "")).await;

    let res = common::client()
        .get(format!("http://{}/", shield_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");

    shutdown.trigger();
}

#[tokio::test]
async fn test_config_reload_swaps_rules() {
    let renderer_addr: SocketAddr = "127.0.0.1:29181".parse().unwrap();
    let shield_addr: SocketAddr = "127.0.0.1:29182".parse().unwrap();
    common::start_mock_renderer(renderer_addr).await;
    let (shutdown, updates) = common::start_shield(common::config(shield_addr, renderer_addr, "")).await;

    let client = common::client();
    let url = format!("http://{}/", shield_addr);
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.headers()["x-frame-options"], "SAMEORIGIN");

    let reloaded = common::config(
        shield_addr,
        renderer_addr,
        r#"
        [security.headers]
        xFrameOptions = "DENY"
        "#,
    );
    updates.send(reloaded).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.headers()["x-frame-options"], "DENY");

    shutdown.trigger();
}
