//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use header_shield::config::loader::parse_config;
use header_shield::config::ShieldConfig;
use header_shield::http::HttpServer;
use header_shield::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Start a mock renderer.
///
/// Paths under `/api` answer JSON; everything else answers an HTML page that
/// echoes the `x-shield-nonce` and `x-shield-rejection` request headers in
/// `<p id="nonce">` and `<p id="rejection">`.
pub async fn start_mock_renderer(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let request = read_request_head(&mut socket).await;
                        let path = request
                            .lines()
                            .next()
                            .and_then(|line| line.split_whitespace().nth(1))
                            .unwrap_or("/")
                            .to_string();

                        let (content_type, body) = if path.starts_with("/api") {
                            ("application/json", "{\"ok\":true}".to_string())
                        } else {
                            let nonce = request_header(&request, "x-shield-nonce").unwrap_or_default();
                            let rejection = request_header(&request, "x-shield-rejection").unwrap_or_default();
                            (
                                "text/html; charset=utf-8",
                                format!(
                                    "<!DOCTYPE html><html><head><title>mock</title>\
                                     <script src=\"/app.js\"></script></head>\
                                     <body><script>window.boot()</script>\
                                     <p id=\"nonce\">{}</p><p id=\"rejection\">{}</p></body></html>",
                                    nonce, rejection
                                ),
                            )
                        };

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nX-Powered-By: mock\r\nConnection: close\r\n\r\n{}",
                            content_type,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

fn request_header(request: &str, name: &str) -> Option<String> {
    request.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

/// Config with the shield on `shield_addr` in front of `renderer_addr`,
/// followed by `extra` TOML.
pub fn config(shield_addr: SocketAddr, renderer_addr: SocketAddr, extra: &str) -> ShieldConfig {
    parse_config(&format!(
        r#"
        [server]
        bind_address = "{}"
        upstream = "http://{}"

        [integrity]
        fetch_external = false

        [observability]
        metrics_enabled = false

        {}
        "#,
        shield_addr, renderer_addr, extra
    ))
    .unwrap()
}

/// Start the shield; returns the shutdown handle and the reload channel.
pub async fn start_shield(config: ShieldConfig) -> (Shutdown, mpsc::UnboundedSender<ShieldConfig>) {
    let addr: SocketAddr = config.server.bind_address.parse().unwrap();
    let shutdown = Shutdown::new();
    let (updates_tx, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind(addr).await.unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    (shutdown, updates_tx)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Text of `<p id="{id}">…</p>` in a page served by the mock renderer.
#[allow(dead_code)]
pub fn echoed(body: &str, id: &str) -> String {
    let open = format!("<p id=\"{}\">", id);
    let start = body.find(&open).map(|i| i + open.len()).unwrap_or(body.len());
    let end = body[start..].find("</p>").map(|i| start + i).unwrap_or(body.len());
    body[start..end].to_string()
}
