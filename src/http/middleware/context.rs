//! Policy resolution middleware.
//! Resolves the route policy, generates the request nonce and attaches the
//! `RequestContext` every later stage reads.
//!
//! The prerender header is honored from loopback and configured peers only,
//! and is removed before the request goes upstream.

use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::config::ServerConfig;
use crate::context::RenderMode;
use crate::http::server::AppState;

pub async fn context_middleware(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let requested = req
        .headers_mut()
        .remove(state.server.prerender_header.as_str())
        .is_some();

    let mode = if requested && trusted_peer(&state.server, peer.ip()) {
        RenderMode::Prerender
    } else {
        if requested {
            tracing::warn!(peer = %peer.ip(), "Prerender header from untrusted peer ignored");
        }
        RenderMode::Dynamic
    };

    let ctx = state.shield.begin(req.uri().path(), req.headers(), mode);
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

fn trusted_peer(server: &ServerConfig, ip: IpAddr) -> bool {
    let ip = ip.to_canonical();
    ip.is_loopback() || server.prerender_trusted_peers.contains(&ip)
}
