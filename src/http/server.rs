//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request ID, tracing, timeout, policy, limits, guards)
//! - Bind server to listener
//! - Forward requests to the rendering upstream
//! - Apply configuration reloads to the rule store
//!
//! # Middleware Order
//! ```text
//! SetRequestId → PropagateRequestId → Trace → Timeout
//!     → context (resolve policy, nonce)
//!     → rate limit (route options)
//!     → guards (size, methods, injection, basic auth)
//!     → proxy_handler
//! ```
//!
//! # Design Decisions
//! - Policy resolution runs first because limits and guards are per route
//! - Reloads replace the rule store only; listener, upstream and integrity
//!   settings need a restart

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ServerConfig, ShieldConfig};
use crate::context::RequestContext;
use crate::http::middleware::context_middleware;
use crate::http::request::{build_upstream_request, Upstream, UpstreamError};
use crate::http::response;
use crate::integrity::{IntegrityError, IntegrityInjector, IntegrityTable};
use crate::observability::metrics;
use crate::observability::tracing::{request_span, MakeRequestUuid, X_REQUEST_ID};
use crate::routing::{PatternError, RuleStore};
use crate::security::guards::guards_middleware;
use crate::security::rate_limit::{rate_limit_middleware, MemoryStore, RateLimiter};
use crate::shield::Shield;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub shield: Arc<Shield>,
    pub client: Client<HttpConnector, Body>,
    pub upstream: Upstream,
    pub server: Arc<ServerConfig>,
}

/// HTTP server fronting the renderer.
pub struct HttpServer {
    router: Router,
    config: ShieldConfig,
    shield: Arc<Shield>,
    store: Arc<MemoryStore>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ShieldConfig) -> Result<Self, ServerError> {
        let rules = RuleStore::from_config(&config)?;
        let upstream = Upstream::parse(&config.server.upstream)?;

        let table = match &config.integrity.manifest_path {
            Some(path) => IntegrityTable::load(path)?,
            None => IntegrityTable::new(),
        };
        tracing::info!(entries = table.len(), "Integrity table loaded");
        let mut injector = IntegrityInjector::new(Arc::new(table));
        if config.integrity.fetch_external {
            injector = injector
                .with_external_fetch(Duration::from_secs(config.integrity.fetch_timeout_secs))?;
        }
        let shield = Arc::new(Shield::new(rules).with_integrity(injector));

        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(RateLimiter::new(store.clone()));

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            shield: shield.clone(),
            client,
            upstream,
            server: Arc::new(config.server.clone()),
        };

        let router = Self::build_router(&config, state, limiter);
        Ok(Self {
            router,
            config,
            shield,
            store,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ShieldConfig, state: AppState, limiter: Arc<RateLimiter>) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .layer(middleware::from_fn(guards_middleware))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
            .layer(middleware::from_fn_with_state(state.clone(), context_middleware))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs))),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations received on `config_updates` replace the rule store;
    /// the server stops when `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ShieldConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.server.upstream,
            rules = self.shield.rules().len(),
            "HTTP server starting"
        );

        let purge_every = Duration::from_secs(self.config.rate_limit_store.purge_interval_secs.max(1));
        let purger = self.store.spawn_purger(purge_every);

        let shield = self.shield.clone();
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                match RuleStore::from_config(&new_config) {
                    Ok(rules) => shield.replace_rules(rules),
                    Err(e) => tracing::error!(error = %e, "Reloaded configuration rejected"),
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        purger.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn shield(&self) -> Arc<Shield> {
        self.shield.clone()
    }
}

/// Main proxy handler.
/// Forwards to the renderer, then rewrites the document and headers.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();

    let Some(ctx) = request.extensions().get::<RequestContext>().cloned() else {
        tracing::error!("Request reached the proxy without a resolved policy");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    };

    tracing::debug!(
        request_id = %ctx.id(),
        method = %method,
        path = %ctx.path(),
        "Proxying request"
    );

    let response = match build_upstream_request(request, &state.upstream, addr, &ctx) {
        Ok(upstream_request) => match state.client.request(upstream_request).await {
            Ok(upstream_response) => {
                let (parts, body) = upstream_response.into_parts();
                response::finalize(
                    &state.shield,
                    &ctx,
                    &method,
                    state.server.max_buffered_body_bytes,
                    Response::from_parts(parts, Body::new(body)),
                )
                .await
            }
            Err(e) => {
                tracing::error!(request_id = %ctx.id(), error = %e, "Upstream error");
                response::gateway_error(&state.shield, &ctx, StatusCode::BAD_GATEWAY, "Upstream request failed")
            }
        },
        Err(e) => {
            tracing::error!(request_id = %ctx.id(), error = %e, "Upstream request not built");
            response::gateway_error(&state.shield, &ctx, StatusCode::BAD_GATEWAY, "Upstream request failed")
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}
