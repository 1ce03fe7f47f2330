//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge
//! server. All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::policy::SecurityPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ShieldConfig {
    /// Listener and upstream settings.
    pub server: ServerConfig,

    /// Global policy, merged onto the `/**` rule over the built-in defaults.
    pub security: SecurityPolicy,

    /// Route-scoped policy overrides.
    pub routes: Vec<RouteConfig>,

    /// Subresource integrity manifest and external fetching.
    pub integrity: IntegrityConfig,

    /// Backing store for rate limit buckets.
    pub rate_limit_store: RateLimitStoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener and upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Rendering upstream (e.g., "http://127.0.0.1:3000").
    pub upstream: String,

    /// Total request timeout, upstream included.
    pub request_timeout_secs: u64,

    /// Largest HTML body buffered for post-processing; larger bodies fail
    /// with 502.
    pub max_buffered_body_bytes: usize,

    /// Request header that switches a request to pre-render processing.
    pub prerender_header: String,

    /// Peers allowed to send `prerender_header` besides loopback.
    pub prerender_trusted_peers: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            upstream: "http://127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
            max_buffered_body_bytes: 10 * 1024 * 1024,
            prerender_header: "x-shield-prerender".to_string(),
            prerender_trusted_peers: Vec::new(),
        }
    }
}

/// One `[[routes]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Route pattern (`/admin/**`, `/blog/*`, `/login`).
    pub pattern: String,

    /// Partial policy merged over less specific rules.
    #[serde(default)]
    pub security: SecurityPolicy,
}

/// Integrity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrityConfig {
    /// Manifest written by `shield-cli index`. Without it only external
    /// URLs can be stamped.
    pub manifest_path: Option<PathBuf>,

    /// Fetch and hash external scripts and stylesheets on first use.
    pub fetch_external: bool,

    pub fetch_timeout_secs: u64,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            manifest_path: None,
            fetch_external: true,
            fetch_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStoreKind {
    #[default]
    Memory,
}

/// Rate limit storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitStoreConfig {
    pub kind: RateLimitStoreKind,

    /// How often expired buckets are dropped from memory.
    pub purge_interval_secs: u64,
}

impl Default for RateLimitStoreConfig {
    fn default() -> Self {
        Self {
            kind: RateLimitStoreKind::Memory,
            purge_interval_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
