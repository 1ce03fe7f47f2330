//! Rate limit state storage.
//!
//! # Design Decisions
//! - Async trait so shared stores (Redis and friends) can plug in
//! - Entries carry a TTL; an expired entry reads as absent
//! - `MemoryStore` is per process and the default

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Token bucket for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub remaining: u32,
    /// Unix time in milliseconds when the window opened.
    pub window_start_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RateLimitState>, StoreError>;

    async fn set(&self, key: &str, state: RateLimitState, ttl: Duration) -> Result<(), StoreError>;
}

/// In-process store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, (RateLimitState, Instant)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Purge expired entries every `interval` until the returned handle is
    /// aborted or the store is dropped.
    pub fn spawn_purger(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = store.len(), "Purged rate limit entries");
                }
            }
        })
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitState>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0))
    }

    async fn set(&self, key: &str, state: RateLimitState, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), (state, Instant::now() + ttl));
        Ok(())
    }
}
