//! Request-scoped shield state.
//!
//! # Responsibilities
//! - Hold the policy resolved once for the request
//! - Own the nonce lifecycle (`Unset → Generated → Consumed`)
//! - Accumulate CSP hash sources while a page is post-processed
//!
//! # Design Decisions
//! - Cheap to clone; clones (sub-requests) share nonce and hashes
//! - Stored in the request extensions by the context middleware, read by
//!   every later stage

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use uuid::Uuid;

use crate::observability::metrics;
use crate::policy::SecurityPolicy;
use crate::security::hashes::CspHashes;
use crate::security::nonce::{Nonce, NonceState};

/// How the response body is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Rendered per request; nonces go into markup and header.
    #[default]
    Dynamic,
    /// Pre-rendered static output; hashes instead of nonces.
    Prerender,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    id: Uuid,
    path: String,
    policy: SecurityPolicy,
    mode: RenderMode,
    nonce: OnceLock<Nonce>,
    consumed: AtomicBool,
    hashes: Mutex<CspHashes>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>, policy: SecurityPolicy, mode: RenderMode) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                path: path.into(),
                policy,
                mode,
                nonce: OnceLock::new(),
                consumed: AtomicBool::new(false),
                hashes: Mutex::new(CspHashes::default()),
            }),
        }
    }

    /// Context for a sub-request composing the same page.
    pub fn child(&self) -> Self {
        self.clone()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.inner.policy
    }

    pub fn mode(&self) -> RenderMode {
        self.inner.mode
    }

    pub fn is_prerender(&self) -> bool {
        self.inner.mode == RenderMode::Prerender
    }

    pub fn nonce_state(&self) -> NonceState {
        match (self.inner.nonce.get(), self.inner.consumed.load(Ordering::Acquire)) {
            (None, _) => NonceState::Unset,
            (Some(_), false) => NonceState::Generated,
            (Some(_), true) => NonceState::Consumed,
        }
    }

    pub fn nonce(&self) -> Option<&Nonce> {
        self.inner.nonce.get()
    }

    /// The request nonce, created on first call. `existing` (a cookie value
    /// in check mode) is used instead of a fresh nonce when provided.
    pub fn ensure_nonce(&self, existing: Option<Nonce>) -> &Nonce {
        self.inner.nonce.get_or_init(|| match existing {
            Some(nonce) => {
                metrics::record_nonce("reused");
                nonce
            }
            None => {
                metrics::record_nonce("generated");
                Nonce::generate()
            }
        })
    }

    /// Mark the nonce as substituted into the response.
    pub fn consume_nonce(&self) -> Option<&Nonce> {
        let nonce = self.inner.nonce.get()?;
        self.inner.consumed.store(true, Ordering::Release);
        Some(nonce)
    }

    pub fn add_hashes(&self, hashes: CspHashes) {
        if let Ok(mut collected) = self.inner.hashes.lock() {
            collected.extend(hashes);
        }
    }

    pub fn hashes(&self) -> CspHashes {
        self.inner
            .hashes
            .lock()
            .map(|collected| collected.clone())
            .unwrap_or_default()
    }
}
