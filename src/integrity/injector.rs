//! Render-time integrity injection.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::OnceCell;

use crate::integrity::{HashAlgorithm, IntegrityError, IntegrityTable};
use crate::markup::{Document, Element};
use crate::observability::metrics;

/// `link` relations that load a subresource integrity applies to.
const INTEGRITY_RELS: &[&str] = &["stylesheet", "preload", "modulepreload"];

/// Attaches `integrity` attributes using the build-time table, hashing
/// external URLs on first use.
pub struct IntegrityInjector {
    table: Arc<IntegrityTable>,
    algorithm: HashAlgorithm,
    client: Option<reqwest::Client>,
    external: DashMap<String, Arc<OnceCell<String>>>,
}

impl IntegrityInjector {
    /// Injector limited to the build-time table.
    pub fn new(table: Arc<IntegrityTable>) -> Self {
        Self {
            table,
            algorithm: HashAlgorithm::Sha384,
            client: None,
            external: DashMap::new(),
        }
    }

    /// Also fetch and hash external URLs missing from the table.
    pub fn with_external_fetch(mut self, timeout: Duration) -> Result<Self, IntegrityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(IntegrityError::Client)?;
        self.client = Some(client);
        Ok(self)
    }

    pub fn table(&self) -> &IntegrityTable {
        &self.table
    }

    /// Stamp every eligible element of `document`. Returns the number of
    /// elements that received an `integrity` attribute.
    pub async fn apply(&self, document: &mut Document) -> usize {
        let urls: Vec<String> = document
            .elements()
            .filter_map(target_url)
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            return 0;
        }

        let resolved = join_all(urls.iter().map(|url| self.integrity_for(url))).await;

        let mut stamped = 0;
        let targets = document.elements_mut().filter(|e| target_url(e).is_some());
        for (element, integrity) in targets.zip(resolved) {
            let Some(integrity) = integrity else {
                continue;
            };
            element.set_attr("integrity", &integrity);
            if !element.has_attr("crossorigin") {
                element.set_attr("crossorigin", "anonymous");
            }
            stamped += 1;
        }
        stamped
    }

    async fn integrity_for(&self, url: &str) -> Option<String> {
        if let Some(known) = self.table.lookup(url) {
            return Some(known.to_string());
        }

        let fetch_url = external_url(url)?;
        let client = self.client.as_ref()?;

        match self.fetch_cached(client, &fetch_url).await {
            Ok(integrity) => Some(integrity),
            Err(e) => {
                tracing::warn!(url = %fetch_url, error = %e, "Integrity unavailable, leaving element unchanged");
                None
            }
        }
    }

    /// Single-flight per URL; failed fetches are not cached.
    async fn fetch_cached(&self, client: &reqwest::Client, url: &str) -> Result<String, IntegrityError> {
        let cell = self.external.entry(url.to_string()).or_default().clone();
        cell.get_or_try_init(|| self.fetch(client, url))
            .await
            .cloned()
    }

    async fn fetch(&self, client: &reqwest::Client, url: &str) -> Result<String, IntegrityError> {
        let result = async {
            let response = client.get(url).send().await?.error_for_status()?;
            response.bytes().await
        }
        .await;

        match result {
            Ok(body) => {
                metrics::record_integrity_fetch("ok");
                tracing::debug!(url = %url, bytes = body.len(), "Hashed external asset");
                Ok(self.algorithm.integrity(&body))
            }
            Err(source) => {
                metrics::record_integrity_fetch("error");
                Err(IntegrityError::Fetch {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }
}

/// URL of an element that should carry `integrity`, if it lacks one.
fn target_url(element: &Element) -> Option<&str> {
    if element.has_attr("integrity") {
        return None;
    }
    let url = if element.is("script") {
        element.attr("src")
    } else if element.is("link") && INTEGRITY_RELS.iter().any(|rel| element.has_rel(rel)) {
        element.attr("href")
    } else {
        None
    }?;
    (!url.is_empty()).then_some(url)
}

/// Absolute fetchable form of an external URL; `None` for same-origin paths.
fn external_url(url: &str) -> Option<String> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Some(url.to_string())
    } else {
        url.strip_prefix("//").map(|rest| format!("https://{}", rest))
    }
}
