//! Subresource integrity.
//!
//! # Data Flow
//! ```text
//! Build time:
//!     asset dirs → indexer.rs (hash every file) → integrity manifest (JSON)
//!
//! Request time:
//!     manifest → IntegrityTable (Arc, read-only)
//!     rendered Document → injector.rs (integrity + crossorigin attributes)
//!                          └─ external URLs: fetched once, cached
//! ```
//!
//! # Design Decisions
//! - Manifest keys are public URLs (CDN absolute or root-relative)
//! - Query strings are ignored on lookup so cache-busted URLs still match
//! - Integrity failures never fail a request; the element is left as is

pub mod indexer;
pub mod injector;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

pub use indexer::{index_directory, IndexOptions};
pub use injector::IntegrityInjector;

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk asset directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid integrity manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Hash algorithms usable in `integrity` attributes and CSP hash sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    #[default]
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha384" => Some(HashAlgorithm::Sha384),
            "sha512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn hash(&self, content: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(content).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(content).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(content).to_vec(),
        }
    }

    /// `<alg>-<base64 digest>`, the value of an `integrity` attribute.
    pub fn integrity(&self, content: &[u8]) -> String {
        format!("{}-{}", self.name(), BASE64.encode(self.hash(content)))
    }
}

/// Public URL → integrity value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrityTable {
    entries: BTreeMap<String, String>,
}

impl IntegrityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, IntegrityError> {
        let content = std::fs::read_to_string(path).map_err(|source| IntegrityError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), IntegrityError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| IntegrityError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn insert(&mut self, url: String, integrity: String) {
        self.entries.insert(url, integrity);
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    /// Exact URL first, then the URL without its query string or fragment.
    pub fn lookup(&self, url: &str) -> Option<&str> {
        self.get(url).or_else(|| {
            let end = url.find(['?', '#'])?;
            self.get(&url[..end])
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_sha384() {
        // echo -n "alert('Hello, world.');" | openssl dgst -sha384 -binary | openssl base64 -A
        assert_eq!(
            HashAlgorithm::Sha384.integrity(b"alert('Hello, world.');"),
            "sha384-H8BRh8j48O9oYatfu5AZzq6A9RINhZO5H16dQZngK7T62em8MUt1FLm52t+eX6xO"
        );
    }

    #[test]
    fn test_lookup_ignores_query() {
        let mut table = IntegrityTable::new();
        table.insert("/_assets/app.js".into(), "sha384-x".into());
        assert_eq!(table.lookup("/_assets/app.js?v=3"), Some("sha384-x"));
        assert_eq!(table.lookup("/_assets/app.js#top"), Some("sha384-x"));
        assert_eq!(table.lookup("/_assets/other.js"), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrity.json");
        let mut table = IntegrityTable::new();
        table.insert("/a.js".into(), "sha384-a".into());
        table.save(&path).unwrap();

        assert_eq!(IntegrityTable::load(&path).unwrap(), table);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(HashAlgorithm::from_name("SHA256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_name("md5"), None);
        assert_eq!(HashAlgorithm::default().name(), "sha384");
    }
}
