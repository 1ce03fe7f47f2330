//! Build-time asset indexing.

use std::path::Path;

use walkdir::WalkDir;

use crate::integrity::{HashAlgorithm, IntegrityError, IntegrityTable};

/// How file paths map to public URLs.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Absolute CDN prefix (`https://cdn.example.com/`); wins over `base`.
    pub cdn_url: Option<String>,
    /// Root-relative prefix the directory is served under (`/`, `/_assets/`).
    pub base: String,
    pub algorithm: HashAlgorithm,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            cdn_url: None,
            base: "/".to_string(),
            algorithm: HashAlgorithm::Sha384,
        }
    }
}

impl IndexOptions {
    /// Public URL of a file given its path relative to the indexed directory.
    pub fn public_url(&self, relative: &Path) -> String {
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let relative = relative.join("/");

        match &self.cdn_url {
            Some(cdn) => format!("{}/{}", cdn.trim_end_matches('/'), relative),
            None => {
                let base = self.base.trim_matches('/');
                if base.is_empty() {
                    format!("/{}", relative)
                } else {
                    format!("/{}/{}", base, relative)
                }
            }
        }
    }
}

/// Hash every file below `dir` into `table`. Returns the number of files.
pub fn index_directory(
    table: &mut IntegrityTable,
    dir: &Path,
    options: &IndexOptions,
) -> Result<usize, IntegrityError> {
    let mut indexed = 0;

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let content = std::fs::read(path).map_err(|source| IntegrityError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let url = options.public_url(relative);

        tracing::trace!(url = %url, bytes = content.len(), "Indexed asset");
        table.insert(url, options.algorithm.integrity(&content));
        indexed += 1;
    }

    tracing::info!(dir = %dir.display(), files = indexed, "Asset directory indexed");
    Ok(indexed)
}
