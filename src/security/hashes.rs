//! CSP hash sources for pre-rendered pages.
//!
//! Static output cannot carry a per-visitor nonce, so inline scripts and
//! styles are allow-listed by content hash instead, and external resources
//! that already carry an `integrity` attribute are allow-listed by reusing
//! that hash.

use indexmap::IndexSet;

use crate::integrity::HashAlgorithm;
use crate::markup::{Document, Element};
use crate::policy::{CspDirectives, SsgOptions};

/// Directives that are ignored (or forbidden) in a `<meta>` delivered CSP.
const META_IGNORED_DIRECTIVES: &[&str] = &["frame-ancestors"];

/// Hash sources collected from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CspHashes {
    pub scripts: IndexSet<String>,
    pub styles: IndexSet<String>,
}

impl CspHashes {
    pub fn collect(document: &Document, options: &SsgOptions) -> Self {
        let mut hashes = Self::default();
        for element in document.elements() {
            hashes.record(element, options);
        }
        hashes
    }

    fn record(&mut self, element: &Element, options: &SsgOptions) {
        match element.name() {
            "script" if options.hash_scripts() => {
                if element.is_inline() {
                    if let Some(content) = element.content().filter(|c| !c.is_empty()) {
                        self.scripts.insert(content_hash(content));
                    }
                } else {
                    self.scripts.extend(integrity_sources(element));
                }
            }
            "style" if options.hash_styles() => {
                if let Some(content) = element.content().filter(|c| !c.is_empty()) {
                    self.styles.insert(content_hash(content));
                }
            }
            "link" => match link_destination(element) {
                Some(Destination::Script) if options.hash_scripts() => {
                    self.scripts.extend(integrity_sources(element));
                }
                Some(Destination::Style) if options.hash_styles() => {
                    self.styles.extend(integrity_sources(element));
                }
                _ => {}
            },
            _ => {}
        }
    }

    pub fn extend(&mut self, other: CspHashes) {
        self.scripts.extend(other.scripts);
        self.styles.extend(other.styles);
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.styles.is_empty()
    }

    /// Add the collected sources to `script-src` / `style-src`.
    pub fn apply(&self, csp: &mut CspDirectives) {
        if !self.scripts.is_empty() {
            csp.add_sources("script-src", self.scripts.iter().cloned());
        }
        if !self.styles.is_empty() {
            csp.add_sources("style-src", self.styles.iter().cloned());
        }
    }
}

enum Destination {
    Script,
    Style,
}

fn link_destination(element: &Element) -> Option<Destination> {
    if element.has_rel("modulepreload") {
        return Some(Destination::Script);
    }
    if element.has_rel("stylesheet") {
        return Some(Destination::Style);
    }
    if element.has_rel("preload") {
        return match element.attr("as").map(str::to_ascii_lowercase).as_deref() {
            Some("script") => Some(Destination::Script),
            Some("style") => Some(Destination::Style),
            _ => None,
        };
    }
    None
}

/// `'sha256-...'` source for inline content.
fn content_hash(content: &str) -> String {
    format!("'{}'", HashAlgorithm::Sha256.integrity(content.as_bytes()))
}

/// CSP sources for the hashes of an `integrity` attribute.
fn integrity_sources(element: &Element) -> Vec<String> {
    element
        .attr("integrity")
        .map(|integrity| {
            integrity
                .split_whitespace()
                .filter(|token| {
                    token
                        .split_once('-')
                        .and_then(|(alg, _)| HashAlgorithm::from_name(alg))
                        .is_some()
                })
                .map(|token| format!("'{}'", token))
                .collect()
        })
        .unwrap_or_default()
}

/// Copy of `csp` suitable for a `<meta http-equiv>` tag.
pub fn meta_policy(csp: &CspDirectives) -> CspDirectives {
    let mut meta = csp.clone();
    for directive in META_IGNORED_DIRECTIVES {
        meta.remove(directive);
    }
    meta
}

/// `<meta http-equiv="Content-Security-Policy" content="...">`.
pub fn meta_element(header_value: &str) -> Element {
    Element::new("meta")
        .with_attr("http-equiv", "Content-Security-Policy")
        .with_attr("content", header_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::policy::DirectiveValue;

    fn options(hash_styles: bool) -> SsgOptions {
        SsgOptions {
            hash_styles: Some(hash_styles),
            ..Default::default()
        }
    }

    #[test]
    fn test_inline_script_hash() {
        let doc = Document::parse("<head></head><body><script>alert('Hello, world.');</script></body>");
        let hashes = CspHashes::collect(&doc, &options(false));
        let expected = format!("'{}'", HashAlgorithm::Sha256.integrity(b"alert('Hello, world.');"));
        assert_eq!(hashes.scripts.iter().collect::<Vec<_>>(), vec![&expected]);
        assert!(hashes.styles.is_empty());
    }

    #[test]
    fn test_integrity_reused_by_destination() {
        let doc = Document::parse(concat!(
            r#"<script src="/a.js" integrity="sha384-AAA"></script>"#,
            r#"<link rel="modulepreload" href="/b.js" integrity="sha384-BBB">"#,
            r#"<link rel="preload" as="style" href="/c.css" integrity="sha384-CCC">"#,
            r#"<link rel="stylesheet" href="/d.css" integrity="sha384-DDD">"#,
            r#"<link rel="preload" as="font" href="/e.woff2" integrity="sha384-EEE">"#,
        ));

        let hashes = CspHashes::collect(&doc, &options(true));
        assert_eq!(
            hashes.scripts.iter().cloned().collect::<Vec<_>>(),
            vec!["'sha384-AAA'", "'sha384-BBB'"]
        );
        assert_eq!(
            hashes.styles.iter().cloned().collect::<Vec<_>>(),
            vec!["'sha384-CCC'", "'sha384-DDD'"]
        );

        let without_styles = CspHashes::collect(&doc, &options(false));
        assert!(without_styles.styles.is_empty());
    }

    #[test]
    fn test_apply_appends_sources() {
        let mut csp = CspDirectives::new().with("script-src", DirectiveValue::sources(["'self'"]));
        let mut hashes = CspHashes::default();
        hashes.scripts.insert("'sha256-x'".into());
        hashes.styles.insert("'sha256-y'".into());
        hashes.apply(&mut csp);

        assert_eq!(
            codec::csp::encode(&csp),
            "script-src 'self' 'sha256-x'; style-src 'sha256-y'"
        );
    }

    #[test]
    fn test_meta_policy_drops_frame_ancestors() {
        let csp = CspDirectives::new()
            .with("frame-ancestors", DirectiveValue::sources(["'self'"]))
            .with("img-src", DirectiveValue::sources(["'self'"]));
        let meta = meta_policy(&csp);
        assert!(!meta.contains("frame-ancestors"));
        assert!(meta.contains("img-src"));
        assert!(csp.contains("frame-ancestors"));
    }

    #[test]
    fn test_meta_element() {
        assert_eq!(
            meta_element("img-src 'self'").render(),
            r#"<meta http-equiv="Content-Security-Policy" content="img-src 'self'">"#
        );
    }
}
