//! Per-request nonces.
//!
//! # Responsibilities
//! - Generate the nonce for a request (or read it back from the cookie in
//!   `check` mode)
//! - Substitute `{{nonce}}` placeholders in an encoded CSP header
//! - Stamp `nonce` attributes onto script, style and link elements
//!
//! # Design Decisions
//! - 24 bytes from the OS RNG, base64 encoded (32 characters)
//! - Substitution works on CSP source tokens, never on raw substrings, so
//!   stripping a placeholder cannot corrupt neighbouring sources
//! - Pre-rendered pages never receive nonce attributes

use axum::http::{header, HeaderMap, HeaderValue};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::markup::Document;

/// Token substituted with the request nonce.
pub const NONCE_PLACEHOLDER: &str = "{{nonce}}";

const NONCE_BYTES: usize = 24;

/// Elements that receive a `nonce` attribute.
const NONCE_ELEMENTS: &[&str] = &["script", "style", "link"];

/// A base64 encoded per-request nonce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(BASE64.encode(bytes))
    }

    /// Accept a nonce produced by an earlier request (cookie value).
    /// Anything that is not a plausible base64 nonce is rejected.
    pub fn from_existing(value: &str) -> Option<Self> {
        let value = value.trim();
        let plausible = value.len() >= 24
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
        plausible.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of the nonce inside one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceState {
    Unset,
    Generated,
    Consumed,
}

/// What to do with `{{nonce}}` placeholders in a CSP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceSubstitution<'a> {
    /// Replace the placeholder with the request nonce.
    Substitute(&'a Nonce),
    /// Nonces disabled: drop placeholder and `'nonce-...'` sources.
    Strip,
    /// Drop placeholder sources only; concrete nonces are kept.
    StripPlaceholder,
    /// Pre-rendered output: leave the placeholder for the edge to fill in.
    KeepPlaceholder,
}

/// Apply `substitution` to an encoded CSP header value.
pub fn apply_to_csp(header: &str, substitution: NonceSubstitution<'_>) -> String {
    if let NonceSubstitution::KeepPlaceholder = substitution {
        return header.to_string();
    }

    header
        .split(';')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .map(|directive| {
            let tokens: Vec<String> = directive
                .split_whitespace()
                .filter_map(|token| match substitution {
                    NonceSubstitution::Substitute(nonce) => {
                        Some(token.replace(NONCE_PLACEHOLDER, nonce.as_str()))
                    }
                    NonceSubstitution::StripPlaceholder if token.contains(NONCE_PLACEHOLDER) => None,
                    NonceSubstitution::StripPlaceholder => Some(token.to_string()),
                    _ if is_nonce_token(token) => None,
                    _ => Some(token.to_string()),
                })
                .collect();
            tokens.join(" ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// True for sources that only make sense with a nonce.
fn is_nonce_token(token: &str) -> bool {
    token.contains(NONCE_PLACEHOLDER) || token.starts_with("'nonce-")
}

/// Add the nonce to every script, style and link element that lacks one.
/// Placeholder values already present in the markup are filled in as well.
/// Returns the number of elements changed.
pub fn inject_markup(document: &mut Document, nonce: &Nonce) -> usize {
    let mut changed = 0;
    for element in document.elements_mut() {
        if !NONCE_ELEMENTS.contains(&element.name()) {
            continue;
        }
        let value = match element.attr("nonce") {
            None => nonce.as_str().to_string(),
            Some(existing) if existing.contains(NONCE_PLACEHOLDER) => {
                existing.replace(NONCE_PLACEHOLDER, nonce.as_str())
            }
            Some(_) => continue,
        };
        element.set_attr("nonce", &value);
        changed += 1;
    }
    changed
}

/// Nonce carried by the request's cookie, if any (`check` mode).
pub fn nonce_from_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<Nonce> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| Nonce::from_existing(value))
}

/// `Set-Cookie` value persisting the nonce for follow-up dispatches.
pub fn nonce_cookie(cookie_name: &str, nonce: &Nonce) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; Secure; SameSite=Strict",
        cookie_name, nonce
    ))
    .ok()
}
