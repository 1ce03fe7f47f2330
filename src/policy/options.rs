//! Non-header policy options: nonce, rate limiting, request guards, SSG.
//!
//! Every option struct keeps its fields optional so a route rule can override
//! a single field; accessors supply the defaults.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::policy::merge::Merge;

/// A feature that is either switched off (`false`) or enabled with options.
///
/// `true` in a config file enables the feature with inherited options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle<T> {
    Off,
    On(T),
}

impl<T> Toggle<T> {
    pub fn enabled(&self) -> Option<&T> {
        match self {
            Toggle::Off => None,
            Toggle::On(options) => Some(options),
        }
    }
}

impl<T: Merge + Clone> Merge for Toggle<T> {
    fn merge(&mut self, upper: &Self) {
        match (self, upper) {
            (slot, Toggle::Off) => *slot = Toggle::Off,
            (Toggle::On(lower), Toggle::On(upper)) => lower.merge(upper),
            (slot, upper) => *slot = upper.clone(),
        }
    }
}

impl<'de, T> Deserialize<'de> for Toggle<T>
where
    T: Deserialize<'de> + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Flag(bool),
            Options(T),
        }

        Ok(match Raw::<T>::deserialize(deserializer)? {
            Raw::Flag(false) => Toggle::Off,
            Raw::Flag(true) => Toggle::On(T::default()),
            Raw::Options(options) => Toggle::On(options),
        })
    }
}

impl<T: Serialize> Serialize for Toggle<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Toggle::Off => serializer.serialize_bool(false),
            Toggle::On(options) => options.serialize(serializer),
        }
    }
}

/// How a request obtains its nonce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceMode {
    /// Fresh nonce per top-level request.
    #[default]
    Renew,
    /// Reuse the nonce carried by the request cookie when present.
    Check,
}

impl Merge for NonceMode {
    fn merge(&mut self, upper: &Self) {
        *self = *upper;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NonceOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<NonceMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_name: Option<String>,
}

impl NonceOptions {
    pub fn mode(&self) -> NonceMode {
        self.mode.unwrap_or_default()
    }

    pub fn cookie_name(&self) -> &str {
        self.cookie_name.as_deref().unwrap_or("__shield_nonce")
    }
}

impl Merge for NonceOptions {
    fn merge(&mut self, upper: &Self) {
        self.mode.merge(&upper.mode);
        self.cookie_name.merge(&upper.cookie_name);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimiterOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    /// Expose `x-ratelimit-*` headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throw_error: Option<bool>,
    /// Client keys that are never limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<String>>,
}

impl RateLimiterOptions {
    pub fn tokens_per_interval(&self) -> u32 {
        self.tokens_per_interval.unwrap_or(150)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.unwrap_or(300_000)
    }

    pub fn headers(&self) -> bool {
        self.headers.unwrap_or(false)
    }

    pub fn throw_error(&self) -> bool {
        self.throw_error.unwrap_or(true)
    }

    pub fn whitelist(&self) -> &[String] {
        self.whitelist.as_deref().unwrap_or_default()
    }
}

impl Merge for RateLimiterOptions {
    fn merge(&mut self, upper: &Self) {
        self.tokens_per_interval.merge(&upper.tokens_per_interval);
        self.interval_ms.merge(&upper.interval_ms);
        self.headers.merge(&upper.headers);
        self.throw_error.merge(&upper.throw_error);
        self.whitelist.merge(&upper.whitelist);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestSizeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_request_size_in_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_file_request_in_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throw_error: Option<bool>,
}

impl RequestSizeOptions {
    pub fn max_request_size_in_bytes(&self) -> u64 {
        self.max_request_size_in_bytes.unwrap_or(2_000_000)
    }

    pub fn max_upload_file_request_in_bytes(&self) -> u64 {
        self.max_upload_file_request_in_bytes.unwrap_or(8_000_000)
    }

    pub fn throw_error(&self) -> bool {
        self.throw_error.unwrap_or(true)
    }
}

impl Merge for RequestSizeOptions {
    fn merge(&mut self, upper: &Self) {
        self.max_request_size_in_bytes.merge(&upper.max_request_size_in_bytes);
        self.max_upload_file_request_in_bytes
            .merge(&upper.max_upload_file_request_in_bytes);
        self.throw_error.merge(&upper.throw_error);
    }
}

/// Shared shape of the method-scoped guards (xss validator, method restricter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MethodGuardOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throw_error: Option<bool>,
}

impl MethodGuardOptions {
    /// Methods the guard applies to (xss) or allows (restricter).
    /// `None` means every method.
    pub fn methods(&self) -> Option<&[String]> {
        self.methods.as_deref()
    }

    pub fn covers(&self, method: &str) -> bool {
        match self.methods() {
            Some(methods) => methods
                .iter()
                .any(|m| m == "*" || m.eq_ignore_ascii_case(method)),
            None => true,
        }
    }

    pub fn throw_error(&self) -> bool {
        self.throw_error.unwrap_or(true)
    }
}

impl Merge for MethodGuardOptions {
    fn merge(&mut self, upper: &Self) {
        self.methods.merge(&upper.methods);
        self.throw_error.merge(&upper.throw_error);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BasicAuthOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throw_error: Option<bool>,
}

impl BasicAuthOptions {
    pub fn realm(&self) -> &str {
        self.realm.as_deref().unwrap_or("Restricted")
    }

    pub fn throw_error(&self) -> bool {
        self.throw_error.unwrap_or(true)
    }
}

impl Merge for BasicAuthOptions {
    fn merge(&mut self, upper: &Self) {
        self.name.merge(&upper.name);
        self.pass.merge(&upper.pass);
        self.realm.merge(&upper.realm);
        self.throw_error.merge(&upper.throw_error);
    }
}

/// Static-generation (pre-rendered) output options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SsgOptions {
    /// Deliver the CSP in a `<meta http-equiv>` tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_scripts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_styles: Option<bool>,
    /// Keep the `{{nonce}}` placeholder for an edge layer to fill in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<bool>,
}

impl SsgOptions {
    pub fn meta(&self) -> bool {
        self.meta.unwrap_or(true)
    }

    pub fn hash_scripts(&self) -> bool {
        self.hash_scripts.unwrap_or(true)
    }

    pub fn hash_styles(&self) -> bool {
        self.hash_styles.unwrap_or(false)
    }

    pub fn nonce(&self) -> bool {
        self.nonce.unwrap_or(true)
    }
}

impl Merge for SsgOptions {
    fn merge(&mut self, upper: &Self) {
        self.meta.merge(&upper.meta);
        self.hash_scripts.merge(&upper.hash_scripts);
        self.hash_styles.merge(&upper.hash_styles);
        self.nonce.merge(&upper.nonce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        limiter: Toggle<RateLimiterOptions>,
    }

    #[test]
    fn test_toggle_parse() {
        let off: Wrapper = toml::from_str("limiter = false").unwrap();
        assert_eq!(off.limiter, Toggle::Off);

        let on: Wrapper = toml::from_str("limiter = true").unwrap();
        assert_eq!(on.limiter, Toggle::On(RateLimiterOptions::default()));

        let table: Wrapper = toml::from_str("[limiter]\ntokens_per_interval = 3").unwrap();
        assert_eq!(table.limiter.enabled().unwrap().tokens_per_interval(), 3);
    }

    #[test]
    fn test_toggle_merge() {
        let mut lower = Toggle::On(RateLimiterOptions {
            tokens_per_interval: Some(10),
            interval_ms: Some(1000),
            ..Default::default()
        });
        lower.merge(&Toggle::On(RateLimiterOptions {
            interval_ms: Some(50),
            ..Default::default()
        }));
        let merged = lower.enabled().unwrap();
        assert_eq!(merged.tokens_per_interval(), 10);
        assert_eq!(merged.interval_ms(), 50);

        lower.merge(&Toggle::Off);
        assert_eq!(lower, Toggle::Off);
    }

    #[test]
    fn test_method_guard_covers() {
        let options = MethodGuardOptions {
            methods: Some(vec!["GET".into(), "post".into()]),
            throw_error: None,
        };
        assert!(options.covers("GET"));
        assert!(options.covers("POST"));
        assert!(!options.covers("DELETE"));
        assert!(MethodGuardOptions::default().covers("DELETE"));
    }
}
