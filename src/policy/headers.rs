//! Managed header keys and their configured values.
//!
//! # Design Decisions
//! - The key set is closed: an unknown key fails deserialization at startup
//! - Plain-string values for CSP, Permissions-Policy and HSTS are lifted into
//!   the structured model while loading, so merging always sees one shape
//! - `false` is kept as an explicit `Disabled` value and survives merging

use std::fmt;

use axum::http::HeaderName;
use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec;
use crate::policy::csp::{CspDirectives, DirectiveValue};
use crate::policy::hsts::StrictTransportSecurity;
use crate::policy::merge::Merge;
use crate::policy::permissions::{PermissionValue, PermissionsPolicy};

/// Every response header the engine knows how to manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeaderKey {
    #[serde(rename = "contentSecurityPolicy")]
    ContentSecurityPolicy,
    #[serde(rename = "crossOriginEmbedderPolicy")]
    CrossOriginEmbedderPolicy,
    #[serde(rename = "crossOriginOpenerPolicy")]
    CrossOriginOpenerPolicy,
    #[serde(rename = "crossOriginResourcePolicy")]
    CrossOriginResourcePolicy,
    #[serde(rename = "originAgentCluster")]
    OriginAgentCluster,
    #[serde(rename = "referrerPolicy")]
    ReferrerPolicy,
    #[serde(rename = "strictTransportSecurity")]
    StrictTransportSecurity,
    #[serde(rename = "xContentTypeOptions")]
    XContentTypeOptions,
    #[serde(rename = "xDNSPrefetchControl")]
    XDnsPrefetchControl,
    #[serde(rename = "xDownloadOptions")]
    XDownloadOptions,
    #[serde(rename = "xFrameOptions")]
    XFrameOptions,
    #[serde(rename = "xPermittedCrossDomainPolicies")]
    XPermittedCrossDomainPolicies,
    #[serde(rename = "xXSSProtection")]
    XXssProtection,
    #[serde(rename = "permissionsPolicy")]
    PermissionsPolicy,
}

impl HeaderKey {
    pub const ALL: [HeaderKey; 14] = [
        HeaderKey::ContentSecurityPolicy,
        HeaderKey::CrossOriginEmbedderPolicy,
        HeaderKey::CrossOriginOpenerPolicy,
        HeaderKey::CrossOriginResourcePolicy,
        HeaderKey::OriginAgentCluster,
        HeaderKey::ReferrerPolicy,
        HeaderKey::StrictTransportSecurity,
        HeaderKey::XContentTypeOptions,
        HeaderKey::XDnsPrefetchControl,
        HeaderKey::XDownloadOptions,
        HeaderKey::XFrameOptions,
        HeaderKey::XPermittedCrossDomainPolicies,
        HeaderKey::XXssProtection,
        HeaderKey::PermissionsPolicy,
    ];

    /// Lowercase wire name of the header.
    pub fn header_name(self) -> &'static str {
        match self {
            HeaderKey::ContentSecurityPolicy => "content-security-policy",
            HeaderKey::CrossOriginEmbedderPolicy => "cross-origin-embedder-policy",
            HeaderKey::CrossOriginOpenerPolicy => "cross-origin-opener-policy",
            HeaderKey::CrossOriginResourcePolicy => "cross-origin-resource-policy",
            HeaderKey::OriginAgentCluster => "origin-agent-cluster",
            HeaderKey::ReferrerPolicy => "referrer-policy",
            HeaderKey::StrictTransportSecurity => "strict-transport-security",
            HeaderKey::XContentTypeOptions => "x-content-type-options",
            HeaderKey::XDnsPrefetchControl => "x-dns-prefetch-control",
            HeaderKey::XDownloadOptions => "x-download-options",
            HeaderKey::XFrameOptions => "x-frame-options",
            HeaderKey::XPermittedCrossDomainPolicies => "x-permitted-cross-domain-policies",
            HeaderKey::XXssProtection => "x-xss-protection",
            HeaderKey::PermissionsPolicy => "permissions-policy",
        }
    }

    pub fn http_name(self) -> HeaderName {
        HeaderName::from_static(self.header_name())
    }

    /// Configuration key (`xXSSProtection` etc.).
    pub fn config_key(self) -> &'static str {
        match self {
            HeaderKey::ContentSecurityPolicy => "contentSecurityPolicy",
            HeaderKey::CrossOriginEmbedderPolicy => "crossOriginEmbedderPolicy",
            HeaderKey::CrossOriginOpenerPolicy => "crossOriginOpenerPolicy",
            HeaderKey::CrossOriginResourcePolicy => "crossOriginResourcePolicy",
            HeaderKey::OriginAgentCluster => "originAgentCluster",
            HeaderKey::ReferrerPolicy => "referrerPolicy",
            HeaderKey::StrictTransportSecurity => "strictTransportSecurity",
            HeaderKey::XContentTypeOptions => "xContentTypeOptions",
            HeaderKey::XDnsPrefetchControl => "xDNSPrefetchControl",
            HeaderKey::XDownloadOptions => "xDownloadOptions",
            HeaderKey::XFrameOptions => "xFrameOptions",
            HeaderKey::XPermittedCrossDomainPolicies => "xPermittedCrossDomainPolicies",
            HeaderKey::XXssProtection => "xXSSProtection",
            HeaderKey::PermissionsPolicy => "permissionsPolicy",
        }
    }

    /// Whether the key has a structured (non-opaque) representation.
    pub fn is_structured(self) -> bool {
        matches!(
            self,
            HeaderKey::ContentSecurityPolicy
                | HeaderKey::PermissionsPolicy
                | HeaderKey::StrictTransportSecurity
        )
    }
}

impl fmt::Display for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Configured value of one managed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyValue {
    /// Explicit `false`: the header is removed from the response.
    Disabled,
    /// Verbatim header value.
    Text(String),
    Csp(CspDirectives),
    Permissions(PermissionsPolicy),
    Hsts(StrictTransportSecurity),
}

impl Merge for PolicyValue {
    fn merge(&mut self, upper: &Self) {
        match (self, upper) {
            (PolicyValue::Csp(lower), PolicyValue::Csp(upper)) => lower.merge(upper),
            (PolicyValue::Permissions(lower), PolicyValue::Permissions(upper)) => {
                lower.merge(upper)
            }
            (PolicyValue::Hsts(lower), PolicyValue::Hsts(upper)) => lower.merge(upper),
            (slot, upper) => *slot = upper.clone(),
        }
    }
}

impl Serialize for PolicyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PolicyValue::Disabled => serializer.serialize_bool(false),
            PolicyValue::Text(text) => serializer.serialize_str(text),
            PolicyValue::Csp(csp) => csp.serialize(serializer),
            PolicyValue::Permissions(permissions) => permissions.serialize(serializer),
            PolicyValue::Hsts(hsts) => hsts.serialize(serializer),
        }
    }
}

/// Shape of a header value as written in a config file, before the key is known.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSetting {
    Flag(bool),
    Text(String),
    Table(IndexMap<String, RawEntry>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Flag(bool),
    Number(u64),
    Text(String),
    List(Vec<String>),
}

impl PolicyValue {
    fn from_raw(key: HeaderKey, raw: RawSetting) -> Result<Self, String> {
        match raw {
            RawSetting::Flag(false) => Ok(PolicyValue::Disabled),
            RawSetting::Flag(true) => Err(format!(
                "`{}` must be a header value or `false`, not `true`",
                key
            )),
            RawSetting::Text(text) if key.is_structured() => {
                codec::decode(key, &text).map_err(|e| format!("`{}`: {}", key, e))
            }
            RawSetting::Text(text) => Ok(PolicyValue::Text(text)),
            RawSetting::Table(table) => match key {
                HeaderKey::ContentSecurityPolicy => csp_from_table(table).map(PolicyValue::Csp),
                HeaderKey::PermissionsPolicy => {
                    permissions_from_table(table).map(PolicyValue::Permissions)
                }
                HeaderKey::StrictTransportSecurity => hsts_from_table(table).map(PolicyValue::Hsts),
                other => Err(format!("`{}` only accepts a string or `false`", other)),
            },
        }
    }
}

fn csp_from_table(table: IndexMap<String, RawEntry>) -> Result<CspDirectives, String> {
    let mut csp = CspDirectives::new();
    for (name, entry) in table {
        let value = match entry {
            RawEntry::Flag(flag) => DirectiveValue::Flag(flag),
            RawEntry::List(sources) => DirectiveValue::sources(sources),
            RawEntry::Text(text) => DirectiveValue::sources(text.split_whitespace()),
            RawEntry::Number(_) => {
                return Err(format!("CSP directive `{}` cannot be a number", name));
            }
        };
        csp.insert(&name, value);
    }
    Ok(csp)
}

fn permissions_from_table(table: IndexMap<String, RawEntry>) -> Result<PermissionsPolicy, String> {
    let mut policy = PermissionsPolicy::new();
    for (feature, entry) in table {
        let value = match entry {
            RawEntry::List(list) => PermissionValue::Allowlist(list),
            RawEntry::Text(text) => PermissionValue::Token(text),
            _ => {
                return Err(format!(
                    "Permissions-Policy feature `{}` must be a list or a string",
                    feature
                ));
            }
        };
        policy.insert(&feature, value);
    }
    Ok(policy)
}

fn hsts_from_table(table: IndexMap<String, RawEntry>) -> Result<StrictTransportSecurity, String> {
    let mut hsts = StrictTransportSecurity::default();
    for (field, entry) in table {
        match (field.as_str(), entry) {
            ("maxAge", RawEntry::Number(n)) => hsts.max_age = Some(n),
            ("includeSubdomains", RawEntry::Flag(b)) => hsts.include_subdomains = Some(b),
            ("preload", RawEntry::Flag(b)) => hsts.preload = Some(b),
            (other, _) => return Err(format!("invalid HSTS field `{}`", other)),
        }
    }
    Ok(hsts)
}

/// Ordered map of managed headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderPolicies(IndexMap<HeaderKey, PolicyValue>);

impl HeaderPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: HeaderKey, value: PolicyValue) -> Self {
        self.0.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: HeaderKey, value: PolicyValue) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: HeaderKey) -> Option<&PolicyValue> {
        self.0.get(&key)
    }

    pub fn get_mut(&mut self, key: HeaderKey) -> Option<&mut PolicyValue> {
        self.0.get_mut(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderKey, &PolicyValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Structured CSP, if one is configured and not disabled.
    pub fn csp(&self) -> Option<&CspDirectives> {
        match self.get(HeaderKey::ContentSecurityPolicy) {
            Some(PolicyValue::Csp(csp)) => Some(csp),
            _ => None,
        }
    }
}

impl Merge for HeaderPolicies {
    fn merge(&mut self, upper: &Self) {
        self.0.merge(&upper.0);
    }
}

impl Serialize for HeaderPolicies {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HeaderPolicies {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeaderPoliciesVisitor;

        impl<'de> Visitor<'de> for HeaderPoliciesVisitor {
            type Value = HeaderPolicies;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of security header settings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut headers = HeaderPolicies::new();
                while let Some(key) = access.next_key::<HeaderKey>()? {
                    let raw = access.next_value::<RawSetting>()?;
                    let value = PolicyValue::from_raw(key, raw).map_err(de::Error::custom)?;
                    headers.insert(key, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeaderPoliciesVisitor)
    }
}
