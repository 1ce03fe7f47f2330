//! Structured Permissions-Policy.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::policy::merge::Merge;

/// Value of a single Permissions-Policy feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionValue {
    /// `feature=(self "https://a.example")`; an empty list denies the feature.
    Allowlist(Vec<String>),
    /// `feature=*` style verbatim value.
    Token(String),
}

impl Merge for PermissionValue {
    fn merge(&mut self, upper: &Self) {
        *self = upper.clone();
    }
}

/// Ordered feature map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionsPolicy(IndexMap<String, PermissionValue>);

impl PermissionsPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: &str, value: PermissionValue) -> Self {
        self.insert(feature, value);
        self
    }

    pub fn insert(&mut self, feature: &str, value: PermissionValue) {
        self.0.insert(feature.to_ascii_lowercase(), value);
    }

    pub fn get(&self, feature: &str) -> Option<&PermissionValue> {
        self.0.get(feature)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PermissionValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Merge for PermissionsPolicy {
    fn merge(&mut self, upper: &Self) {
        self.0.merge(&upper.0);
    }
}

/// Deny-all helper: `feature=()`.
pub fn deny() -> PermissionValue {
    PermissionValue::Allowlist(Vec::new())
}
