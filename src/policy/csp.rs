//! Structured Content-Security-Policy directives.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::policy::merge::Merge;

/// Directives that carry no source list and render as their bare name.
pub const FLAG_DIRECTIVES: &[&str] = &["upgrade-insecure-requests", "block-all-mixed-content"];

/// Source list of a directive: a set that keeps insertion order.
pub type SourceList = IndexSet<String>;

/// Value of a single CSP directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectiveValue {
    /// `true` renders the bare directive name, `false` omits it.
    Flag(bool),
    Sources(SourceList),
}

impl DirectiveValue {
    /// Build a source list from string-like items, dropping duplicates.
    pub fn sources<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DirectiveValue::Sources(items.into_iter().map(Into::into).collect())
    }
}

impl Merge for DirectiveValue {
    fn merge(&mut self, upper: &Self) {
        *self = upper.clone();
    }
}

/// Ordered directive map, e.g. `script-src -> ['self' https:]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CspDirectives(IndexMap<String, DirectiveValue>);

impl CspDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: DirectiveValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a directive. Names are case-insensitive.
    pub fn insert(&mut self, name: &str, value: DirectiveValue) {
        self.0.insert(name.to_ascii_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<&DirectiveValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<DirectiveValue> {
        self.0.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DirectiveValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append sources to a directive, creating it when missing.
    ///
    /// A flag-valued directive is turned into a source list.
    pub fn add_sources<I>(&mut self, name: &str, sources: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entry = self
            .0
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| DirectiveValue::Sources(SourceList::new()));
        if matches!(entry, DirectiveValue::Flag(_)) {
            *entry = DirectiveValue::Sources(SourceList::new());
        }
        if let DirectiveValue::Sources(list) = entry {
            list.extend(sources);
        }
    }

    /// Remove every source matching the predicate from every directive.
    pub fn retain_sources<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        for value in self.0.values_mut() {
            if let DirectiveValue::Sources(list) = value {
                list.retain(|source| keep(source.as_str()));
            }
        }
    }
}

impl Merge for CspDirectives {
    fn merge(&mut self, upper: &Self) {
        self.0.merge(&upper.0);
    }
}

impl FromIterator<(String, DirectiveValue)> for CspDirectives {
    fn from_iter<T: IntoIterator<Item = (String, DirectiveValue)>>(iter: T) -> Self {
        let mut directives = CspDirectives::new();
        for (name, value) in iter {
            directives.insert(&name, value);
        }
        directives
    }
}
