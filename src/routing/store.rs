//! Route rule storage and policy resolution.
//!
//! # Responsibilities
//! - Collect rule fragments per route pattern (config, defaults, hooks)
//! - Apply policy transformers once, then freeze
//! - Resolve a request path to its effective policy
//!
//! # Design Decisions
//! - Immutable after `build()` (shared via `Arc`, no locks on the hot path)
//! - Rules kept sorted least → most specific, so resolution is one ordered fold
//! - Fragments registered twice for the same pattern merge, last writer wins
//! - `/**` always exists and is always merged first

use indexmap::IndexMap;

use crate::config::ShieldConfig;
use crate::policy::defaults::default_policy;
use crate::policy::{Merge, SecurityPolicy};
use crate::routing::matcher::{split_path, PatternError, RoutePattern};

/// A route pattern and the policy fragment attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    pub policy: SecurityPolicy,
}

/// Pure rewrite applied to every rule before the store is frozen.
pub trait PolicyTransformer: Send + Sync {
    fn transform(&self, pattern: &RoutePattern, policy: SecurityPolicy) -> SecurityPolicy;
}

impl<F> PolicyTransformer for F
where
    F: Fn(&RoutePattern, SecurityPolicy) -> SecurityPolicy + Send + Sync,
{
    fn transform(&self, pattern: &RoutePattern, policy: SecurityPolicy) -> SecurityPolicy {
        self(pattern, policy)
    }
}

/// Collects rules before freezing them into a [`RuleStore`].
#[derive(Default)]
pub struct RuleStoreBuilder {
    rules: IndexMap<RoutePattern, SecurityPolicy>,
    transformers: Vec<Box<dyn PolicyTransformer>>,
}

impl RuleStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment for `pattern`, merging with any earlier fragment
    /// for the same pattern.
    pub fn register(&mut self, pattern: &str, fragment: SecurityPolicy) -> Result<&mut Self, PatternError> {
        let pattern = RoutePattern::parse(pattern)?;
        self.register_pattern(pattern, fragment);
        Ok(self)
    }

    pub fn register_pattern(&mut self, pattern: RoutePattern, fragment: SecurityPolicy) -> &mut Self {
        match self.rules.get_mut(&pattern) {
            Some(existing) => existing.merge(&fragment),
            None => {
                self.rules.insert(pattern, fragment);
            }
        }
        self
    }

    /// Append a transformer; transformers run in registration order.
    pub fn transformer<T>(&mut self, transformer: T) -> &mut Self
    where
        T: PolicyTransformer + 'static,
    {
        self.transformers.push(Box::new(transformer));
        self
    }

    pub fn build(self) -> RuleStore {
        let Self {
            mut rules,
            transformers,
        } = self;

        rules.entry(RoutePattern::catch_all()).or_default();

        let mut frozen: Vec<RouteRule> = rules
            .into_iter()
            .map(|(pattern, policy)| {
                let policy = transformers
                    .iter()
                    .fold(policy, |policy, t| t.transform(&pattern, policy));
                RouteRule { pattern, policy }
            })
            .collect();
        frozen.sort_by(|a, b| a.pattern.cmp_specificity(&b.pattern));

        tracing::debug!(rules = frozen.len(), "Rule store frozen");
        RuleStore { rules: frozen }
    }
}

/// Frozen, read-only rule table.
#[derive(Debug, Clone)]
pub struct RuleStore {
    rules: Vec<RouteRule>,
}

impl RuleStore {
    pub fn builder() -> RuleStoreBuilder {
        RuleStoreBuilder::new()
    }

    /// Build the store used by the server: built-in defaults, then the global
    /// `[security]` section on `/**`, then every `[[routes]]` entry.
    pub fn from_config(config: &ShieldConfig) -> Result<Self, PatternError> {
        let mut builder = Self::builder();
        builder.register_pattern(RoutePattern::catch_all(), default_policy());
        builder.register_pattern(RoutePattern::catch_all(), config.security.clone());
        for route in &config.routes {
            builder.register(&route.pattern, route.security.clone())?;
        }
        Ok(builder.build())
    }

    /// Effective policy for a request path.
    pub fn resolve(&self, path: &str) -> SecurityPolicy {
        let segments = split_path(path);
        let mut policy = SecurityPolicy::default();
        for rule in self.matching(&segments) {
            policy.merge(&rule.policy);
        }
        policy
    }

    /// Matching rules, least specific first.
    pub fn matching<'a>(&'a self, segments: &'a [&'a str]) -> impl Iterator<Item = &'a RouteRule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.pattern.matches_segments(segments))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
