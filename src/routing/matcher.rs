//! Route pattern matching.
//!
//! # Responsibilities
//! - Parse route patterns (`/`, `/docs/intro`, `/blog/*`, `/admin/**`)
//! - Match concrete request paths against a pattern
//! - Rank patterns by specificity
//!
//! # Design Decisions
//! - Matching is per path segment, case-sensitive, no regex
//! - `*` matches exactly one segment
//! - A trailing `**` matches the prefix itself and everything below it
//! - Query strings, fragments and repeated or trailing slashes are ignored

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("route pattern `{0}` must start with `/`")]
    MissingLeadingSlash(String),

    #[error("route pattern `{0}` may only use `**` as its last segment")]
    MisplacedCatchAll(String),

    #[error("route pattern `{0}` must not contain a query string or fragment")]
    QueryInPattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutePattern {
    segments: Vec<Segment>,
    catch_all: bool,
}

/// Ordering key: more literal segments first, then exact over catch-all,
/// then deeper patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    literals: usize,
    exact: bool,
    depth: usize,
}

impl RoutePattern {
    /// The pattern every request matches.
    pub fn catch_all() -> Self {
        Self {
            segments: Vec::new(),
            catch_all: true,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(raw.to_string()));
        }
        if trimmed.contains(['?', '#']) {
            return Err(PatternError::QueryInPattern(raw.to_string()));
        }

        let parts: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut catch_all = false;

        for (i, part) in parts.iter().enumerate() {
            match *part {
                "**" if i + 1 == parts.len() => catch_all = true,
                "**" => return Err(PatternError::MisplacedCatchAll(raw.to_string())),
                "*" => segments.push(Segment::Wildcard),
                literal => segments.push(Segment::Literal(literal.to_string())),
            }
        }

        Ok(Self {
            segments,
            catch_all,
        })
    }

    /// Returns true if `path` (query string allowed) matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.matches_segments(&split_path(path))
    }

    pub(crate) fn matches_segments(&self, path: &[&str]) -> bool {
        if self.catch_all {
            if path.len() < self.segments.len() {
                return false;
            }
        } else if path.len() != self.segments.len() {
            return false;
        }

        self.segments
            .iter()
            .zip(path)
            .all(|(segment, part)| match segment {
                Segment::Literal(literal) => literal == part,
                Segment::Wildcard => true,
            })
    }

    pub fn specificity(&self) -> Specificity {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        Specificity {
            literals,
            exact: !self.catch_all,
            depth: self.segments.len(),
        }
    }

    pub fn is_catch_all_root(&self) -> bool {
        self.catch_all && self.segments.is_empty()
    }

    /// Least specific first; ties fall back to the canonical text so the
    /// order never depends on insertion.
    pub fn cmp_specificity(&self, other: &Self) -> Ordering {
        self.specificity()
            .cmp(&other.specificity())
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl FromStr for RoutePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoutePattern {
    /// Canonical form, e.g. `/admin/**`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() && !self.catch_all {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => write!(f, "/{}", literal)?,
                Segment::Wildcard => f.write_str("/*")?,
            }
        }
        if self.catch_all {
            f.write_str("/**")?;
        }
        Ok(())
    }
}

/// Split a request path into segments, dropping query, fragment and empty parts.
pub fn split_path(path: &str) -> Vec<&str> {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path[..end].split('/').filter(|s| !s.is_empty()).collect()
}
