//! Namespaced cache keys and invalidation patterns.
//!
//! Every key the cache manages carries the namespace prefix. The prefix is
//! what separates cache entries from unrelated data sharing the same durable
//! medium, and what makes bulk and pattern eviction possible.

use std::fmt;

/// Wildcard character accepted in invalidation patterns.
const WILDCARD: char = '*';

/// A cache key: namespace prefix followed by a caller-supplied logical name.
///
/// # Design
///
/// The inner fields are private, so a `CacheKey` can only come from `new()`
/// or `parse()`. Both guarantee the stored string starts with the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Full namespaced key as written to the tiers.
    full: String,
    /// Byte length of the namespace prefix inside `full`.
    prefix_len: usize,
}

impl CacheKey {
    /// Create a key for `name` under `namespace`.
    pub fn new(namespace: &str, name: &str) -> Self {
        let mut full = String::with_capacity(namespace.len() + name.len());
        full.push_str(namespace);
        full.push_str(name);
        Self {
            full,
            prefix_len: namespace.len(),
        }
    }

    /// Recover a key from a raw medium key.
    ///
    /// Returns `None` if `raw` does not carry the namespace prefix.
    pub fn parse(namespace: &str, raw: &str) -> Option<Self> {
        if raw.starts_with(namespace) {
            Some(Self {
                full: raw.to_string(),
                prefix_len: namespace.len(),
            })
        } else {
            None
        }
    }

    /// The full namespaced key.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The namespace prefix.
    pub fn namespace(&self) -> &str {
        &self.full[..self.prefix_len]
    }

    /// The logical name, with the namespace stripped.
    pub fn logical(&self) -> &str {
        &self.full[self.prefix_len..]
    }

    /// Consume the key, returning the full namespaced string.
    pub fn into_string(self) -> String {
        self.full
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

/// Invalidation pattern matched against logical (unprefixed) names.
///
/// Matching is substring based. A `*` splits the pattern into segments that
/// must all appear in the logical name, in order. `"user:*"` therefore
/// matches `user:1` and `account/user:7`, while `"user"` matches anything
/// containing `user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    raw: String,
    segments: Vec<String>,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split(WILDCARD)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    /// The pattern as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern places no constraint on the name.
    pub fn matches_everything(&self) -> bool {
        self.segments.is_empty()
    }

    /// Test a logical name against the pattern.
    pub fn matches(&self, logical: &str) -> bool {
        let mut rest = logical;
        for segment in &self.segments {
            match rest.find(segment.as_str()) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
        true
    }

    /// Test a key against the pattern using its logical part.
    pub fn matches_key(&self, key: &CacheKey) -> bool {
        self.matches(key.logical())
    }
}

impl From<&str> for KeyPattern {
    fn from(pattern: &str) -> Self {
        Self::new(pattern)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
