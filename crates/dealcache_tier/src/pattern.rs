// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt, str::FromStr};

/// The wildcard character accepted in key patterns.
const WILDCARD: char = '*';

/// Characters with special meaning in Redis `MATCH` globs.
const GLOB_SPECIALS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// A key pattern with at most one `*` wildcard.
///
/// `*` matches any run of characters, including an empty one. A pattern without a
/// wildcard matches exactly one key. Every other character is literal.
///
/// # Examples
///
/// ```
/// use dealcache_tier::KeyPattern;
///
/// let pattern = KeyPattern::parse("deals:product:*").unwrap();
/// assert!(pattern.matches("deals:product:42"));
/// assert!(!pattern.matches("deals:search:42"));
///
/// assert!(KeyPattern::parse("a:*:b:*").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    raw: String,
    split: Option<usize>,
}

/// Error returned for a pattern that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PatternError {
    /// The pattern holds more than one `*`.
    #[error("pattern `{pattern}` contains {count} wildcards, at most one is supported")]
    TooManyWildcards {
        /// The rejected pattern.
        pattern: String,
        /// Number of wildcards found.
        count: usize,
    },
}

impl KeyPattern {
    /// Parses a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::TooManyWildcards`] when the pattern contains more than one `*`.
    pub fn parse(pattern: impl Into<String>) -> Result<Self, PatternError> {
        let raw = pattern.into();
        let count = raw.matches(WILDCARD).count();
        if count > 1 {
            return Err(PatternError::TooManyWildcards { pattern: raw, count });
        }
        let split = raw.find(WILDCARD);
        Ok(Self { raw, split })
    }

    /// Creates a pattern matching exactly one key.
    ///
    /// A `*` inside `key` is matched literally.
    #[must_use]
    pub fn exact(key: impl Into<String>) -> Self {
        Self {
            raw: key.into(),
            split: None,
        }
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` when the pattern has no wildcard.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.split.is_none()
    }

    /// The literal text before the wildcard, or the whole pattern when exact.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.split.map_or(self.raw.as_str(), |at| &self.raw[..at])
    }

    /// The literal text after the wildcard, empty when exact.
    #[must_use]
    pub fn suffix(&self) -> &str {
        self.split.map_or("", |at| &self.raw[at + WILDCARD.len_utf8()..])
    }

    /// Tests a key against the pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        if self.split.is_none() {
            return key == self.raw;
        }
        let (prefix, suffix) = (self.prefix(), self.suffix());
        key.len() >= prefix.len() + suffix.len() && key.starts_with(prefix) && key.ends_with(suffix)
    }

    /// Renders the pattern as a Redis `MATCH` glob below `namespace`.
    ///
    /// Literal text is escaped so that only the single wildcard keeps its meaning.
    #[must_use]
    pub fn to_redis_glob(&self, namespace: &str) -> String {
        let mut glob = String::with_capacity(namespace.len() + self.raw.len() + 4);
        push_escaped(&mut glob, namespace);
        push_escaped(&mut glob, self.prefix());
        if self.split.is_some() {
            glob.push(WILDCARD);
            push_escaped(&mut glob, self.suffix());
        }
        glob
    }
}

fn push_escaped(out: &mut String, literal: &str) {
    for c in literal.chars() {
        if GLOB_SPECIALS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

impl FromStr for KeyPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
