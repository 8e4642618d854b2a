//! Restricted path globs for archive entry filtering.
//!
//! Only three constructs are recognised: literal characters, `*` (any run of
//! characters inside one path segment) and `**` (any run of characters,
//! separators included). Patterns are anchored at the archive root and must
//! match the whole path.

use modforge_common::ForgeError;
use regex::{Regex, RegexSet};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Translate a glob into an anchored regular expression source.
///
/// Every non-wildcard character is escaped, so user input can never inject
/// regex syntax.
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 4);
    out.push_str("^/");
    let mut chars = pattern.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                out.push_str(".*");
            } else {
                out.push_str("[^/]*");
            }
        } else {
            out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        }
    }
    out.push('$');
    out
}

/// Normalize an archive path so it starts with the root separator.
fn rooted(path: &str) -> Cow<'_, str> {
    if path.starts_with('/') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("/{path}"))
    }
}

/// A single compiled glob
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: String,
    regex: Regex,
}

impl GlobMatcher {
    pub fn compile(pattern: &str) -> Result<Self, ForgeError> {
        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| ForgeError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Whether `path` (with or without its leading `/`) matches this glob
    pub fn test(&self, path: &str) -> bool {
        self.regex.is_match(&rooted(path))
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn regex_source(&self) -> &str {
        self.regex.as_str()
    }
}

/// An unordered set of globs evaluated as "any of".
///
/// An empty set matches every path.
#[derive(Debug, Clone)]
pub struct FilterSet {
    matchers: Vec<GlobMatcher>,
    set: RegexSet,
}

impl FilterSet {
    /// Compile a set of patterns. Duplicates collapse; order is irrelevant.
    pub fn new<I, S>(patterns: I) -> Result<Self, ForgeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique = BTreeMap::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if !unique.contains_key(pattern) {
                unique.insert(pattern.to_string(), GlobMatcher::compile(pattern)?);
            }
        }
        let matchers: Vec<GlobMatcher> = unique.into_values().collect();
        let set = RegexSet::new(matchers.iter().map(GlobMatcher::regex_source)).map_err(|e| {
            ForgeError::InvalidPattern {
                pattern: matchers
                    .iter()
                    .map(GlobMatcher::pattern)
                    .collect::<Vec<_>>()
                    .join(", "),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { matchers, set })
    }

    /// The match-everything set
    pub fn all() -> Self {
        Self {
            matchers: Vec::new(),
            set: RegexSet::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.is_empty() || self.set.is_match(&rooted(path))
    }

    /// Patterns in the set, sorted
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(GlobMatcher::pattern)
    }
}

impl Default for FilterSet {
    fn default() -> Self {
        Self::all()
    }
}
