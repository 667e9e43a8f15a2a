use std::fmt;

/// A path-like filter matched against an envelope's `uri`.
///
/// A trailing `*` marks a wildcard stem; the bare `*` matches everything.
/// Matching is substring containment of the stem, the same rule the edge
/// server applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UriFilter(String);

impl UriFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self(filter.into())
    }

    pub fn wildcard() -> Self {
        Self("*".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == "*"
    }

    pub fn matches(&self, uri: &str) -> bool {
        let stem = self.0.strip_suffix('*').unwrap_or(&self.0);
        stem.is_empty() || uri.contains(stem)
    }
}

impl fmt::Display for UriFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UriFilter {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UriFilter {
    fn from(s: String) -> Self {
        Self(s)
    }
}
