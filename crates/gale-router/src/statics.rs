//! Static prefix classification
//!
//! Urls under a registered static prefix skip filters and handlers and go
//! straight to file serving. A prefix may contain one `*`, which stands
//! for the characters of a single url segment.
//!
//! The wildcard stops at the next `/`, and a prefix only has to match the
//! start of the url: `/js/*` matches `/js/app.js` and also
//! `/js/anything/deep.js` (the wildcard consumes `anything`, the rest of
//! the url is never looked at).

/// Registered static prefixes, in registration order
#[derive(Debug, Clone, Default)]
pub struct StaticPrefixes {
    prefixes: Vec<String>,
}

impl StaticPrefixes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prefix; duplicates are ignored
    pub fn add(&mut self, prefix: impl Into<String>) -> bool {
        let prefix = prefix.into();
        if self.prefixes.contains(&prefix) {
            return false;
        }
        self.prefixes.push(prefix);
        true
    }

    /// Does the url fall under any registered prefix?
    pub fn is_static(&self, url: &str) -> bool {
        self.prefixes.iter().any(|prefix| matches_static(prefix, url))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }
}

/// Match one prefix pattern against a url
///
/// Patterns without `/` at the front are anchored at offset 1, so `css`
/// behaves like `/css`. Without a wildcard the first occurrence of the
/// pattern must sit at that offset; with a wildcard the pattern is scanned
/// left to right against the url.
pub fn matches_static(pattern: &str, url: &str) -> bool {
    let start = if pattern.starts_with('/') { 0 } else { 1 };

    if !pattern.contains('*') {
        return url.find(pattern) == Some(start);
    }

    let url = url.as_bytes();
    let mut pos = start;

    for &c in pattern.as_bytes() {
        if c == b'*' {
            while pos < url.len() && url[pos] != b'/' {
                pos += 1;
            }
        } else if url.get(pos) == Some(&c) {
            pos += 1;
        } else {
            return false;
        }
    }

    true
}
