//! Url expressions
//!
//! An expression decides whether a filter or handler applies to a request
//! url. Literal expressions come in two forms:
//!
//! - plain prefix (`/home/login`): the url must contain the literal at
//!   offset 0 or 1, followed by end of url, `?`, or (loose mode only) `/`
//! - parameterized (`/home/:key/:page`): segment-by-segment comparison
//!   that captures `:name` segments into [`Params`]

use crate::{PatternError, Result};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Captured url parameters (name -> decoded value)
pub type Params = HashMap<String, String>;

/// Boundary discipline for literal expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The literal must be the complete route
    Strict,
    /// The literal may also be a directory prefix of the route
    Loose,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Loose => "loose",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route expression
#[derive(Debug, Clone)]
pub enum Expression {
    /// Matches every url
    Any,
    /// Plain prefix or parameterized literal
    Literal(String),
    /// Tested against the raw url (query string included)
    Regex(Regex),
    /// Matches if any literal in the list matches
    List(Vec<String>),
}

impl Expression {
    /// True for expressions that carry no pattern at all
    pub fn is_empty(&self) -> bool {
        match self {
            Expression::Any => true,
            Expression::Literal(s) => s.is_empty(),
            Expression::Regex(_) => false,
            Expression::List(list) => list.is_empty(),
        }
    }

    /// Match a raw request url (path plus optional query string)
    ///
    /// Returns the captured parameters on success. Plain, regex and `Any`
    /// matches yield an empty map.
    pub fn matches(&self, url: &str, mode: Mode) -> Option<Params> {
        match self {
            Expression::Any => Some(Params::new()),
            Expression::Literal(s) if s.is_empty() => Some(Params::new()),
            Expression::Literal(s) => match_literal(s, url, mode),
            Expression::Regex(re) => re.is_match(url).then(Params::new),
            Expression::List(list) => list.iter().find_map(|s| match_literal(s, url, mode)),
        }
    }
}

impl Default for Expression {
    fn default() -> Self {
        Expression::Any
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Any => f.write_str("*"),
            Expression::Literal(s) => f.write_str(s),
            Expression::Regex(re) => write!(f, "/{}/", re.as_str()),
            Expression::List(list) => write!(f, "[{}]", list.join(", ")),
        }
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::Literal(s.to_string())
    }
}

impl From<String> for Expression {
    fn from(s: String) -> Self {
        Expression::Literal(s)
    }
}

impl From<Regex> for Expression {
    fn from(re: Regex) -> Self {
        Expression::Regex(re)
    }
}

impl From<Vec<String>> for Expression {
    fn from(list: Vec<String>) -> Self {
        Expression::List(list)
    }
}

impl From<Vec<&str>> for Expression {
    fn from(list: Vec<&str>) -> Self {
        Expression::List(list.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Expression {
    fn from(list: &[&str]) -> Self {
        Expression::List(list.iter().map(|s| s.to_string()).collect())
    }
}

impl<T: Into<Expression>> From<Option<T>> for Expression {
    fn from(expr: Option<T>) -> Self {
        expr.map(Into::into).unwrap_or(Expression::Any)
    }
}

fn match_literal(expression: &str, url: &str, mode: Mode) -> Option<Params> {
    // "/" in loose mode is a catch-all
    if expression == "/" && mode == Mode::Loose {
        return Some(Params::new());
    }

    if !expression.contains("/:") {
        return match_prefix(expression, url, mode).then(Params::new);
    }

    match parse_url(expression, url, mode) {
        Ok(params) => params,
        Err(e) => {
            tracing::debug!(expression, error = %e, "Malformed expression treated as non-match");
            None
        }
    }
}

/// Plain prefix rule
///
/// The first occurrence of `expression` must start at offset 0 or 1. The
/// character right after it must be end of url or `?`; loose mode also
/// accepts `/`.
pub fn match_prefix(expression: &str, url: &str, mode: Mode) -> bool {
    let idx = match url.find(expression) {
        Some(idx) if idx <= 1 => idx,
        _ => return false,
    };

    match url[idx + expression.len()..].chars().next() {
        None | Some('?') => true,
        Some('/') => mode == Mode::Loose,
        Some(_) => false,
    }
}

/// Pick up the parameters of a parameterized expression
///
/// ```text
/// /home/:key/:pager   /home/JavaScript/1        => { key: JavaScript, pager: 1 }
/// /home/:key/:pager   /key/JavaScript/1         => no match
/// /home/:fileUrl$     /home/JavaScript/what/ever => { fileUrl: JavaScript/what/ever }
/// ```
///
/// The query string is removed before comparing. Loose mode walks only
/// the expression's segments; strict mode walks the longer of the two.
pub fn parse_url(expression: &str, url: &str, mode: Mode) -> Result<Option<Params>> {
    let path = match url.find('?') {
        Some(idx) if idx > 0 => &url[..idx],
        _ => url,
    };

    let parts: Vec<&str> = expression.split('/').collect();
    let segments: Vec<&str> = path.split('/').collect();

    let start = if expression.starts_with('/') { 0 } else { 1 };
    let len = match mode {
        Mode::Loose => parts.len(),
        Mode::Strict => parts.len().max(segments.len()),
    };

    let mut params = Params::new();

    for i in 0..len {
        let part = parts.get(i).copied();
        let segment = segments.get(i + start).copied();

        let Some(name) = part.and_then(|p| p.strip_prefix(':')) else {
            if part != segment {
                return Ok(None);
            }
            continue;
        };

        let (name, whole) = match name.strip_suffix('$') {
            Some(name) => (name, true),
            None => (name, false),
        };

        if name.is_empty() {
            return Err(PatternError::EmptyParam(expression.to_string()));
        }

        let raw = if whole {
            segments
                .get(i + start..)
                .map(|rest| rest.join("/"))
                .unwrap_or_default()
        } else {
            segment.unwrap_or("").to_string()
        };

        let value = decode_component(&raw).unwrap_or(raw);
        params.insert(name.to_string(), value);

        if whole {
            return Ok(Some(params));
        }
    }

    Ok(Some(params))
}

/// Decode a url component
///
/// `+` stays as is. Returns `None` for a truncated or non-hex `%` escape
/// and for escapes that do not decode to UTF-8.
pub fn decode_component(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}
