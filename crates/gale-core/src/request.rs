//! HTTP Request types

use crate::cache::is_fresh;
use crate::cookie::parse_cookie_header;
use crate::parser::{ParsedBody, UploadedFile};
use crate::session::SessionRecord;
use crate::{Error, Result};
use gale_router::Params;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::SystemTime;

/// HTTP Methods
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
    /// Extension method (`PURGE`, `PROPFIND`, ...), upper-cased
    Other(String),
}

impl Method {
    /// Convert to string
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
            Method::Other(name) => name,
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "CONNECT" => Ok(Method::Connect),
            "TRACE" => Ok(Method::Trace),
            _ if is_token(s) => Ok(Method::Other(s.to_ascii_uppercase())),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

/// RFC 9110 method token
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP Request
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Raw request url (path plus query string), what expressions match against
    pub url: String,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query: Option<String>,
    /// Request headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 16]>,
    /// Raw request body as delivered by the transport
    pub body: bytes::Bytes,
    /// Url parameters captured by matched expressions
    pub params: Params,
    /// Decoded query string
    pub query_params: HashMap<String, String>,
    /// Request cookies
    pub cookies: HashMap<String, String>,
    /// Session attached by the session gate
    pub session: Option<SessionRecord>,
    /// Body after parsing, `None` until a route asked for it
    pub parsed: Option<ParsedBody>,
    /// Uploaded files from multipart parsing
    pub files: Vec<UploadedFile>,
}

impl Request {
    /// Create a new request from a raw url
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (url.clone(), None),
        };

        Self {
            method,
            url,
            path,
            query,
            headers: SmallVec::new(),
            body: bytes::Bytes::new(),
            params: Params::new(),
            query_params: HashMap::new(),
            cookies: HashMap::new(),
            session: None,
            parsed: None,
            files: Vec::new(),
        }
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get content-type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get a url parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }

    /// Get a cookie value
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|s| s.as_str())
    }

    /// Get a query string value
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Does the client accept gzip?
    pub fn accepts_gzip(&self) -> bool {
        self.header("accept-encoding")
            .map(|v| v.contains("gzip"))
            .unwrap_or(false)
    }

    /// Is the client copy still fresh for a resource modified at `mtime`?
    pub fn is_cached(&self, mtime: SystemTime) -> bool {
        is_fresh(mtime, self.header("if-modified-since"))
    }

    /// Parse the cookie header into `cookies` (first call only)
    pub fn parse_cookies(&mut self) {
        if !self.cookies.is_empty() {
            return;
        }
        if let Some(header) = self.header("cookie") {
            self.cookies = parse_cookie_header(header);
        }
    }

    /// Decode the query string into `query_params`
    pub fn parse_query(&mut self) {
        if let Some(query) = &self.query {
            self.query_params = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
        }
    }
}

/// Builder for constructing requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, url),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert!("".parse::<Method>().is_err());
        assert!("BAD METHOD".parse::<Method>().is_err());
    }

    #[test]
    fn test_extension_method() {
        let purge = "purge".parse::<Method>().unwrap();
        assert_eq!(purge, Method::Other("PURGE".to_string()));
        assert_eq!(purge.as_str(), "PURGE");
        assert_ne!(purge, Method::Get);
    }

    #[test]
    fn test_url_split() {
        let req = Request::new(Method::Get, "/search?q=rust&page=2");
        assert_eq!(req.url, "/search?q=rust&page=2");
        assert_eq!(req.path, "/search");
        assert_eq!(req.query.as_deref(), Some("q=rust&page=2"));
    }

    #[test]
    fn test_request_header() {
        let req = RequestBuilder::new(Method::Get, "/")
            .header("Content-Type", "application/json")
            .build();

        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_query_params() {
        let mut req = RequestBuilder::new(Method::Get, "/?foo=bar&baz=qux%20quux").build();
        req.parse_query();

        assert_eq!(req.query_param("foo"), Some("bar"));
        assert_eq!(req.query_param("baz"), Some("qux quux"));
    }

    #[test]
    fn test_cookies() {
        let mut req = RequestBuilder::new(Method::Get, "/")
            .header("Cookie", "_wsid=abc; theme=dark%20blue")
            .build();
        req.parse_cookies();

        assert_eq!(req.cookie("_wsid"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark blue"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn test_accepts_gzip() {
        let req = RequestBuilder::new(Method::Get, "/")
            .header("Accept-Encoding", "gzip, deflate, br")
            .build();
        assert!(req.accepts_gzip());
        assert!(!Request::new(Method::Get, "/").accepts_gzip());
    }
}
