//! HTTP Response sink
//!
//! A response is written in place by filters and handlers and flushed to the
//! transport once dispatch completes. After [`Response::end`] every further
//! write, header change or cookie is ignored, so a response is terminated
//! exactly once no matter what runs after it.

use crate::cookie::Cookie;
use crate::Result;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use smallvec::SmallVec;

/// HTTP Status Code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    // 2xx Success
    pub const OK: StatusCode = StatusCode(200);
    pub const NO_CONTENT: StatusCode = StatusCode(204);

    // 3xx Redirection
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);

    // 4xx Client Errors
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);

    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    /// Get the numeric code
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Get the reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }

    /// Check if this is a redirect status (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.0)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// Content type for a file path or bare extension (`css`, `.json`, `a/b.png`)
pub fn mime_type(path_or_ext: &str, charset: &str) -> String {
    let guess = if path_or_ext.contains('.') || path_or_ext.contains('/') {
        mime_guess::from_path(path_or_ext).first()
    } else {
        mime_guess::from_ext(path_or_ext).first()
    };

    match guess {
        Some(mime) => {
            let textual = mime.type_() == mime_guess::mime::TEXT
                || mime.subtype() == mime_guess::mime::JAVASCRIPT
                || mime.subtype() == mime_guess::mime::JSON
                || mime.subtype() == mime_guess::mime::XML;
            if textual {
                format!("{}; charset={}", mime.essence_str(), charset)
            } else {
                mime.essence_str().to_string()
            }
        }
        None => format!("text/plain; charset={}", charset),
    }
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTTP Response
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: SmallVec<[(String, String); 8]>,
    body: BytesMut,
    cookies: SmallVec<[Cookie; 2]>,
    charset: String,
    headers_sent: bool,
    finished: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Create an empty 200 response
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: SmallVec::new(),
            body: BytesMut::new(),
            cookies: SmallVec::new(),
            charset: "utf-8".to_string(),
            headers_sent: false,
            finished: false,
        }
    }

    /// Create a response using `charset` for default content types
    pub fn with_charset(charset: impl Into<String>) -> Self {
        Self {
            charset: charset.into(),
            ..Self::new()
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Set the status code (ignored once headers are sent)
    pub fn set_status(&mut self, status: StatusCode) {
        if self.headers_sent {
            tracing::debug!(status = status.0, "Headers already sent, status ignored");
            return;
        }
        self.status = status;
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in insertion order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Get content-type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.headers_sent {
            tracing::debug!("Headers already sent, set_header ignored");
            return;
        }
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Add a header without replacing existing ones
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.headers_sent {
            tracing::debug!("Headers already sent, append_header ignored");
            return;
        }
        self.headers.push((name.into(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        if self.headers_sent {
            return;
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Set content type from a file path or extension
    pub fn set_type(&mut self, path_or_ext: &str) {
        if path_or_ext.is_empty() {
            return;
        }
        let mime = mime_type(path_or_ext, &self.charset);
        self.set_header("Content-Type", mime);
    }

    /// Set `Cache-Control: max-age=<seconds>`
    pub fn cache_control(&mut self, seconds: u64) {
        self.set_header("Cache-Control", format!("max-age={}", seconds));
    }

    /// Queue a cookie; cookies become `Set-Cookie` headers when headers are sent
    pub fn cookie(&mut self, cookie: Cookie) {
        if self.headers_sent {
            tracing::debug!(name = %cookie.name, "Headers already sent, cookie ignored");
            return;
        }
        self.cookies.push(cookie);
    }

    /// Queue a cookie removal
    pub fn clear_cookie(&mut self, name: &str) {
        self.cookie(Cookie::removal(name));
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Have the headers been committed?
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Has the response been ended?
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Set status and headers, then commit them
    pub fn write_head(&mut self, status: StatusCode, headers: &[(&str, &str)]) {
        if self.headers_sent {
            tracing::debug!(status = status.0, "Headers already sent, write_head ignored");
            return;
        }
        self.status = status;
        for (name, value) in headers {
            self.set_header(*name, *value);
        }
        self.commit_headers();
    }

    /// Append to the body
    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        if self.finished {
            tracing::debug!("Response already ended, write ignored");
            return;
        }
        self.commit_headers();
        self.body.extend_from_slice(data.as_ref());
    }

    /// End the response
    pub fn end(&mut self) {
        if self.finished {
            tracing::debug!("Response already ended, end ignored");
            return;
        }
        self.commit_headers();
        self.finished = true;
    }

    /// Write a final chunk and end the response
    pub fn end_with(&mut self, data: impl AsRef<[u8]>) {
        if self.finished {
            tracing::debug!("Response already ended, end ignored");
            return;
        }
        self.write(data);
        self.end();
    }

    /// Send a status with an empty body
    pub fn send_status(&mut self, status: StatusCode) {
        self.set_status(status);
        self.end();
    }

    /// Send plain text
    pub fn send_text(&mut self, body: impl AsRef<[u8]>) {
        self.set_type("txt");
        self.end_with(body);
    }

    /// Send HTML
    pub fn send_html(&mut self, body: impl AsRef<[u8]>) {
        self.set_type("html");
        self.end_with(body);
    }

    /// Serialize `value` as JSON and send it
    pub fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.set_type("json");
        self.end_with(body);
        Ok(())
    }

    /// Redirect with 302 Found
    pub fn redirect(&mut self, location: &str) {
        self.redirect_with(location, StatusCode::FOUND);
    }

    /// Redirect with an explicit status
    pub fn redirect_with(&mut self, location: &str, status: StatusCode) {
        self.set_status(status);
        self.set_header("Location", location);
        self.end();
    }

    /// Body written so far
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get body as string (if UTF-8)
    pub fn body_string(&self) -> Option<String> {
        std::str::from_utf8(&self.body).ok().map(|s| s.to_string())
    }

    /// Apply header defaults and freeze them
    ///
    /// A missing content type becomes `text/html` and queued cookies turn
    /// into `Set-Cookie` headers.
    fn commit_headers(&mut self) {
        if self.headers_sent {
            return;
        }
        if self.content_type().is_none() {
            let value = format!("text/html; charset={}", self.charset);
            self.headers.push(("Content-Type".to_string(), value));
        }
        for cookie in std::mem::take(&mut self.cookies) {
            self.headers.push(("Set-Cookie".to_string(), cookie.to_header_value()));
        }
        self.headers_sent = true;
    }

    /// Take the finished response for flushing
    ///
    /// Ends the response if nothing ended it yet. The sink left behind is
    /// finished and empty, so late writes go nowhere.
    pub fn detach(&mut self) -> Response {
        if !self.finished {
            self.end();
        }
        Response {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
            cookies: SmallVec::new(),
            charset: self.charset.clone(),
            headers_sent: true,
            finished: true,
        }
    }

    /// Split into status, headers and frozen body
    pub fn into_parts(self) -> (StatusCode, SmallVec<[(String, String); 8]>, Bytes) {
        (self.status, self.headers, self.body.freeze())
    }
}
