//! Route entries
//!
//! Filters and handlers share one shape: an expression, a body and the
//! options that decide which pre-processing runs before the body.

use crate::exchange::Exchange;
use crate::parser::PostParsing;
use crate::{Method, Request, Response, Result};
use futures_util::future::{BoxFuture, FutureExt};
use gale_router::{Expression, Mode, ModuleMap, Params, StaticPrefixes};
use std::future::Future;
use std::sync::Arc;

/// Boxed body callable
pub type BodyFn = Arc<dyn Fn(Exchange) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Pre-check run before anything else; `false` rejects the request
pub type PreCheck = Arc<dyn Fn(&Request, &mut Response) -> bool + Send + Sync>;

/// What a matched entry runs
#[derive(Clone)]
pub enum Body {
    /// Async callable receiving the exchange
    Callable(BodyFn),
    /// Verbatim `text/html` response body
    Literal(String),
    /// Url path served through the file server
    StaticRef(String),
}

impl Body {
    /// Wrap an async closure
    pub fn func<F, Fut>(f: F) -> Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Body::Callable(Arc::new(move |ex| f(ex).boxed()))
    }

    /// Serve a file from the web root
    pub fn file(path: impl Into<String>) -> Self {
        Body::StaticRef(path.into())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Literal(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Literal(text)
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Callable(_) => f.write_str("Callable"),
            Body::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Body::StaticRef(path) => f.debug_tuple("StaticRef").field(path).finish(),
        }
    }
}

/// Per-route options
#[derive(Clone, Default)]
pub struct RouteOptions {
    /// Only match this method
    pub method: Option<Method>,
    /// Matching discipline; the registration form picks the default
    pub mode: Option<Mode>,
    /// Establish a session before the body runs (off when unset)
    pub session: Option<bool>,
    /// Parse multipart uploads before the body runs
    pub file: bool,
    /// Body pre-processing
    pub post: PostParsing,
    pub before: Option<PreCheck>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn strict(self) -> Self {
        self.mode(Mode::Strict)
    }

    pub fn loose(self) -> Self {
        self.mode(Mode::Loose)
    }

    pub fn session(mut self, enabled: bool) -> Self {
        self.session = Some(enabled);
        self
    }

    /// Does the route want a session?
    pub fn wants_session(&self) -> bool {
        self.session.unwrap_or(false)
    }

    pub fn file(mut self, enabled: bool) -> Self {
        self.file = enabled;
        self
    }

    pub fn post(mut self, parsing: PostParsing) -> Self {
        self.post = parsing;
        self
    }

    pub fn before<F>(mut self, check: F) -> Self
    where
        F: Fn(&Request, &mut Response) -> bool + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(check));
        self
    }
}

impl std::fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteOptions")
            .field("method", &self.method)
            .field("mode", &self.mode)
            .field("session", &self.session)
            .field("file", &self.file)
            .field("post", &self.post)
            .field("before", &self.before.is_some())
            .finish()
    }
}

/// A registered filter or handler
#[derive(Debug, Clone)]
pub struct Route {
    pub expression: Expression,
    pub body: Body,
    pub options: RouteOptions,
    mode: Mode,
}

impl Route {
    /// Create a route; `default_mode` applies when the options leave it unset
    pub fn new(expression: Expression, body: Body, options: RouteOptions, default_mode: Mode) -> Self {
        let mode = options.mode.unwrap_or(default_mode);
        Self {
            expression,
            body,
            options,
            mode,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Match against the request method and raw url
    pub fn matches(&self, req: &Request) -> Option<Params> {
        if let Some(method) = &self.options.method {
            if *method != req.method {
                return None;
            }
        }
        self.expression.matches(&req.url, self.mode)
    }
}

/// Everything a request is matched against
///
/// Requests work on an immutable snapshot; registration builds a new table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    pub filters: Vec<Arc<Route>>,
    pub handlers: Vec<Arc<Route>>,
    pub statics: StaticPrefixes,
    pub modules: ModuleMap,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestBuilder;

    fn route(expr: &str, options: RouteOptions, mode: Mode) -> Route {
        Route::new(Expression::from(expr), Body::from("ok"), options, mode)
    }

    #[test]
    fn test_method_constraint() {
        let get = route("/home", RouteOptions::new().method(Method::Get), Mode::Strict);
        let req = RequestBuilder::new(Method::Post, "/home").build();
        assert!(get.matches(&req).is_none());

        let req = RequestBuilder::new(Method::Get, "/home").build();
        assert!(get.matches(&req).is_some());
    }

    #[test]
    fn test_extension_method_never_matches_preset() {
        let get = route("/admin", RouteOptions::new().method(Method::Get), Mode::Strict);
        let req = RequestBuilder::new(Method::Other("PURGE".to_string()), "/admin").build();
        assert!(get.matches(&req).is_none());

        let any = route("/admin", RouteOptions::new(), Mode::Strict);
        assert!(any.matches(&req).is_some());
    }

    #[test]
    fn test_options_mode_wins() {
        let r = route("/home", RouteOptions::new().loose(), Mode::Strict);
        assert_eq!(r.mode(), Mode::Loose);

        let req = RequestBuilder::new(Method::Get, "/home/sub").build();
        assert!(r.matches(&req).is_some());
    }

    #[test]
    fn test_params_from_url() {
        let r = route("/user/:id", RouteOptions::new(), Mode::Strict);
        let req = RequestBuilder::new(Method::Get, "/user/42?tab=1").build();
        let params = r.matches(&req).unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_body_from_literal() {
        assert!(matches!(Body::from("hi"), Body::Literal(ref s) if s == "hi"));
        assert!(matches!(Body::file("/a.html"), Body::StaticRef(_)));
    }
}
