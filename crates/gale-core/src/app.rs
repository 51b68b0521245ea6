//! Application: route registration and request dispatch
//!
//! Registration swaps in a new [`RouteTable`]; each request loads one
//! snapshot and never observes a table that changes under it.
//!
//! ```no_run
//! use gale_core::{App, Settings};
//!
//! let app = App::new(Settings::new("./web"));
//! app.use_filter(|ex| async move { ex.next().await })
//!     .get("/hello/:name", |ex| async move {
//!         let name = ex.request().param("name").unwrap_or("").to_string();
//!         ex.response().send_text(format!("hello {}", name));
//!         Ok(())
//!     })
//!     .static_prefix("/js/");
//! ```

use crate::config::Settings;
use crate::exchange::Exchange;
use crate::filter;
use crate::handlers::FileServer;
use crate::parser::{BodyParser, DefaultBodyParser, PostParsing};
use crate::render::Renderer;
use crate::response::escape_html;
use crate::route::{Body, Route, RouteOptions, RouteTable};
use crate::session::{FileStore, MemoryStore, SessionGate, SessionStore};
use crate::{Error, Method, Request, Response, Result, StatusCode};
use arc_swap::ArcSwap;
use futures_util::FutureExt;
use gale_router::{Expression, Mode};
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

/// Shared collaborators of every request
pub(crate) struct Engine {
    pub(crate) settings: Settings,
    pub(crate) files: FileServer,
    pub(crate) sessions: SessionGate,
    pub(crate) parser: Arc<dyn BodyParser>,
    pub(crate) renderer: Option<Arc<dyn Renderer>>,
}

/// Builder for [`App`] with custom collaborators
pub struct AppBuilder {
    settings: Settings,
    store: Option<Arc<dyn SessionStore>>,
    parser: Option<Arc<dyn BodyParser>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl AppBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store: None,
            parser: None,
            renderer: None,
        }
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn body_parser(mut self, parser: Arc<dyn BodyParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Build the app
    ///
    /// Without an explicit store, `session.dir` selects a [`FileStore`];
    /// otherwise a [`MemoryStore`] is used and swept in the background when
    /// a tokio runtime is running.
    pub fn build(self) -> App {
        let session = self.settings.session.clone();
        let store: Arc<dyn SessionStore> = match (self.store, &session.dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStore::new(dir.clone(), session.length)),
            (None, None) => {
                let store = Arc::new(MemoryStore::new());
                if tokio::runtime::Handle::try_current().is_ok() {
                    store.spawn_sweeper(session.timeout);
                }
                store
            }
        };

        let engine = Engine {
            files: FileServer::new(&self.settings),
            sessions: SessionGate::new(store, session),
            parser: self
                .parser
                .unwrap_or_else(|| Arc::new(DefaultBodyParser)),
            renderer: self.renderer,
            settings: self.settings,
        };

        App {
            engine: Arc::new(engine),
            routes: ArcSwap::from_pointee(RouteTable::new()),
            writer: Mutex::new(()),
        }
    }
}

/// Request dispatch engine
pub struct App {
    engine: Arc<Engine>,
    routes: ArcSwap<RouteTable>,
    /// Serializes registrations so concurrent updates are not lost
    writer: Mutex<()>,
}

impl App {
    /// App with default collaborators
    pub fn new(settings: Settings) -> Self {
        AppBuilder::new(settings).build()
    }

    pub fn builder(settings: Settings) -> AppBuilder {
        AppBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.engine.settings
    }

    pub fn sessions(&self) -> &SessionGate {
        &self.engine.sessions
    }

    pub fn files(&self) -> &FileServer {
        &self.engine.files
    }

    /// Current route table snapshot
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    fn update(&self, f: impl FnOnce(&mut RouteTable)) {
        let _guard = self.writer.lock();
        let mut table = RouteTable::clone(&self.routes.load());
        f(&mut table);
        self.routes.store(Arc::new(table));
    }

    // ---- filters ----

    /// Add a filter (loose matching unless the options say otherwise)
    pub fn filter<F, Fut>(&self, expression: impl Into<Expression>, f: F) -> &Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.filter_with(expression, Body::func(f), RouteOptions::new())
    }

    pub fn filter_with(
        &self,
        expression: impl Into<Expression>,
        body: impl Into<Body>,
        options: RouteOptions,
    ) -> &Self {
        let route = Route::new(expression.into(), body.into(), options, Mode::Loose);
        self.update(|table| table.filters.push(Arc::new(route)));
        self
    }

    /// Add a filter that runs for every request
    pub fn use_filter<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.filter_with(Expression::Any, Body::func(f), RouteOptions::new())
    }

    /// Add a filter that always has a session
    pub fn session<F, Fut>(&self, expression: impl Into<Expression>, f: F, options: RouteOptions) -> &Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.filter_with(expression, Body::func(f), options.session(true))
    }

    /// Add an upload filter ahead of every other filter
    ///
    /// Multipart parsing is forced; sessions are on unless disabled. Unlike
    /// other filters it matches strictly unless the options say otherwise.
    pub fn file<F, Fut>(&self, expression: impl Into<Expression>, f: F, options: RouteOptions) -> &Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut options = options.file(true);
        options.session.get_or_insert(true);
        let route = Route::new(expression.into(), Body::func(f), options, Mode::Strict);
        self.update(|table| table.filters.insert(0, Arc::new(route)));
        self
    }

    // ---- handlers ----

    fn add_handler(&self, expression: Expression, body: Body, options: RouteOptions, default_mode: Mode) -> &Self {
        if expression.is_empty() {
            tracing::warn!(body = ?body, "Handler without expression ignored");
            return self;
        }
        let route = Route::new(expression, body, options, default_mode);
        self.update(|table| table.handlers.push(Arc::new(route)));
        self
    }

    /// Handle any method (loose)
    pub fn url<F, Fut>(&self, expression: impl Into<Expression>, f: F) -> &Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.url_with(expression, Body::func(f), RouteOptions::new())
    }

    pub fn url_with(&self, expression: impl Into<Expression>, body: impl Into<Body>, options: RouteOptions) -> &Self {
        self.add_handler(expression.into(), body.into(), options, Mode::Loose)
    }

    /// Handle GET (strict)
    pub fn get<F, Fut>(&self, expression: impl Into<Expression>, f: F) -> &Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.get_with(expression, Body::func(f), RouteOptions::new())
    }

    pub fn get_with(&self, expression: impl Into<Expression>, body: impl Into<Body>, mut options: RouteOptions) -> &Self {
        options.method.get_or_insert(Method::Get);
        self.add_handler(expression.into(), body.into(), options, Mode::Strict)
    }

    /// Handle POST with a form-decoded body (loose)
    pub fn post<F, Fut>(&self, expression: impl Into<Expression>, f: F) -> &Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.post_with(expression, Body::func(f), RouteOptions::new())
    }

    pub fn post_with(&self, expression: impl Into<Expression>, body: impl Into<Body>, mut options: RouteOptions) -> &Self {
        options.method.get_or_insert(Method::Post);
        if options.post == PostParsing::None {
            options.post = PostParsing::Form;
        }
        self.add_handler(expression.into(), body.into(), options, Mode::Loose)
    }

    /// Handle a JSON body (loose)
    pub fn json<F, Fut>(&self, expression: impl Into<Expression>, f: F) -> &Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.json_with(expression, Body::func(f), RouteOptions::new())
    }

    pub fn json_with(&self, expression: impl Into<Expression>, body: impl Into<Body>, mut options: RouteOptions) -> &Self {
        if options.post == PostParsing::None {
            options.post = PostParsing::Json;
        }
        self.add_handler(expression.into(), body.into(), options, Mode::Loose)
    }

    // ---- static files ----

    /// Route urls under `prefix` straight to file serving
    pub fn static_prefix(&self, prefix: impl Into<String>) -> &Self {
        let prefix = prefix.into();
        self.update(|table| {
            if !table.statics.add(prefix.as_str()) {
                tracing::debug!(prefix = %prefix, "Static prefix already registered");
            }
        });
        self
    }

    /// Serve `/<name>/...` from `home`
    pub fn module(&self, name: &str, home: impl AsRef<Path>) -> &Self {
        let home = home.as_ref();
        self.update(|table| {
            if let Some(previous) = table.modules.register(name, home) {
                tracing::warn!(
                    module = name,
                    previous = %previous.display(),
                    home = %home.display(),
                    "Module re-registered, previous home replaced"
                );
            }
        });
        self
    }

    /// Drop every cached file
    pub fn clear_cache(&self) -> &Self {
        self.engine.files.cache().clear();
        self
    }

    // ---- dispatch ----

    /// Run a request through static prefixes, filters, handlers and files
    ///
    /// Always yields a finished response: errors and panics from bodies
    /// become an error page, and the session is saved before returning.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let table = self.routes.load_full();
        let response = Response::with_charset(self.engine.settings.charset.as_str());

        if table.statics.is_static(&req.url) {
            tracing::debug!(url = %req.url, "Static");
            let url = req.url.clone();
            let ex = Exchange::new(req, response, self.engine.clone(), table);
            if let Err(e) = ex.send_file(&url).await {
                self.render_error(&ex, &e);
            }
            return self.finish(&ex).await;
        }

        req.parse_cookies();
        req.parse_query();
        let ex = Exchange::new(req, response, self.engine.clone(), table);

        match AssertUnwindSafe(filter::run(ex.clone(), 0)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.render_error(&ex, &e),
            Err(panic) => self.render_error(&ex, &Error::Body(panic_message(panic))),
        }

        self.finish(&ex).await
    }

    /// Save the session, then hand the response over for flushing
    async fn finish(&self, ex: &Exchange) -> Response {
        if !ex.response().is_finished() {
            let url = ex.request().url.clone();
            tracing::warn!(url = %url, "Response not ended, ending implicitly");
        }

        self.engine.sessions.save(ex).await;
        let mut res = ex.response();
        res.detach()
    }

    fn render_error(&self, ex: &Exchange, err: &Error) {
        let url = ex.request().url.clone();
        tracing::error!(url = %url, error = %err, "Request failed");

        let mut res = ex.response();
        if res.is_finished() {
            return;
        }
        if !res.headers_sent() {
            res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            res.set_type("html");
        }

        if self.engine.settings.show_error {
            let message = format!("Error {} {}\n{}", chrono::Utc::now().to_rfc3339(), url, err);
            res.end_with(format!("<pre>{}</pre>", escape_html(&message)));
        } else {
            res.end();
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
