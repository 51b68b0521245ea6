//! Per-request handle passed to filter and handler bodies

use crate::app::Engine;
use crate::filter;
use crate::route::RouteTable;
use crate::{Error, Request, Response, Result};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

struct Shared {
    request: Mutex<Request>,
    response: Mutex<Response>,
    engine: Arc<Engine>,
    table: Arc<RouteTable>,
}

/// Request, response and the continuation of the filter chain
///
/// Cloning is cheap; every clone sees the same request and response. The
/// guards returned by [`Exchange::request`] and [`Exchange::response`] must
/// be dropped before the next `.await`.
#[derive(Clone)]
pub struct Exchange {
    shared: Arc<Shared>,
    /// Filter index `next()` resumes at; `None` inside handlers
    next: Option<usize>,
}

impl Exchange {
    pub(crate) fn new(
        request: Request,
        response: Response,
        engine: Arc<Engine>,
        table: Arc<RouteTable>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                request: Mutex::new(request),
                response: Mutex::new(response),
                engine,
                table,
            }),
            next: None,
        }
    }

    /// Lock the request
    pub fn request(&self) -> MutexGuard<'_, Request> {
        self.shared.request.lock()
    }

    /// Lock the response
    pub fn response(&self) -> MutexGuard<'_, Response> {
        self.shared.response.lock()
    }

    /// Run the rest of the filter chain
    ///
    /// A filter that never calls this ends the request. Handlers have nothing
    /// to continue to, so the call does nothing there.
    pub async fn next(&self) -> Result<()> {
        match self.next {
            Some(index) => filter::run(self.without_next(), index).await,
            None => {
                tracing::debug!("next() called outside a filter, ignored");
                Ok(())
            }
        }
    }

    /// Is there a filter chain to continue?
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Serve a file (url path under the web root or a module home)
    pub async fn send_file(&self, path: &str) -> Result<()> {
        let engine = self.shared.engine.clone();
        engine.files.serve(self, path).await
    }

    /// Render a template with the configured renderer and end the response
    pub async fn render(&self, template: &str, model: &serde_json::Value) -> Result<()> {
        let renderer = self
            .shared
            .engine
            .renderer
            .clone()
            .ok_or_else(|| Error::Template("no renderer configured".to_string()))?;

        let html = renderer.render(template, model).await?;

        let mut res = self.response();
        if res.content_type().is_none() {
            res.set_type("html");
        }
        res.end_with(&html);
        Ok(())
    }

    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.shared.engine
    }

    pub(crate) fn table(&self) -> &Arc<RouteTable> {
        &self.shared.table
    }

    pub(crate) fn with_next(&self, index: usize) -> Exchange {
        Exchange {
            shared: self.shared.clone(),
            next: Some(index),
        }
    }

    pub(crate) fn without_next(&self) -> Exchange {
        Exchange {
            shared: self.shared.clone(),
            next: None,
        }
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let url = self.shared.request.try_lock().map(|req| req.url.clone());
        f.debug_struct("Exchange")
            .field("url", &url.as_deref().unwrap_or("<locked>"))
            .field("next", &self.next)
            .finish()
    }
}
