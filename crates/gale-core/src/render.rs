//! Template rendering seam

use crate::Result;
use bytes::Bytes;
use futures_util::future::BoxFuture;

/// Renders a template identifier (or raw template) with a JSON model
///
/// Used for `Exchange::render` and the configured 404 template. Failures
/// should be reported as [`crate::Error::Template`].
pub trait Renderer: Send + Sync {
    fn render<'a>(&'a self, template: &'a str, model: &'a serde_json::Value) -> BoxFuture<'a, Result<Bytes>>;
}
