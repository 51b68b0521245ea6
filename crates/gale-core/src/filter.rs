//! Filter pipeline
//!
//! Filters are tried in registration order. A matching filter's body owns
//! the rest of the chain: it continues with [`Exchange::next`] or ends the
//! request by not calling it. Past the last filter the handler table runs,
//! then the file server.

use crate::exchange::Exchange;
use crate::handler;
use crate::parser::{ParsedBody, PostParsing};
use crate::route::{Body, Route};
use crate::{Result, StatusCode};
use futures_util::future::{BoxFuture, FutureExt};

/// Body written when a pre-check rejects the request
pub const REJECTION_BODY: &str = "This is not a valid request";

/// Run the chain from filter `start`
pub(crate) fn run(ex: Exchange, start: usize) -> BoxFuture<'static, Result<()>> {
    async move {
        let table = ex.table().clone();

        for (index, route) in table.filters.iter().enumerate().skip(start) {
            let params = {
                let req = ex.request();
                route.matches(&req)
            };

            if let Some(params) = params {
                tracing::debug!(index, filter = %route.expression, "Filter matched");
                ex.request().params.extend(params);
                return execute(route, ex.with_next(index + 1)).await;
            }
        }

        if handler::dispatch(&ex).await? {
            return Ok(());
        }

        let url = ex.request().url.clone();
        ex.send_file(&url).await
    }
    .boxed()
}

/// Run a matched entry
///
/// Literal and file-reference bodies answer directly. Callables get the
/// pre-check, then multipart, body and session pre-processing, in that order.
pub(crate) async fn execute(route: &Route, ex: Exchange) -> Result<()> {
    let f = match &route.body {
        Body::Callable(f) => f,
        Body::Literal(text) => {
            let mut res = ex.response();
            res.write_head(StatusCode::OK, &[("Content-Type", "text/html")]);
            res.end_with(text);
            return Ok(());
        }
        Body::StaticRef(path) => return ex.send_file(path).await,
    };

    if let Some(before) = &route.options.before {
        let passed = {
            let req = ex.request();
            let mut res = ex.response();
            before(&req, &mut res)
        };
        if !passed {
            tracing::info!(expression = %route.expression, "Pre-check rejected request");
            ex.response().end_with(REJECTION_BODY);
            return Ok(());
        }
    }

    let engine = ex.engine().clone();

    let unparsed = ex.request().parsed.is_none();
    if route.options.file && unparsed {
        let (content_type, body) = {
            let req = ex.request();
            (req.content_type().map(str::to_string), req.body.clone())
        };
        let multipart =
            engine
                .parser
                .parse_multipart(content_type.as_deref(), &body, &engine.settings.upload_dir)?;

        let mut req = ex.request();
        req.parsed = Some(ParsedBody::Form(multipart.fields));
        req.files = multipart.files;
    }

    let unparsed = ex.request().parsed.is_none();
    if route.options.post != PostParsing::None && unparsed {
        let body = ex.request().body.clone();
        let parsed = engine.parser.parse(&body, route.options.post)?;
        ex.request().parsed = Some(parsed);
    }

    let no_session = ex.request().session.is_none();
    if route.options.wants_session() && no_session {
        engine.sessions.ensure(&ex).await;
    }

    f(ex).await
}
