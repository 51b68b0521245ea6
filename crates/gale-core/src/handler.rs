//! Handler table dispatch

use crate::exchange::Exchange;
use crate::filter::execute;
use crate::Result;

/// Run the first handler matching the request
///
/// Returns `false` when nothing matched so the caller can fall back to file
/// serving. Later handlers are never consulted once one matches.
pub(crate) async fn dispatch(ex: &Exchange) -> Result<bool> {
    let table = ex.table().clone();

    let found = {
        let req = ex.request();
        table
            .handlers
            .iter()
            .find_map(|route| route.matches(&req).map(|params| (route.clone(), params)))
    };

    let Some((route, params)) = found else {
        return Ok(false);
    };

    tracing::debug!(handler = %route.expression, "Handler matched");
    ex.request().params.extend(params);
    execute(&route, ex.without_next()).await?;
    Ok(true)
}
