//! gale-router: Ordered url expression matching
//!
//! Pure matching logic shared by the filter pipeline, the handler table and
//! the static file short-circuit of gale-core. Nothing here touches the
//! network or the filesystem.
//!
//! ## Expressions
//! - Absent - matches every url (generic filters)
//! - Literal - `/home/login` (plain prefix) or `/user/:id` (parameterized)
//! - Regex - tested against the raw url, query string included
//! - List - any literal in the list, first success wins
//!
//! ## Path Syntax
//! - `:name` - captures one url segment (URL-decoded)
//! - `:name$` - captures the rest of the url and stops matching
//!
//! ## Modes
//! - `Loose` - a plain literal also matches as a directory prefix
//! - `Strict` - a plain literal must be the complete route
//!
//! ## Example
//! ```
//! use gale_router::{Expression, Mode};
//!
//! let expr = Expression::from("/file/:rest$");
//! let params = expr.matches("/file/a/b/c", Mode::Strict).unwrap();
//! assert_eq!(params.get("rest").map(String::as_str), Some("a/b/c"));
//!
//! assert!(Expression::from("/user").matches("/user/kris", Mode::Loose).is_some());
//! assert!(Expression::from("/user").matches("/user/kris", Mode::Strict).is_none());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod error;
mod expression;
mod modules;
mod statics;

pub use error::{PatternError, Result};
pub use expression::{decode_component, match_prefix, parse_url, Expression, Mode, Params};
pub use modules::{ModuleMap, ModuleMatch};
pub use statics::{matches_static, StaticPrefixes};
