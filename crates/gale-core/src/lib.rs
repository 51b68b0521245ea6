//! gale-core: Request dispatch engine
//!
//! Routes each request through an ordered chain of filters, then a table of
//! handlers, then a cached static file server. Transport is kept apart so
//! the engine can be driven by the bundled hyper server or by tests.
//!
//! ## Pipeline
//! 1. Static prefixes - matching urls go straight to file serving
//! 2. Filters - registration order; a filter continues with `next()`
//! 3. Handlers - first match wins
//! 4. Files - web root, modules, default page, directory listing
//!
//! ## Features
//! - `native` - hyper server on tokio and the `gale` binary

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod app;
pub mod cache;
pub mod config;
pub mod cookie;
pub mod error;
pub mod exchange;
mod filter;
mod handler;
pub mod handlers;
pub mod parser;
pub mod render;
pub mod request;
pub mod response;
pub mod route;
pub mod session;

#[cfg(feature = "native")]
pub mod server;

// Re-exports
pub use app::{App, AppBuilder};
pub use cache::{CacheSlot, CachedFile, FileCache};
pub use config::{SessionConfig, Settings};
pub use cookie::Cookie;
pub use error::{Error, Result};
pub use exchange::Exchange;
pub use filter::REJECTION_BODY;
pub use handlers::{FileServer, FORBIDDEN_BODY, NOT_FOUND_BODY};
pub use parser::{BodyParser, DefaultBodyParser, Multipart, ParsedBody, PostParsing, UploadedFile};
pub use render::Renderer;
pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, StatusCode};
pub use route::{Body, Route, RouteOptions, RouteTable};
pub use session::{FileStore, MemoryStore, SessionGate, SessionRecord, SessionStore};

pub use gale_router::{Expression, Mode, Params};

#[cfg(feature = "native")]
pub use server::{create_optimized_socket, from_hyper_request, to_hyper_response};

#[cfg(feature = "native")]
pub use server::{ConnectionTracker, Server, ServerConfig};
