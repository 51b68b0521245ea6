//! Built-in responders
//!
//! File serving with the in-memory cache and directory listings.

pub mod listing;
pub mod static_files;

pub use listing::render_listing;
pub use static_files::{FileServer, FORBIDDEN_BODY, NOT_FOUND_BODY};
