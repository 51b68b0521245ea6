//! Module home directories
//!
//! A module maps the first url segment to its own web root:
//! `/blog/js/app.js` with module `blog -> ./mod/blog/web` resolves to
//! `./mod/blog/web/js/app.js`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Module resolved from a url
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMatch {
    /// Module name (first url segment)
    pub name: String,
    /// Module home directory
    pub home: PathBuf,
    /// Remainder of the url path, starting with `/` (empty for `/name`)
    pub file: String,
}

impl ModuleMatch {
    /// Physical path of the remainder inside the module home
    pub fn physical_path(&self) -> PathBuf {
        self.home.join(self.file.trim_start_matches('/'))
    }
}

/// Registered modules
#[derive(Debug, Clone, Default)]
pub struct ModuleMap {
    modules: HashMap<String, PathBuf>,
}

impl ModuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module, returning the home it replaced
    pub fn register(&mut self, name: &str, home: impl AsRef<Path>) -> Option<PathBuf> {
        let name = name.strip_prefix('/').unwrap_or(name);
        if name.is_empty() {
            return None;
        }
        self.modules.insert(name.to_string(), home.as_ref().to_path_buf())
    }

    /// Find the module owning a url
    pub fn resolve(&self, url: &str) -> Option<ModuleMatch> {
        let path = url.strip_prefix('/').unwrap_or(url);
        let path = path.split('?').next().unwrap_or(path);

        let (name, file) = match path.find('/') {
            Some(idx) => (&path[..idx], &path[idx..]),
            None => (path, ""),
        };

        self.modules.get(name).map(|home| ModuleMatch {
            name: name.to_string(),
            home: home.clone(),
            file: file.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
