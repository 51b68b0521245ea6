//! Static file serving
//!
//! Resolves urls under the web root (or a module home), answers conditional
//! GETs with 304, and serves small files from the [`FileCache`] with a gzip
//! copy for clients that accept it.

use crate::cache::{etag, gzip_blocking, last_modified, CacheSlot, CachedFile, FileCache};
use crate::config::Settings;
use crate::exchange::Exchange;
use crate::handlers::listing::render_listing;
use crate::{Result, StatusCode};
use bytes::Bytes;
use gale_router::{decode_component, ModuleMap};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Body of the 403 page
pub const FORBIDDEN_BODY: &str = "Access forbidden!";
/// Body of the default 404 page
pub const NOT_FOUND_BODY: &str = "File not found!";

/// Serves files from the web root
pub struct FileServer {
    cache: FileCache,
    home: PathBuf,
    default_page: Option<String>,
    list_dir: bool,
    not_found_template: Option<String>,
}

/// Sanitize a request path to prevent directory traversal
///
/// Hidden (`.`-prefixed) segments and `..` are rejected.
fn sanitize_path(path: &str) -> Option<PathBuf> {
    let path = path.trim_start_matches('/');

    if path.split('/').any(|s| s.starts_with('.')) {
        return None;
    }

    let mut result = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::ParentDir => return None,
            _ => {}
        }
    }

    Some(result)
}

/// Url without its query string
fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(idx) if idx > 0 => &url[..idx],
        _ => url,
    }
}

impl FileServer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            cache: FileCache::new(settings.file_cache_size),
            home: settings.home.clone(),
            default_page: settings.default_page.clone(),
            list_dir: settings.list_dir,
            not_found_template: settings.not_found_template.clone(),
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Map a url to a physical path
    ///
    /// A url whose first segment names a module resolves under that module's
    /// home with the name removed.
    pub fn resolve(&self, url: &str, modules: &ModuleMap) -> Option<PathBuf> {
        let path = strip_query(url);
        let decoded = decode_component(path).unwrap_or_else(|| path.to_string());

        match modules.resolve(&decoded) {
            Some(module) => Some(module.home.join(sanitize_path(&module.file)?)),
            None => Some(self.home.join(sanitize_path(&decoded)?)),
        }
    }

    /// Serve `url` into the exchange's response
    pub async fn serve(&self, ex: &Exchange, url: &str) -> Result<()> {
        let Some(mut path) = self.resolve(url, &ex.table().modules) else {
            tracing::debug!(url, "Rejected file path");
            return self.write_404(ex).await;
        };
        let url = strip_query(url);

        loop {
            match self.cache.get(&path) {
                Some(CacheSlot::Missing) => return self.write_404(ex).await,
                Some(CacheSlot::File(file)) => {
                    self.send_cached(ex, &path, &file);
                    return Ok(());
                }
                None => {}
            }

            let meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(_) => {
                    tracing::debug!(path = %path.display(), "File not found");
                    self.cache.put_missing(path);
                    return self.write_404(ex).await;
                }
            };

            if meta.is_file() {
                return self.send_file(ex, path, &meta).await;
            }
            if !meta.is_dir() {
                return self.write_404(ex).await;
            }

            match self.default_document(&path).await {
                Some(_) if !url.ends_with('/') => {
                    ex.response().redirect(&format!("{}/", url));
                    return Ok(());
                }
                Some(default) => path = default,
                None if self.list_dir => return self.write_listing(ex, &path, url).await,
                None => {
                    self.write_403(ex);
                    return Ok(());
                }
            }
        }
    }

    async fn default_document(&self, dir: &Path) -> Option<PathBuf> {
        let page = self.default_page.as_deref().filter(|p| !p.is_empty())?;
        let candidate = dir.join(page);
        tokio::fs::metadata(&candidate).await.ok()?;
        Some(candidate)
    }

    fn send_cached(&self, ex: &Exchange, path: &Path, file: &CachedFile) {
        let (gzip, fresh) = {
            let req = ex.request();
            (req.accepts_gzip(), req.is_cached(file.mtime))
        };

        let mut res = ex.response();
        res.set_status(StatusCode::OK);
        res.set_type(&path.to_string_lossy());
        res.set_header("ETag", file.etag.as_str());
        res.set_header("Last-Modified", last_modified(file.mtime));

        if self.cache.is_enabled() && fresh {
            res.send_status(StatusCode::NOT_MODIFIED);
            return;
        }

        if gzip {
            res.set_header("Content-Encoding", "gzip");
            res.set_header("Content-Length", file.gzip.len().to_string());
            res.end_with(&file.gzip);
        } else {
            res.set_header("Content-Length", file.data.len().to_string());
            res.end_with(&file.data);
        }
        tracing::debug!(path = %path.display(), "Served from cache");
    }

    async fn send_file(&self, ex: &Exchange, path: PathBuf, meta: &std::fs::Metadata) -> Result<()> {
        let mtime = meta.modified().unwrap_or(UNIX_EPOCH);
        let tag = etag(meta);

        if ex.request().is_cached(mtime) {
            let mut res = ex.response();
            res.set_header("ETag", tag.as_str());
            res.send_status(StatusCode::NOT_MODIFIED);
            return Ok(());
        }

        let data = match tokio::fs::read(&path).await {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "File read failed");
                return self.write_404(ex).await;
            }
        };

        {
            let mut res = ex.response();
            res.set_status(StatusCode::OK);
            res.set_type(&path.to_string_lossy());
            res.set_header("ETag", tag.as_str());
            res.set_header("Last-Modified", last_modified(mtime));
            res.set_header("Content-Length", data.len().to_string());
            res.end_with(&data);
        }

        if self.cache.accepts(meta.len()) {
            match gzip_blocking(data.clone()).await {
                Ok(gzip) => {
                    self.cache.put(
                        path,
                        CachedFile {
                            data,
                            gzip,
                            etag: tag,
                            mtime,
                        },
                    );
                }
                Err(e) => tracing::warn!(error = %e, "Gzip failed, file not cached"),
            }
        }

        Ok(())
    }

    async fn write_listing(&self, ex: &Exchange, dir: &Path, url: &str) -> Result<()> {
        let host = ex.request().header("host").unwrap_or("").to_string();
        let html = match render_listing(dir, url, &host).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Directory listing failed");
                String::new()
            }
        };

        let mut res = ex.response();
        res.write_head(StatusCode::OK, &[("Content-Type", "text/html")]);
        res.end_with(html);
        Ok(())
    }

    /// Answer 403
    pub fn write_403(&self, ex: &Exchange) {
        let mut res = ex.response();
        res.write_head(StatusCode::FORBIDDEN, &[("Content-Type", "text/html")]);
        res.end_with(FORBIDDEN_BODY);
    }

    /// Answer 404, through the configured template when a renderer exists
    pub async fn write_404(&self, ex: &Exchange) -> Result<()> {
        let renderer = ex.engine().renderer.clone();

        if let (Some(template), Some(renderer)) = (&self.not_found_template, renderer) {
            match renderer.render(template, &serde_json::Value::Null).await {
                Ok(html) => {
                    let mut res = ex.response();
                    res.write_head(StatusCode::NOT_FOUND, &[("Content-Type", "text/html")]);
                    res.end_with(&html);
                    return Ok(());
                }
                Err(e) => tracing::warn!(template = %template, error = %e, "404 template failed"),
            }
        }

        let mut res = ex.response();
        res.write_head(StatusCode::NOT_FOUND, &[("Content-Type", "text/html")]);
        res.end_with(NOT_FOUND_BODY);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/css/app.css"), Some(PathBuf::from("css/app.css")));
        assert_eq!(sanitize_path("/"), Some(PathBuf::new()));
        assert_eq!(sanitize_path("/../etc/passwd"), None);
        assert_eq!(sanitize_path("/a/../../b"), None);
        assert_eq!(sanitize_path("/.git/config"), None);
    }

    #[test]
    fn test_resolve() {
        let server = FileServer::new(&Settings::new("/srv/www"));
        let mut modules = ModuleMap::new();
        modules.register("admin", "/srv/admin/web");

        assert_eq!(
            server.resolve("/css/a%20b.css?v=1", &modules),
            Some(PathBuf::from("/srv/www/css/a b.css"))
        );
        assert_eq!(
            server.resolve("/admin/js/app.js", &modules),
            Some(PathBuf::from("/srv/admin/web/js/app.js"))
        );
        assert_eq!(server.resolve("/%2e%2e/secret", &modules), None);
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("/a?b=1"), "/a");
        assert_eq!(strip_query("/a"), "/a");
    }
}
