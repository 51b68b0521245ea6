//! In-memory file cache
//!
//! Holds small files together with a pre-compressed gzip copy. A path that
//! was found missing is remembered as [`CacheSlot::Missing`] so repeated
//! misses skip the filesystem. Entries are never revalidated against disk;
//! [`FileCache::clear`] is the only way to pick up changes.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Slack allowed when comparing against `If-Modified-Since`
///
/// HTTP dates carry whole seconds while mtimes do not.
const FRESHNESS_TOLERANCE: Duration = Duration::from_secs(1);

/// A cached file body with its gzip copy
#[derive(Debug, Clone)]
pub struct CachedFile {
    pub data: Bytes,
    pub gzip: Bytes,
    pub etag: String,
    pub mtime: SystemTime,
}

impl CachedFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Cache entry
#[derive(Debug, Clone)]
pub enum CacheSlot {
    File(Arc<CachedFile>),
    /// The path did not exist when last looked up
    Missing,
}

/// Path-keyed file cache
pub struct FileCache {
    entries: RwLock<HashMap<PathBuf, CacheSlot>>,
    threshold: u64,
}

impl FileCache {
    /// Cache files strictly smaller than `threshold` bytes (0 disables caching)
    pub fn new(threshold: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            threshold,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }

    /// Would a file of `size` bytes be cached?
    pub fn accepts(&self, size: u64) -> bool {
        self.threshold > size
    }

    pub fn get(&self, path: &Path) -> Option<CacheSlot> {
        if !self.is_enabled() {
            return None;
        }
        self.entries.read().get(path).cloned()
    }

    pub fn put(&self, path: PathBuf, file: CachedFile) -> Arc<CachedFile> {
        let file = Arc::new(file);
        if self.is_enabled() {
            self.entries.write().insert(path, CacheSlot::File(file.clone()));
        }
        file
    }

    pub fn put_missing(&self, path: PathBuf) {
        if self.is_enabled() {
            self.entries.write().insert(path, CacheSlot::Missing);
        }
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries.write().remove(path);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
        tracing::debug!("File cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Is a client copy validated by `if_modified_since` still fresh for `mtime`?
///
/// Fresh when the two times lie within [`FRESHNESS_TOLERANCE`] of each
/// other, whichever is later. An absent or unparsable header counts as the
/// epoch.
pub fn is_fresh(mtime: SystemTime, if_modified_since: Option<&str>) -> bool {
    let since = if_modified_since
        .and_then(|value| DateTime::parse_from_rfc2822(value.trim()).ok())
        .map(SystemTime::from)
        .unwrap_or(UNIX_EPOCH);

    let distance = match mtime.duration_since(since) {
        Ok(ahead) => ahead,
        Err(behind) => behind.duration(),
    };
    distance < FRESHNESS_TOLERANCE
}

/// Format a filesystem time as an HTTP date
pub fn last_modified(mtime: SystemTime) -> String {
    crate::cookie::http_date(DateTime::<Utc>::from(mtime))
}

/// Entity tag for a file
///
/// Unix builds use the inode; elsewhere mtime and size stand in.
pub fn etag(meta: &std::fs::Metadata) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.ino().to_string()
    }
    #[cfg(not(unix))]
    {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("{:x}-{:x}", mtime, meta.len())
    }
}

/// Gzip a buffer
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Gzip on the blocking pool
pub async fn gzip_blocking(data: Bytes) -> crate::Result<Bytes> {
    let compressed = tokio::task::spawn_blocking(move || gzip(&data))
        .await
        .map_err(|e| crate::Error::Internal(format!("gzip task failed: {}", e)))??;
    Ok(Bytes::from(compressed))
}
