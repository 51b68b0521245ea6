//! File-per-session store
//!
//! Each session is a JSON file named after its id. Nothing expires files on
//! its own; call [`FileStore::clear`] periodically.

use super::{now_ms, SessionRecord, SessionStore};
use crate::{Error, Result};
use futures_util::future::{BoxFuture, FutureExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sessions stored as `<dir>/<id>` JSON files
pub struct FileStore {
    dir: PathBuf,
    /// Length of ids minted by the gate; other files are left alone by `clear`
    id_length: usize,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, id_length: usize) -> Self {
        Self {
            dir: dir.into(),
            id_length,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(Error::Store(format!("invalid session id: {:?}", id)));
        }
        Ok(self.dir.join(id))
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        let path = self.path_for(id)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Store(format!("read {}: {}", path.display(), e))),
        };

        match serde_json::from_slice(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(id, error = %e, "Corrupt session file ignored");
                Ok(None)
            }
        }
    }

    async fn store(&self, id: &str, record: SessionRecord) -> Result<()> {
        let path = self.path_for(id)?;
        let data = serde_json::to_vec(&record)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::Store(format!("write {}: {}", path.display(), e)))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Store(format!("unlink {}: {}", path.display(), e))),
        }
    }

    /// Delete session files minted more than 24×`timeout` ago
    ///
    /// The age comes from the base36 timestamp that prefixes every id, so a
    /// session that is still in use is removed once it gets that old.
    pub async fn clear(&self, timeout: Duration) -> Result<usize> {
        let expire = now_ms() - (timeout * 24).as_millis() as i64;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.len() != self.id_length {
                continue;
            }
            let stamp = match name.find('-') {
                Some(idx) if idx > 0 => i64::from_str_radix(&name[..idx], 36).unwrap_or(0),
                _ => continue,
            };

            if stamp > 0 && stamp < expire {
                match self.remove(&name).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(id = %name, error = %e, "Failed to remove session"),
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, dir = %self.dir.display(), "Expired session files removed");
        }
        Ok(removed)
    }
}

impl SessionStore for FileStore {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<SessionRecord>>> {
        self.load(id).boxed()
    }

    fn set<'a>(&'a self, id: &'a str, record: SessionRecord) -> BoxFuture<'a, Result<()>> {
        self.store(id, record).boxed()
    }

    fn del<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.remove(id).boxed()
    }
}
