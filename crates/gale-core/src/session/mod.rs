//! Sessions
//!
//! A session is a JSON object keyed by an id carried in a cookie. The
//! [`SessionGate`] loads or mints it before a body runs and saves it back
//! before the response is flushed. Persistence goes through the
//! [`SessionStore`] capability set; [`MemoryStore`] and [`FileStore`] are the
//! reference stores.

mod file;
mod gate;
mod memory;

pub use file::FileStore;
pub use gate::{base36, Established, SessionGate};
pub use memory::MemoryStore;

use crate::Result;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Current time in milliseconds since the epoch
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Session data plus its last access time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Milliseconds since the epoch; 0 means never accessed
    #[serde(rename = "__lastAccessTime", default)]
    pub last_access_time: i64,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl SessionRecord {
    /// An empty record accessed now
    pub fn new() -> Self {
        Self {
            last_access_time: now_ms(),
            data: Map::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn touch(&mut self) {
        self.last_access_time = now_ms();
    }

    /// Idle for longer than `timeout`, or never accessed
    pub fn is_expired(&self, timeout: Duration) -> bool {
        if self.last_access_time <= 0 {
            return true;
        }
        now_ms() - self.last_access_time > timeout.as_millis() as i64
    }
}

/// Session persistence
///
/// Failures are reported as [`crate::Error::Store`]; the gate logs them and
/// carries on without the session.
pub trait SessionStore: Send + Sync {
    /// Load a record; `Ok(None)` when the id is unknown
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<SessionRecord>>>;
    /// Store a record
    fn set<'a>(&'a self, id: &'a str, record: SessionRecord) -> BoxFuture<'a, Result<()>>;
    /// Remove a record
    fn del<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;
}
