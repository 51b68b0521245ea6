//! In-memory session store

use super::{now_ms, SessionRecord, SessionStore};
use crate::Result;
use futures_util::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Shortest interval between two sweeps
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Sessions kept in a process-local map
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drop records idle for longer than `max_idle`, returning how many went
    pub fn sweep(&self, max_idle: Duration) -> usize {
        let cutoff = now_ms() - max_idle.as_millis() as i64;
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, record| record.last_access_time > 0 && record.last_access_time >= cutoff);
        before - sessions.len()
    }

    /// Sweep every 4×`timeout`, evicting records idle longer than 2×`timeout`
    ///
    /// The period never drops below [`MIN_SWEEP_PERIOD`]. The task ends once
    /// the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, timeout: Duration) -> tokio::task::JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        let period = (timeout * 4).max(MIN_SWEEP_PERIOD);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let evicted = store.sweep(timeout * 2);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = store.len(), "Session sweep");
                }
            }
        })
    }
}

impl SessionStore for MemoryStore {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<SessionRecord>>> {
        future::ready(Ok(self.sessions.read().get(id).cloned())).boxed()
    }

    fn set<'a>(&'a self, id: &'a str, record: SessionRecord) -> BoxFuture<'a, Result<()>> {
        self.sessions.write().insert(id.to_string(), record);
        future::ready(Ok(())).boxed()
    }

    fn del<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.sessions.write().remove(id);
        future::ready(Ok(())).boxed()
    }
}
