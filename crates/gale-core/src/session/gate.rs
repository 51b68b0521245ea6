//! Session establishment and persistence

use super::{now_ms, SessionRecord, SessionStore};
use crate::config::SessionConfig;
use crate::cookie::Cookie;
use crate::exchange::Exchange;
use rand::Rng;
use std::sync::Arc;

const CHARS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Format a number in radix 36
pub fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(CHARS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Outcome of session lookup
#[derive(Debug, Clone)]
pub struct Established {
    pub id: String,
    pub record: SessionRecord,
    /// A new id was minted and must be sent to the client
    pub fresh: bool,
}

/// Loads or mints sessions against a [`SessionStore`]
pub struct SessionGate {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionGate {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Session id: `<base36 ms>-<server id><random>` padded to the configured length
    pub fn new_id(&self) -> String {
        let mut id = base36(now_ms() as u64);
        id.push('-');
        id.push_str(&self.config.server_id);

        let mut rng = rand::thread_rng();
        while id.len() < self.config.length {
            id.push(CHARS[rng.gen_range(0..CHARS.len())] as char);
        }
        id
    }

    /// User-style id: `<base36 ms><server id>` plus `extra` random chars
    pub fn new_id_with(&self, extra: usize) -> String {
        let mut id = base36(now_ms() as u64);
        id.push_str(&self.config.server_id);

        let mut rng = rand::thread_rng();
        for _ in 0..extra {
            id.push(CHARS[rng.gen_range(0..CHARS.len())] as char);
        }
        id
    }

    /// Resolve `sid` to a live session or mint a new one
    ///
    /// Missing, wrong-length, unknown and expired ids all lead to a fresh
    /// session. Store failures are logged and treated as "absent".
    pub async fn establish(&self, sid: Option<&str>) -> Established {
        if let Some(id) = sid.filter(|id| id.len() == self.config.length) {
            match self.store.get(id).await {
                Ok(Some(mut record)) if !record.is_expired(self.config.timeout) => {
                    record.touch();
                    return Established {
                        id: id.to_string(),
                        record,
                        fresh: false,
                    };
                }
                Ok(_) => {
                    if let Err(e) = self.store.del(id).await {
                        tracing::warn!(error = %e, "Session delete failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Session lookup failed"),
            }
        }

        let id = self.new_id();
        tracing::debug!(id = %id, "New session");
        Established {
            id,
            record: SessionRecord::new(),
            fresh: true,
        }
    }

    /// Attach a session to the exchange, setting the cookie for new ones
    pub async fn ensure(&self, ex: &Exchange) {
        let sid = ex.request().cookie(&self.config.key).map(str::to_string);
        let session = self.establish(sid.as_deref()).await;

        if session.fresh {
            let mut cookie = Cookie::new(self.config.key.as_str(), session.id.as_str())
                .path("/")
                .http_only();
            if let Some(domain) = &self.config.domain {
                cookie = cookie.domain(domain.as_str());
            }
            ex.response().cookie(cookie);
        }

        let mut req = ex.request();
        req.cookies.insert(self.config.key.clone(), session.id);
        req.session = Some(session.record);
    }

    /// Persist the attached session, if any
    pub async fn save(&self, ex: &Exchange) {
        let snapshot = {
            let req = ex.request();
            match (&req.session, req.cookie(&self.config.key)) {
                (Some(record), Some(id)) => Some((id.to_string(), record.clone())),
                _ => None,
            }
        };

        let Some((id, mut record)) = snapshot else {
            return;
        };
        record.touch();
        if let Err(e) = self.store.set(&id, record).await {
            tracing::warn!(id = %id, error = %e, "Session save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;
    use std::time::Duration;

    fn gate(config: SessionConfig) -> (SessionGate, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SessionGate::new(store.clone(), config), store)
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(u64::from_str_radix(&base36(1_700_000_000_000), 36).unwrap(), 1_700_000_000_000);
    }

    #[test]
    fn test_new_id_shape() {
        let (gate, _) = gate(SessionConfig::new().server_id("s1"));
        let id = gate.new_id();

        assert_eq!(id.len(), 36);
        let (stamp, rest) = id.split_once('-').unwrap();
        assert!(u64::from_str_radix(stamp, 36).is_ok());
        assert!(rest.starts_with("s1"));
        assert!(id.bytes().all(|b| b == b'-' || CHARS.contains(&b)));
    }

    #[test]
    fn test_new_id_with() {
        let (gate, _) = gate(SessionConfig::new().server_id("s1"));
        let id = gate.new_id_with(4);
        let stamp = base36(now_ms() as u64);
        assert_eq!(id.len(), stamp.len() + 2 + 4);
        assert!(!id.contains('-'));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_mints() {
        let (gate, _) = gate(SessionConfig::new());

        let none = gate.establish(None).await;
        assert!(none.fresh);
        assert_eq!(none.id.len(), 36);

        let short = gate.establish(Some("abc")).await;
        assert!(short.fresh);
        assert_ne!(short.id, "abc");
    }

    #[tokio::test]
    async fn test_valid_session_loaded() {
        let (gate, store) = gate(SessionConfig::new());
        let id = gate.new_id();
        let mut record = SessionRecord::new();
        record.set("user", "ann");
        store.set(&id, record).await.unwrap();

        let found = gate.establish(Some(&id)).await;
        assert!(!found.fresh);
        assert_eq!(found.id, id);
        assert_eq!(found.record.get_str("user"), Some("ann"));
    }

    #[tokio::test]
    async fn test_expired_session_replaced() {
        let (gate, store) = gate(SessionConfig::new().timeout(Duration::from_secs(1)));
        let id = gate.new_id();
        let mut record = SessionRecord::new();
        record.last_access_time -= 5_000;
        store.set(&id, record).await.unwrap();

        let replaced = gate.establish(Some(&id)).await;
        assert!(replaced.fresh);
        assert_ne!(replaced.id, id);
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
