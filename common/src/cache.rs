use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::ScrapeError;
use crate::time::now_ms;

/// The cache/stream broker's key-value surface: atomic reservation (`SET NX EX`), timed
/// values (`SETEX`), plain reads/deletes and prefix scans for maintenance sweeps.
///
/// Every caller treats a `CacheDegraded` error as non-fatal: proxy reservation falls back to
/// the in-process mutex, dedup falls back to "assume not seen", and the caller logs and
/// proceeds rather than failing the task outright.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Sets `key` to `value` only if absent, with a `ttl_secs` expiry. Returns `true` if the
    /// key was set by this call (the reservation was acquired).
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, ScrapeError>;

    async fn setex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ScrapeError>;

    async fn get(&self, key: &str) -> Result<Option<String>, ScrapeError>;

    async fn del(&self, key: &str) -> Result<(), ScrapeError>;

    /// Lists keys matching `prefix*`. Used only by background maintenance, never on a hot path.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, ScrapeError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ScrapeError>;
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, ScrapeError> {
        let client = redis::Client::open(url).map_err(ScrapeError::from)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(ScrapeError::from)?;
        Ok(Self { conn })
    }

    pub fn raw(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, ScrapeError> {
        let mut conn = self.conn.clone();
        let ok: bool = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(ScrapeError::from)?
            .is_some();
        Ok(ok)
    }

    async fn setex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ScrapeError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(ScrapeError::from)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ScrapeError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(ScrapeError::from)
    }

    async fn del(&self, key: &str) -> Result<(), ScrapeError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(ScrapeError::from)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, ScrapeError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(ScrapeError::from)?;
            out.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(out)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ScrapeError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(ScrapeError::from)
    }
}

struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

/// Single-process fallback used in tests and whenever the redis broker is unreachable at
/// startup. Never used across replicas — reservation guarantees only hold within one process.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(e: &Entry, now: i64) -> bool {
        e.expires_at_ms.map(|exp| exp > now).unwrap_or(true)
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, ScrapeError> {
        let now = now_ms();
        let mut guard = self.inner.lock();
        if let Some(existing) = guard.get(key) {
            if Self::is_live(existing, now) {
                return Ok(false);
            }
        }
        guard.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms: Some(now + ttl_secs as i64 * 1000),
            },
        );
        Ok(true)
    }

    async fn setex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ScrapeError> {
        let now = now_ms();
        self.inner.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms: Some(now + ttl_secs as i64 * 1000),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ScrapeError> {
        let now = now_ms();
        let guard = self.inner.lock();
        Ok(guard
            .get(key)
            .filter(|e| Self::is_live(e, now))
            .map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), ScrapeError> {
        self.inner.lock().remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, ScrapeError> {
        let now = now_ms();
        let guard = self.inner.lock();
        Ok(guard
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && Self::is_live(e, now))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn publish(&self, _channel: &str, _payload: &str) -> Result<(), ScrapeError> {
        // No subscribers in-process; advisory wake-ups are a latency optimization only.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_ex_rejects_second_writer_until_expiry() {
        let cache = InMemoryCache::new();
        assert!(cache.set_nx_ex("k", "a", 60).await.unwrap());
        assert!(!cache.set_nx_ex("k", "b", 60).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn del_allows_reacquisition() {
        let cache = InMemoryCache::new();
        assert!(cache.set_nx_ex("k", "a", 60).await.unwrap());
        cache.del("k").await.unwrap();
        assert!(cache.set_nx_ex("k", "b", 60).await.unwrap());
    }

    #[tokio::test]
    async fn scan_prefix_filters_by_prefix() {
        let cache = InMemoryCache::new();
        cache.setex("proxy:blocked:1", "x", 60).await.unwrap();
        cache.setex("proxy:blocked:2", "x", 60).await.unwrap();
        cache.setex("other:1", "x", 60).await.unwrap();
        let mut keys = cache.scan_prefix("proxy:blocked:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["proxy:blocked:1", "proxy:blocked:2"]);
    }
}
