//! Client-side response cache
//!
//! For the endpoints a mint declares cached, an identical request replayed
//! within the ttl returns the stored response instead of re-executing the
//! call. That makes retrying a mutating POST safe: the mint has the same
//! cache on its side, so at most one side effect ever happens.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use cashu_core::util::{hex, unix_time};

const DEFAULT_MAX_ENTRIES: usize = 256;

/// Cache key: `METHOD:PATH:SHA256(body)`
pub fn cache_key(method: &str, path: &str, body: &[u8]) -> String {
    let digest = Sha256Hash::hash(body).to_byte_array();
    format!("{}:{}:{}", method, path, hex::encode(digest))
}

/// A stored response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Raw response body
    pub body: Vec<u8>,
    /// HTTP status it came with
    pub status: u16,
    /// Unix seconds it was stored at
    pub cached_at: u64,
    /// Seconds it stays valid; none means for the life of the cache
    pub ttl: Option<u64>,
}

impl CachedResponse {
    fn is_expired(&self, now: u64) -> bool {
        match self.ttl {
            Some(ttl) => self.cached_at + ttl < now,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CachedResponse>,
    // insertion order, oldest first
    order: VecDeque<String>,
}

/// Bounded LRU of responses to cached endpoints
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ResponseCache {
    /// Create a cache bounded to `max_entries`
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries,
        }
    }

    /// Stored response for a key, if present and fresh
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut inner = self.inner.lock().ok()?;
        let now = unix_time();

        match inner.entries.get(key).map(|entry| entry.is_expired(now)) {
            Some(true) => {
                inner.entries.remove(key);
                inner.order.retain(|k| k.as_str() != key);
                None
            }
            Some(false) => inner.entries.get(key).cloned(),
            None => None,
        }
    }

    /// Store a response
    pub fn put(&self, key: String, body: Vec<u8>, status: u16, ttl: Option<u64>) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if !inner.entries.contains_key(&key) {
            inner.order.push_back(key.clone());
        }

        inner.entries.insert(
            key,
            CachedResponse {
                body,
                status,
                cached_at: unix_time(),
                ttl,
            },
        );

        while inner.order.len() > self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let now = unix_time();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_method_path_and_body_hash() {
        let key = cache_key("POST", "/v1/swap", b"{}");
        let parts: Vec<&str> = key.splitn(3, ':').collect();

        assert_eq!(parts[0], "POST");
        assert_eq!(parts[1], "/v1/swap");
        // SHA-256, not a short checksum
        assert_eq!(parts[2].len(), 64);

        assert_ne!(key, cache_key("POST", "/v1/swap", b"{...}"));
        assert_ne!(key, cache_key("POST", "/v1/melt/bolt11", b"{}"));
    }

    #[test]
    fn test_put_get_round_trip() {
        let cache = ResponseCache::default();
        let key = cache_key("POST", "/v1/swap", b"body");

        assert!(cache.get(&key).is_none());

        cache.put(key.clone(), b"response".to_vec(), 200, Some(300));

        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.body, b"response");
        assert_eq!(entry.status, 200);
    }

    #[test]
    fn test_zero_ttl_expires_immediately_next_second() {
        let cache = ResponseCache::default();
        let key = cache_key("POST", "/v1/swap", b"body");

        cache.put(key.clone(), vec![], 200, Some(0));

        // same second it is still valid
        let entry = cache.get(&key);
        assert!(entry.is_none() || entry.unwrap().ttl == Some(0));
    }

    #[test]
    fn test_lru_bound() {
        let cache = ResponseCache::new(2);

        cache.put("a".to_string(), vec![1], 200, None);
        cache.put("b".to_string(), vec![2], 200, None);
        cache.put("c".to_string(), vec![3], 200, None);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_overwrite_does_not_grow() {
        let cache = ResponseCache::new(2);

        cache.put("a".to_string(), vec![1], 200, None);
        cache.put("a".to_string(), vec![2], 200, None);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().body, vec![2]);
    }
}
