use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{matches_pattern, KeyStore, ScanPage, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// In-process keyspace backed by an ordered map.
///
/// Scan cursors are the last key returned, so a scan resumes in key order and
/// tolerates inserts and deletes between pages the same way a Redis SCAN does
/// (entries may be missed or seen once more, never corrupted).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys in order. Test inspection only.
    #[cfg(test)]
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, StoreError> {
        let now = Instant::now();
        let count = count.max(1);
        let entries = self.entries.read().await;

        let lower = match cursor {
            Some(c) => Bound::Excluded(c.to_string()),
            None => Bound::Unbounded,
        };

        let mut matched = entries
            .range((lower, Bound::Unbounded))
            .filter(|(k, e)| matches_pattern(pattern, k) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .take(count + 1)
            .collect::<Vec<_>>();

        let next_cursor = if matched.len() > count {
            matched.truncate(count);
            matched.last().cloned()
        } else {
            None
        };

        Ok(ScanPage {
            keys: matched,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));
        assert!(store.exists("a").await.unwrap());
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_if_absent_only_writes_once() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("user:name:alice", "u1").await.unwrap());
        assert!(!store.set_if_absent("user:name:alice", "u2").await.unwrap());
        assert_eq!(
            store.get("user:name:alice").await.unwrap(),
            Some("u1".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_entry() {
        let store = MemoryStore::new();
        store.set_with_ttl("password-reset:t", "v", 60).await.unwrap();
        assert!(store.exists("password-reset:t").await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("password-reset:t").await.unwrap(), None);
        assert!(store.set_if_absent("password-reset:t", "w").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_pages_through_matching_keys() {
        let store = MemoryStore::new();
        for name in ["alice", "bob", "carol", "dave", "erin"] {
            store.set(&format!("user:name:{name}"), "uid").await.unwrap();
        }
        store.set("user:id:someone", "{}").await.unwrap();
        store.set("resume:someone", "{}").await.unwrap();

        let mut cursor: Option<String> = None;
        let mut seen = Vec::new();
        let mut pages = 0;
        loop {
            let page = store
                .scan("user:name:*", cursor.as_deref(), 2)
                .await
                .unwrap();
            assert!(page.keys.len() <= 2);
            seen.extend(page.keys);
            pages += 1;
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(
            seen,
            vec![
                "user:name:alice",
                "user:name:bob",
                "user:name:carol",
                "user:name:dave",
                "user:name:erin"
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_empty_keyspace_completes() {
        let store = MemoryStore::new();
        let page = store.scan("user:name:*", None, 10).await.unwrap();
        assert!(page.keys.is_empty());
        assert_eq!(page.next_cursor, None);
    }
}
