//! KeyStore: the single keyspace holding users, credentials, username mappings,
//! resumes and reset tokens.
//!
//! The store offers single-key operations only. There are no multi-key
//! transactions: callers that touch several keys write them as an ordered,
//! re-runnable sequence. `set_if_absent` is the one conditional primitive and is
//! required to be atomic by every backend.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod keys;
pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error for key '{key}': {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One bounded batch of a cursor scan. `next_cursor == None` means the scan is complete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Sets the value with an expiry. Expired keys read as absent.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Atomic set-if-not-exists. Returns `true` when this call wrote the value.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Returns `true` when a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Cursor scan over keys matching `pattern` (a prefix followed by `*`).
    /// `cursor == None` starts a new scan. `count` is a batch-size hint; a page may
    /// hold fewer keys (even zero) while the scan is still incomplete.
    async fn scan(
        &self,
        pattern: &str,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<ScanPage, StoreError>;
}

/// Reads a JSON value stored under `key`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Serde {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize>(
    store: &dyn KeyStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = encode(key, value)?;
    store.set(key, &raw).await
}

pub async fn set_json_with_ttl<T: Serialize>(
    store: &dyn KeyStore,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<(), StoreError> {
    let raw = encode(key, value)?;
    store.set_with_ttl(key, &raw, ttl_secs).await
}

pub async fn set_json_if_absent<T: Serialize>(
    store: &dyn KeyStore,
    key: &str,
    value: &T,
) -> Result<bool, StoreError> {
    let raw = encode(key, value)?;
    store.set_if_absent(key, &raw).await
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Serde {
        key: key.to_string(),
        source,
    })
}

/// Matches the glob subset the keyspace uses: an exact key, or a prefix ending in `*`.
pub(crate) fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}
