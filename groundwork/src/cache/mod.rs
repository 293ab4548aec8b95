//! Key-value store access
//!
//! [`KeyValueStore`] is the capability services depend on: byte values with
//! an optional TTL, plus hash operations for grouping fields under one key.
//! A missing key is always reported as [`CacheError::NotFound`], whose
//! message is the [`NOT_FOUND`] sentinel whatever the backend.
//!
//! Two implementations ship with the crate: [`RedisStore`] (feature `cache`)
//! for single-node and cluster Redis, and [`MemoryStore`] for local runs and
//! tests.
//!
//! Nothing here retries. A connectivity failure surfaces immediately.
//!
//! # Example
//!
//! ```rust
//! use groundwork::cache::{KeyValueStore, KeyValueStoreExt, MemoryStore};
//! use std::time::Duration;
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let store = MemoryStore::new();
//! store.set("session:1", &vec!["a", "b"], Duration::ZERO).await.unwrap();
//!
//! let value: Vec<String> = store.get_json("session:1").await.unwrap();
//! assert_eq!(value, vec!["a", "b"]);
//!
//! let err = store.get("session:2").await.unwrap_err();
//! assert!(err.is_not_found());
//! # });
//! ```

mod memory;
#[cfg(feature = "cache")]
mod redis;

pub use self::memory::MemoryStore;
#[cfg(feature = "cache")]
pub use self::redis::RedisStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Message carried by every not-found error
pub const NOT_FOUND: &str = "redis: nil";

/// Key-value store error
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key does not exist (or has expired)
    #[error("{}", NOT_FOUND)]
    NotFound {
        /// The missing key
        key: String,
    },

    /// A value could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The key holds a value of another type (e.g. a hash where bytes were expected)
    #[error("wrong type for key {key}")]
    WrongType {
        /// The offending key
        key: String,
    },

    /// The backend failed
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// Whether this is the not-found sentinel
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Key-value capability
///
/// A TTL of [`Duration::ZERO`] means the value never expires.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    /// Store raw bytes under `key`
    async fn set_raw(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Set fields of the hash at `key`, creating it if needed
    ///
    /// An empty map is a no-op.
    async fn hset(&self, key: &str, fields: &HashMap<String, String>) -> Result<(), CacheError>;

    /// Every field of the hash at `key`; empty when the key is missing
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    /// Number of fields in the hash at `key`
    async fn hlen(&self, key: &str) -> Result<u64, CacheError>;

    /// Remove one field from the hash at `key`, returning how many were removed
    async fn hdel(&self, key: &str, field: &str) -> Result<u64, CacheError>;

    /// Check connectivity
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Serde helpers over any [`KeyValueStore`]
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Store `value` as JSON
    async fn set<V>(&self, key: &str, value: &V, ttl: Duration) -> Result<(), CacheError>
    where
        V: Serialize + Sync + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.set_raw(key, &bytes, ttl).await
    }

    /// Load a JSON value
    async fn get_json<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        let bytes = self.get(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
