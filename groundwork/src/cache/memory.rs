//! In-process key-value store

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheError, KeyValueStore};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// [`KeyValueStore`] held in memory, honoring TTLs
///
/// Clones share the same data. Expired keys are dropped when next touched.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.entries.len()
    }

    /// Whether no live keys remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.purge_expired(key);
        let entry = self.entries.get(key).ok_or_else(|| CacheError::NotFound {
            key: key.to_string(),
        })?;
        match &entry.value {
            Value::Bytes(bytes) => Ok(bytes.clone()),
            Value::Hash(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn set_raw(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value.to_vec()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &HashMap<String, String>) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.purge_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(hash) => {
                hash.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            }
            Value::Bytes(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.purge_expired(key);
        match self.entries.get(key).as_deref() {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn hlen(&self, key: &str) -> Result<u64, CacheError> {
        Ok(self.hget_all(key).await?.len() as u64)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64, CacheError> {
        self.purge_expired(key);
        let removed = match self.entries.get_mut(key) {
            None => 0,
            Some(mut entry) => match &mut entry.value {
                Value::Hash(hash) => u64::from(hash.remove(field).is_some()),
                Value::Bytes(_) => {
                    return Err(CacheError::WrongType {
                        key: key.to_string(),
                    })
                }
            },
        };
        // An emptied hash no longer exists
        self.entries
            .remove_if(key, |_, entry| matches!(&entry.value, Value::Hash(h) if h.is_empty()));
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
