//! Redis-backed key-value store

use ::redis::cluster::ClusterClient;
use ::redis::cluster_async::ClusterConnection;
use ::redis::{Cmd, FromRedisValue, RedisError};
use async_trait::async_trait;
use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
use std::collections::HashMap;
use std::ops::DerefMut;
use std::time::Duration;

use super::{CacheError, KeyValueStore};
use crate::config::RedisConfig;
use crate::error::sanitize_url;

#[derive(Clone)]
enum Client {
    Single(Pool),
    Cluster(ClusterConnection),
}

/// [`KeyValueStore`] on Redis, single-node or cluster
///
/// Single-node mode uses a connection pool; cluster mode shares one
/// multiplexed cluster connection. Cloning is cheap.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.client {
            Client::Single(_) => "single",
            Client::Cluster(_) => "cluster",
        };
        f.debug_struct("RedisStore").field("mode", &mode).finish()
    }
}

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

impl RedisStore {
    /// Connect and ping once
    ///
    /// TLS (`rediss://`) is used unless `local` is set. A failed ping is
    /// returned immediately; there is no retry.
    pub async fn connect(config: &RedisConfig, local: bool) -> Result<Self, CacheError> {
        let url = config.url(!local);

        let client = if config.cluster_mode {
            let cluster = ClusterClient::new(vec![url.as_str()])?;
            Client::Cluster(cluster.get_async_connection().await.map_err(|e| {
                tracing::error!(url = %sanitize_url(&url), error = %e, "Failed to connect to Redis cluster");
                CacheError::from(e)
            })?)
        } else {
            let pool = DeadpoolConfig::from_url(url.as_str())
                .builder()
                .map_err(|e| CacheError::Backend(format!("Failed to build Redis pool: {}", e)))?
                .max_size(config.max_connections)
                .wait_timeout(Some(Duration::from_secs(config.connection_timeout_secs)))
                .runtime(Runtime::Tokio1)
                .build()
                .map_err(|e| CacheError::Backend(format!("Failed to create Redis pool: {}", e)))?;
            Client::Single(pool)
        };

        let store = Self { client };
        if let Err(e) = store.ping().await {
            tracing::error!(url = %sanitize_url(&url), error = %e, "Failed to ping Redis");
            return Err(e);
        }

        tracing::info!(
            "Redis store connected: cluster={}, tls={}, max_connections={}",
            config.cluster_mode,
            !local,
            config.max_connections
        );
        Ok(store)
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, CacheError> {
        match &self.client {
            Client::Single(pool) => {
                let mut conn = pool
                    .get()
                    .await
                    .map_err(|e| CacheError::Backend(format!("Failed to get Redis connection: {}", e)))?;
                Ok(cmd.query_async(conn.deref_mut()).await?)
            }
            Client::Cluster(conn) => {
                let mut conn = conn.clone();
                Ok(cmd.query_async(&mut conn).await?)
            }
        }
    }
}

fn wrong_type(key: &str, err: CacheError) -> CacheError {
    match err {
        CacheError::Backend(msg) if msg.contains("WRONGTYPE") => CacheError::WrongType {
            key: key.to_string(),
        },
        other => other,
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let value: Option<Vec<u8>> = self
            .query(::redis::cmd("GET").arg(key))
            .await
            .map_err(|e| wrong_type(key, e))?;
        value.ok_or_else(|| CacheError::NotFound {
            key: key.to_string(),
        })
    }

    async fn set_raw(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if !ttl.is_zero() {
            cmd.arg("PX").arg(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        }
        self.query::<()>(&cmd).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let _: i64 = self.query(::redis::cmd("DEL").arg(key)).await?;
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &HashMap<String, String>) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = ::redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: i64 = self.query(&cmd).await.map_err(|e| wrong_type(key, e))?;
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.query(::redis::cmd("HGETALL").arg(key))
            .await
            .map_err(|e| wrong_type(key, e))
    }

    async fn hlen(&self, key: &str) -> Result<u64, CacheError> {
        self.query(::redis::cmd("HLEN").arg(key))
            .await
            .map_err(|e| wrong_type(key, e))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64, CacheError> {
        self.query(::redis::cmd("HDEL").arg(key).arg(field))
            .await
            .map_err(|e| wrong_type(key, e))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let _: String = self.query(&::redis::cmd("PING")).await?;
        Ok(())
    }
}
