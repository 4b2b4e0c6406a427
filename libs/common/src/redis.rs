//! Redis client module with connection pooling
//!
//! Provides the binary-safe list commands the Redis channel backend needs.

use anyhow::{Context, Result};
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use std::sync::Arc;
use std::time::Duration;

/// Redis connection pool configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections
    pub min_idle: Option<u32>,
    /// Connection timeout in seconds
    pub connection_timeout: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            // one blocking reader per class plus producers
            max_connections: 8,
            min_idle: Some(1),
            connection_timeout: 5,
        }
    }
}

impl RedisConfig {
    /// Create config from URL with default pool settings
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Redis asynchronous client with connection pooling
pub struct RedisClient {
    pool: Arc<Pool<RedisConnectionManager>>,
    url: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &self.url)
            .field("pool_state", &self.pool.state())
            .finish()
    }
}

impl RedisClient {
    /// Create a new client and verify the server answers PING
    pub async fn with_config(config: RedisConfig) -> Result<Self> {
        let client = Self::with_config_no_ping(config).await?;
        client.ping().await?;
        Ok(client)
    }

    /// Create a client without performing a PING test
    pub async fn with_config_no_ping(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .context("Failed to create Redis connection manager")?;

        let mut pool_builder = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout));

        if let Some(min_idle) = config.min_idle {
            pool_builder = pool_builder.min_idle(Some(min_idle));
        }

        let pool = pool_builder
            .build(manager)
            .await
            .context("Failed to build Redis connection pool")?;

        Ok(Self {
            pool: Arc::new(pool),
            url: config.url,
        })
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .context("Failed to get connection from pool")
    }

    /// PING operation - test connection
    pub async fn ping(&self) -> Result<String> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .context("Failed to PING Redis server")
    }

    /// RPUSH operation - append a binary element to the list tail
    pub async fn rpush(&self, key: &str, value: &[u8]) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to RPUSH to key: {}", key))
    }

    /// LPOP operation - pop the list head without waiting
    pub async fn lpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        redis::cmd("LPOP")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to LPOP key: {}", key))
    }

    /// BLPOP operation - blocking pop of a single list
    ///
    /// Returns `None` when `timeout_secs` elapses without data. A timeout of
    /// zero blocks indefinitely on the server side.
    pub async fn blpop(&self, key: &str, timeout_secs: u64) -> Result<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        let popped: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout_secs)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to BLPOP from key: {}", key))?;
        Ok(popped.map(|(_, value)| value))
    }

    /// LLEN operation - current list length
    pub async fn llen(&self, key: &str) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to LLEN key: {}", key))
    }

}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_config_from_url() {
        let config = RedisConfig::from_url("redis://10.0.0.2:6380");
        assert_eq!(config.url, "redis://10.0.0.2:6380");
        assert_eq!(config.max_connections, 8);
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_list_round_trip() {
        let client = RedisClient::with_config(RedisConfig::from_url("redis://localhost:6379"))
            .await
            .unwrap();
        let key = "telesink:test:list";
        while client.lpop(key).await.unwrap().is_some() {}

        client.rpush(key, b"first").await.unwrap();
        client.rpush(key, &[0xff, 0x00, 0x01]).await.unwrap();
        assert_eq!(client.llen(key).await.unwrap(), 2);

        assert_eq!(client.lpop(key).await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(
            client.blpop(key, 1).await.unwrap(),
            Some(vec![0xff, 0x00, 0x01])
        );
        assert_eq!(client.blpop(key, 1).await.unwrap(), None);
    }
}
