//! Redis implementation of the distributed cache tier.
//! Opening the client does not connect; every call acquires a multiplexed
//! connection, so an unreachable server surfaces as per-call errors.

use crate::backend::DistributedBackend;
use async_trait::async_trait;
use redis::AsyncCommands;
use storefront_core::config::RedisConfig;
use storefront_core::{InsightsError, InsightsResult};
use tracing::info;

fn cache_err(e: redis::RedisError) -> InsightsError {
    InsightsError::Cache(e.to_string())
}

/// Redis-backed distributed cache tier.
pub struct RedisBackend {
    client: redis::Client,
}

impl RedisBackend {
    pub fn open(config: &RedisConfig) -> InsightsResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Opening Redis client");
        let client = redis::Client::open(url.as_str()).map_err(cache_err)?;
        Ok(Self { client })
    }

    /// Verify connectivity.
    pub async fn ping(&self) -> InsightsResult<()> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;
        info!(response = %pong, "Redis connection established");
        Ok(())
    }

    async fn connection(&self) -> InsightsResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(cache_err)
    }
}

#[async_trait]
impl DistributedBackend for RedisBackend {
    async fn get(&self, key: &str) -> InsightsResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(cache_err)
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> InsightsResult<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(cache_err)
    }

    async fn del(&self, key: &str) -> InsightsResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(cache_err)
    }

    async fn keys(&self, pattern: &str) -> InsightsResult<Vec<String>> {
        let mut conn = self.connection().await?;
        conn.keys(pattern).await.map_err(cache_err)
    }

    async fn del_many(&self, keys: &[String]) -> InsightsResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(key).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(cache_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_does_not_connect() {
        let config = RedisConfig {
            urls: vec!["redis://127.0.0.1:1".to_string()],
            ..RedisConfig::default()
        };
        assert!(RedisBackend::open(&config).is_ok());
    }

    #[test]
    fn test_open_rejects_malformed_url() {
        let config = RedisConfig {
            urls: vec!["not a url".to_string()],
            ..RedisConfig::default()
        };
        assert!(RedisBackend::open(&config).is_err());
    }
}
