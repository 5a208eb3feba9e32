//! Redis connection pool and Resque metric reads

use async_trait::async_trait;
use deadpool_redis::{Config as PoolSettings, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use tracing::{debug, warn};

use super::MetricSource;
use crate::config::RedisConfig;
use crate::error::{Error, Result};
use crate::models::FailureRecord;

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    /// Create a new Redis connection pool
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let mut cfg = PoolSettings::from_url(&config.url);
        cfg.pool = Some(PoolConfig::new(config.max_connections));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Redis(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Reads queue lengths and failed jobs from a Resque namespace
#[derive(Clone)]
pub struct RedisMetricSource {
    pool: Pool,
    namespace: String,
}

impl RedisMetricSource {
    /// Create a metric source reading keys under `namespace`
    pub fn new(pool: &RedisPool, namespace: impl Into<String>) -> Self {
        Self {
            pool: pool.pool.clone(),
            namespace: namespace.into(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.namespace, suffix)
    }
}

#[async_trait]
impl MetricSource for RedisMetricSource {
    async fn list_queues(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let queues: Vec<String> = conn.smembers(self.key("queues")).await?;
        debug!(count = queues.len(), "Listed queues");
        Ok(queues)
    }

    async fn queue_length(&self, queue: &str) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let length: i64 = conn.llen(self.key(&format!("queue:{queue}"))).await?;
        Ok(length)
    }

    async fn failure_records(&self) -> Result<Vec<FailureRecord>> {
        let mut conn = self.pool.get().await?;
        let raw: Vec<String> = conn.lrange(self.key("failed"), 0, -1).await?;

        let records: Vec<FailureRecord> = raw.iter().map(|r| FailureRecord::parse(r)).collect();
        let unknown = records
            .iter()
            .filter(|r| r.class == crate::models::UNKNOWN_CLASS)
            .count();
        if unknown > 0 {
            warn!(unknown, "Failed jobs without a usable class were bucketed as unknown");
        }

        debug!(count = records.len(), "Read failed jobs");
        Ok(records)
    }
}
