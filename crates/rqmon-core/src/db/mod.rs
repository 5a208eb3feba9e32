//! Metric source layer for RQMon
//!
//! The engine only ever sees the [`MetricSource`] trait; the Redis
//! implementation reads Resque's key layout.

mod redis;

pub use self::redis::{RedisMetricSource, RedisPool};

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::FailureRecord;

/// Read-only view of the queueing store
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Names of all known queues
    async fn list_queues(&self) -> Result<Vec<String>>;

    /// Current length of one queue
    async fn queue_length(&self, queue: &str) -> Result<i64>;

    /// Every entry of the failed-job list
    async fn failure_records(&self) -> Result<Vec<FailureRecord>>;
}

/// Count failure records per job class
pub fn bucket_failures(records: &[FailureRecord]) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.class.clone()).or_insert(0) += 1;
    }
    counts
}
