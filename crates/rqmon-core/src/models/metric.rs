//! Metric samples and raw failure records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier used for failure records that carry no usable job class
pub const UNKNOWN_CLASS: &str = "unknown";

/// The two independently tracked entity families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    /// Work queues, checked for stalls
    Queues,
    /// Failed-job classes, checked for failure trends
    Failures,
}

impl std::fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queues => f.write_str("queues"),
            Self::Failures => f.write_str("failures"),
        }
    }
}

/// A point-in-time observation for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Queue name or job class
    pub entity: String,
    /// Queue length or failure count
    pub value: i64,
    /// When the value was read
    pub observed_at: DateTime<Utc>,
}

impl Sample {
    /// Create a sample observed at `observed_at`
    pub fn new(entity: impl Into<String>, value: i64, observed_at: DateTime<Utc>) -> Self {
        Self {
            entity: entity.into(),
            value,
            observed_at,
        }
    }
}

/// One entry of the failed-job list, reduced to what the engine buckets on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Job class the failure belongs to
    pub class: String,
}

#[derive(Deserialize)]
struct RawFailure {
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    class: Option<String>,
}

impl FailureRecord {
    /// Parse a failed-job JSON blob.
    ///
    /// Records that do not parse, or that carry an empty class, are bucketed
    /// under [`UNKNOWN_CLASS`] rather than dropped.
    pub fn parse(raw: &str) -> Self {
        let class = serde_json::from_str::<RawFailure>(raw)
            .ok()
            .and_then(|f| f.payload)
            .and_then(|p| p.class)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_CLASS.to_string());

        Self { class }
    }
}
