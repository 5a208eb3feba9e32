//! Test doubles shared by unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::alerting::{NotificationError, Notifier};
use crate::db::MetricSource;
use crate::error::{Error, Result};
use crate::models::{AlertEvent, FailureRecord};

/// Records delivered alerts; optionally fails every send
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<AlertEvent>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel_type(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, event: &AlertEvent) -> std::result::Result<(), NotificationError> {
        self.sent.lock().push(event.clone());
        if self.fail {
            return Err(NotificationError::HttpError("unreachable".to_string()));
        }
        Ok(())
    }
}

/// In-memory metric source with switchable failures
#[derive(Default)]
pub struct MemorySource {
    pub queues: Mutex<Vec<(String, i64)>>,
    pub failed_jobs: Mutex<Vec<String>>,
    /// Every call fails with a Redis error
    pub down: Mutex<bool>,
    /// `LLEN` fails for these queues only
    pub broken_queues: Mutex<HashSet<String>>,
    /// Every call sleeps this long first
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl MemorySource {
    pub fn with_queues(queues: &[(&str, i64)]) -> Self {
        let source = Self::default();
        source.set_queues(queues);
        source
    }

    pub fn set_queues(&self, queues: &[(&str, i64)]) {
        *self.queues.lock() = queues.iter().map(|(q, n)| (q.to_string(), *n)).collect();
    }

    pub fn set_failures(&self, classes: &[(&str, usize)]) {
        let mut jobs = Vec::new();
        for (class, count) in classes {
            for _ in 0..*count {
                jobs.push(format!(r#"{{"payload": {{"class": "{class}"}}}}"#));
            }
        }
        *self.failed_jobs.lock() = jobs;
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.down.lock() {
            return Err(Error::Redis("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricSource for MemorySource {
    async fn list_queues(&self) -> Result<Vec<String>> {
        self.enter().await?;
        Ok(self.queues.lock().iter().map(|(q, _)| q.clone()).collect())
    }

    async fn queue_length(&self, queue: &str) -> Result<i64> {
        self.enter().await?;
        if self.broken_queues.lock().contains(queue) {
            return Err(Error::Redis(format!("LLEN failed for {queue}")));
        }
        self.queues
            .lock()
            .iter()
            .find(|(q, _)| q == queue)
            .map(|(_, n)| *n)
            .ok_or_else(|| Error::Redis(format!("no such queue {queue}")))
    }

    async fn failure_records(&self) -> Result<Vec<FailureRecord>> {
        self.enter().await?;
        Ok(self
            .failed_jobs
            .lock()
            .iter()
            .map(|raw| FailureRecord::parse(raw))
            .collect())
    }
}
