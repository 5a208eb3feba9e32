//! Alert engine: reconciles the registries and fans evaluations out per entity

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, Instrument};

use super::evaluator::{FailureBaseline, QueueState, StallPolicy, TrendPolicy};
use super::state::StateStore;
use crate::config::Config;
use crate::models::{AlertEvent, Sample};

/// Stateful alerting core shared by both poll loops
#[derive(Clone)]
pub struct AlertEngine {
    queues: Arc<StateStore<QueueState>>,
    failures: Arc<StateStore<FailureBaseline>>,
    stall: StallPolicy,
    trend: TrendPolicy,
    web_url: Arc<str>,
}

impl AlertEngine {
    /// Create an engine with empty registries
    pub fn new(stall: StallPolicy, trend: TrendPolicy, web_url: impl Into<Arc<str>>) -> Self {
        Self {
            queues: Arc::new(StateStore::new()),
            failures: Arc::new(StateStore::new()),
            stall,
            trend,
            web_url: web_url.into(),
        }
    }

    /// Create an engine from the monitor and notification settings
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            StallPolicy::from(&config.monitor),
            TrendPolicy::from(&config.monitor),
            config.notifications.web_url.as_str(),
        )
    }

    /// Run one queue cycle.
    ///
    /// `names` is the full enumeration reported by the source; `samples` the
    /// lengths that could be read. Returns once every evaluation has committed.
    pub async fn run_queue_cycle(
        &self,
        names: &[String],
        samples: Vec<Sample>,
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let summary = self.queues.reconcile(names, |_| QueueState::new(now)).await;
        debug!(
            added = summary.added,
            removed = summary.removed,
            tracked = names.len(),
            "Reconciled queues"
        );

        let mut tasks = JoinSet::new();
        for (queue, samples) in group_by_entity(samples) {
            let store = Arc::clone(&self.queues);
            let policy = self.stall;
            let web_url = Arc::clone(&self.web_url);

            tasks.spawn(
                async move {
                    let mut events = Vec::new();
                    for sample in samples {
                        let evaluated = store
                            .update(&queue, |state| {
                                policy.evaluate(state, sample.value, sample.observed_at)
                            })
                            .await;

                        let Some(outcome) = evaluated else {
                            debug!(queue = %queue, "Sample for untracked queue skipped");
                            break;
                        };

                        if outcome.email {
                            events.push(AlertEvent::stall_email(
                                &queue,
                                sample.value,
                                &web_url,
                                sample.observed_at,
                            ));
                        }
                        if outcome.escalate {
                            events.push(AlertEvent::stall_escalation(
                                &queue,
                                sample.value,
                                outcome.stalled_for,
                                &web_url,
                                sample.observed_at,
                            ));
                        }
                    }
                    events
                }
                .in_current_span(),
            );
        }

        collect(tasks).await
    }

    /// Run one failure cycle over per-class failure counts.
    ///
    /// The classes present in `counts` are the enumeration for this cycle.
    pub async fn run_failure_cycle(
        &self,
        counts: &BTreeMap<String, i64>,
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let summary = self
            .failures
            .reconcile(counts.keys(), |_| FailureBaseline::default())
            .await;
        debug!(
            added = summary.added,
            removed = summary.removed,
            tracked = counts.len(),
            "Reconciled failure classes"
        );

        let mut tasks = JoinSet::new();
        for (class, &count) in counts {
            let store = Arc::clone(&self.failures);
            let policy = self.trend;
            let web_url = Arc::clone(&self.web_url);
            let class = class.clone();

            tasks.spawn(
                async move {
                    let delta = store
                        .update(&class, |baseline| policy.evaluate(baseline, count))
                        .await
                        .flatten();

                    delta
                        .map(|delta| AlertEvent::trend(&class, count, delta, &web_url, now))
                        .into_iter()
                        .collect::<Vec<_>>()
                }
                .in_current_span(),
            );
        }

        collect(tasks).await
    }

    /// Current state of a tracked queue
    pub async fn queue_state(&self, queue: &str) -> Option<QueueState> {
        self.queues.get(queue).await
    }

    /// Current baseline of a tracked failure class
    pub async fn failure_baseline(&self, class: &str) -> Option<FailureBaseline> {
        self.failures.get(class).await
    }

    /// Names of tracked queues
    pub async fn tracked_queues(&self) -> Vec<String> {
        self.queues.names().await
    }

    /// Names of tracked failure classes
    pub async fn tracked_failure_classes(&self) -> Vec<String> {
        self.failures.names().await
    }
}

/// Group samples by entity, keeping per-entity arrival order
fn group_by_entity(samples: Vec<Sample>) -> BTreeMap<String, Vec<Sample>> {
    let mut grouped: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        grouped.entry(sample.entity.clone()).or_default().push(sample);
    }
    grouped
}

async fn collect(mut tasks: JoinSet<Vec<AlertEvent>>) -> Vec<AlertEvent> {
    let mut events = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(batch) => events.extend(batch),
            Err(e) => error!(error = %e, "Evaluation task failed"),
        }
    }

    for event in &events {
        info!(
            entity = %event.entity,
            kind = %event.kind,
            value = event.value,
            "Alert decided"
        );
    }

    events.sort_by(|a, b| a.entity.cmp(&b.entity).then(a.kind.as_str().cmp(b.kind.as_str())));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertKind;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const HOUR: i64 = 3600;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn engine() -> AlertEngine {
        AlertEngine::new(
            StallPolicy {
                stall_threshold: Duration::from_secs(3600),
                email_cooldown: Duration::from_secs(1800),
                escalation_threshold: Duration::from_secs(7200),
            },
            TrendPolicy { failure_threshold: 0.15 },
            "http://resque.example.com",
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn lengths(list: &[(&str, i64)], now: DateTime<Utc>) -> Vec<Sample> {
        list.iter().map(|(q, n)| Sample::new(*q, *n, now)).collect()
    }

    fn kinds(events: &[AlertEvent]) -> Vec<(String, AlertKind)> {
        events.iter().map(|e| (e.entity.clone(), e.kind)).collect()
    }

    #[tokio::test]
    async fn test_queue_stall_example() {
        let engine = engine();
        let queues = names(&["Q"]);

        for t in [0, HOUR, HOUR + 1800] {
            let events = engine
                .run_queue_cycle(&queues, lengths(&[("Q", 4)], at(t)), at(t))
                .await;
            let expected = usize::from(t == HOUR);
            assert_eq!(events.len(), expected, "at t={t}");
        }

        let t = 2 * HOUR + 600;
        let events = engine
            .run_queue_cycle(&queues, lengths(&[("Q", 4)], at(t)), at(t))
            .await;

        assert_eq!(
            kinds(&events),
            vec![
                ("Q".to_string(), AlertKind::StallEmail),
                ("Q".to_string(), AlertKind::StallEscalation),
            ]
        );
        assert!(engine.queue_state("Q").await.unwrap().escalated);
    }

    #[tokio::test]
    async fn test_registry_reconciliation() {
        let engine = engine();

        engine
            .run_queue_cycle(&names(&["A", "B"]), lengths(&[("A", 1), ("B", 1)], at(0)), at(0))
            .await;
        engine
            .run_queue_cycle(&names(&["A", "B"]), lengths(&[("A", 1), ("B", 1)], at(2 * HOUR)), at(2 * HOUR))
            .await;
        let b_before = engine.queue_state("B").await.unwrap();
        assert!(b_before.last_alert_at.is_some());

        let t = 2 * HOUR + 60;
        engine
            .run_queue_cycle(&names(&["B", "C"]), Vec::new(), at(t))
            .await;

        assert_eq!(engine.tracked_queues().await, names(&["B", "C"]));
        assert_eq!(engine.queue_state("B").await.unwrap(), b_before);
        assert_eq!(engine.queue_state("C").await.unwrap(), QueueState::new(at(t)));
        assert!(engine.queue_state("A").await.is_none());

        // A comes back with no memory of its stall
        let t = 3 * HOUR;
        let events = engine
            .run_queue_cycle(&names(&["A", "B", "C"]), lengths(&[("A", 1)], at(t)), at(t))
            .await;
        assert!(events.is_empty());
        assert_eq!(engine.queue_state("A").await.unwrap(), QueueState::new(at(t)));
    }

    #[tokio::test]
    async fn test_samples_for_unlisted_queue_are_skipped() {
        let engine = engine();

        let events = engine
            .run_queue_cycle(&names(&["A"]), lengths(&[("ghost", 9)], at(0)), at(0))
            .await;

        assert!(events.is_empty());
        assert!(engine.queue_state("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_many_queues_evaluated_concurrently() {
        let engine = engine();
        let queues: Vec<String> = (0..64).map(|i| format!("q{i}")).collect();
        let samples = |t| -> Vec<Sample> {
            queues
                .iter()
                .enumerate()
                .map(|(i, q)| Sample::new(q.clone(), (i % 2) as i64, at(t)))
                .collect()
        };

        engine.run_queue_cycle(&queues, samples(0), at(0)).await;
        let events = engine
            .run_queue_cycle(&queues, samples(2 * HOUR + 1), at(2 * HOUR + 1))
            .await;

        // odd-indexed queues never drained: email + escalation each
        assert_eq!(events.len(), 64);
        assert!(events.iter().all(|e| e.value == 1));
    }

    #[tokio::test]
    async fn test_failure_trend_cycles() {
        let engine = engine();
        let counts = |n: i64| BTreeMap::from([("Resizer".to_string(), n)]);

        let events = engine.run_failure_cycle(&counts(10), at(0)).await;
        assert!(events.is_empty());
        assert_eq!(
            engine.failure_baseline("Resizer").await,
            Some(FailureBaseline { last_count: Some(10) })
        );

        let events = engine.run_failure_cycle(&counts(13), at(15)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AlertKind::Trend);
        assert_eq!(events[0].value, 13);
        assert!((events[0].delta.unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(events[0].link, "http://resque.example.com/cleaner_list?c=Resizer");
    }

    #[tokio::test]
    async fn test_vanished_failure_class_restarts_as_first_observation() {
        let engine = engine();
        let resizer = |n: i64| BTreeMap::from([("Resizer".to_string(), n)]);

        engine.run_failure_cycle(&resizer(10), at(0)).await;
        engine.run_failure_cycle(&BTreeMap::new(), at(15)).await;
        assert!(engine.tracked_failure_classes().await.is_empty());

        let events = engine.run_failure_cycle(&resizer(100), at(30)).await;
        assert!(events.is_empty());
        assert_eq!(
            engine.failure_baseline("Resizer").await,
            Some(FailureBaseline { last_count: Some(100) })
        );
    }

    #[tokio::test]
    async fn test_queue_and_failure_stores_are_independent() {
        let engine = engine();

        engine
            .run_queue_cycle(&names(&["images"]), lengths(&[("images", 3)], at(0)), at(0))
            .await;
        engine
            .run_failure_cycle(&BTreeMap::from([("images".to_string(), 2)]), at(0))
            .await;

        engine.run_failure_cycle(&BTreeMap::new(), at(15)).await;

        assert!(engine.queue_state("images").await.is_some());
        assert!(engine.failure_baseline("images").await.is_none());
    }
}
