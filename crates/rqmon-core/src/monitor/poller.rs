//! Fixed-interval pollers for queue lengths and failed jobs

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

use crate::alerting::{AlertEngine, Dispatcher, NotificationResult};
use crate::config::MonitorConfig;
use crate::db::{bucket_failures, MetricSource};
use crate::error::{Error, Result};
use crate::models::{AlertEvent, MetricFamily, Sample};

/// Outcome of one successful poll cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Family that was polled
    pub family: MetricFamily,
    /// Entities reported by the source this cycle
    pub tracked: usize,
    /// Alerts decided this cycle
    pub alerts: Vec<AlertEvent>,
    /// Delivery results, empty when no dispatcher is attached
    pub notifications: Vec<NotificationResult>,
}

/// Drives the engine from a metric source
#[derive(Clone)]
pub struct Poller {
    source: Arc<dyn MetricSource>,
    engine: AlertEngine,
    dispatcher: Option<Dispatcher>,
    poll_interval: Duration,
    source_timeout: Duration,
}

impl Poller {
    /// Create a poller that only decides alerts
    pub fn new(
        source: Arc<dyn MetricSource>,
        engine: AlertEngine,
        poll_interval: Duration,
        source_timeout: Duration,
    ) -> Self {
        Self {
            source,
            engine,
            dispatcher: None,
            poll_interval,
            source_timeout,
        }
    }

    /// Create a poller using the monitor settings
    pub fn from_config(
        source: Arc<dyn MetricSource>,
        engine: AlertEngine,
        config: &MonitorConfig,
    ) -> Self {
        Self::new(source, engine, config.poll_interval, config.source_timeout)
    }

    /// Deliver decided alerts through `dispatcher`
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// The engine this poller feeds
    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.source_timeout, call)
            .await
            .map_err(|_| Error::Timeout(self.source_timeout))?
    }

    /// One queue-length cycle.
    ///
    /// A failed or timed-out enumeration returns the error before any state is
    /// touched. A failed length read drops only that queue's sample.
    pub async fn poll_queues_once(&self) -> Result<CycleReport> {
        let names = self.bounded(self.source.list_queues()).await?;
        let cycle_start = Utc::now();

        let mut samples = Vec::with_capacity(names.len());
        for queue in &names {
            match self.bounded(self.source.queue_length(queue)).await {
                Ok(length) => samples.push(Sample::new(queue.as_str(), length, Utc::now())),
                Err(e) => warn!(queue = %queue, error = %e, "Could not read queue length"),
            }
        }
        debug!(queues = names.len(), samples = samples.len(), "Polled queue lengths");

        let alerts = self.engine.run_queue_cycle(&names, samples, cycle_start).await;
        Ok(self.finish(MetricFamily::Queues, names.len(), alerts).await)
    }

    /// One failed-job cycle
    pub async fn poll_failures_once(&self) -> Result<CycleReport> {
        let records = self.bounded(self.source.failure_records()).await?;
        let counts = bucket_failures(&records);
        debug!(
            records = records.len(),
            classes = counts.len(),
            "Polled failed jobs"
        );

        let alerts = self.engine.run_failure_cycle(&counts, Utc::now()).await;
        Ok(self.finish(MetricFamily::Failures, counts.len(), alerts).await)
    }

    /// One cycle of `family`
    pub async fn poll_once(&self, family: MetricFamily) -> Result<CycleReport> {
        match family {
            MetricFamily::Queues => self.poll_queues_once().await,
            MetricFamily::Failures => self.poll_failures_once().await,
        }
    }

    async fn finish(
        &self,
        family: MetricFamily,
        tracked: usize,
        alerts: Vec<AlertEvent>,
    ) -> CycleReport {
        let notifications = match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch_all(&alerts).await,
            None => Vec::new(),
        };

        CycleReport {
            family,
            tracked,
            alerts,
            notifications,
        }
    }

    /// Run both poll loops until `shutdown` flips to `true` or its sender drops
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.poll_interval,
            timeout = ?self.source_timeout,
            "Starting pollers"
        );

        let queues = tokio::spawn(
            self.clone()
                .family_loop(MetricFamily::Queues, shutdown.clone())
                .in_current_span(),
        );
        let failures = tokio::spawn(
            self.clone()
                .family_loop(MetricFamily::Failures, shutdown)
                .in_current_span(),
        );

        for (family, handle) in [(MetricFamily::Queues, queues), (MetricFamily::Failures, failures)] {
            if let Err(e) = handle.await {
                warn!(family = %family, error = %e, "Poll loop ended abnormally");
            }
        }

        info!("Pollers stopped");
    }

    async fn family_loop(self, family: MetricFamily, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // the cycle completes before the next tick is taken
                    match self.poll_once(family).await {
                        Ok(report) => debug!(
                            family = %family,
                            tracked = report.tracked,
                            alerts = report.alerts.len(),
                            "Cycle complete"
                        ),
                        Err(e) => warn!(family = %family, error = %e, "Skipping cycle"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(family = %family, "Poll loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}
