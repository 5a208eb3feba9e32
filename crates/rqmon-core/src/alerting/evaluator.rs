//! Stall and failure-trend policies
//!
//! Both policies are plain arithmetic over a sample and the entity's current
//! record; they never fail and never touch the store themselves.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::MonitorConfig;

/// Temporal state of one queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueState {
    /// Last time the queue was observed empty
    pub last_empty_at: DateTime<Utc>,
    /// Last time a stall email was decided
    pub last_alert_at: Option<DateTime<Utc>>,
    /// Whether the escalation already fired for the current non-empty streak
    pub escalated: bool,
}

impl QueueState {
    /// State of a queue first seen at `now`: treated as empty, never alerted
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_empty_at: now,
            last_alert_at: None,
            escalated: false,
        }
    }
}

/// Alerts decided by one stall evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StallOutcome {
    /// A stall email is due
    pub email: bool,
    /// The one-shot escalation is due
    pub escalate: bool,
    /// Time since the queue was last empty
    pub stalled_for: Duration,
}

impl StallOutcome {
    /// Whether anything fired
    pub fn any(&self) -> bool {
        self.email || self.escalate
    }
}

/// Queue stall policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPolicy {
    /// Non-empty time before any alert
    pub stall_threshold: Duration,
    /// Minimum spacing between stall emails
    pub email_cooldown: Duration,
    /// Non-empty time before the one-time escalation
    pub escalation_threshold: Duration,
}

impl StallPolicy {
    /// Apply the policy to one length sample, mutating `state`
    pub fn evaluate(&self, state: &mut QueueState, length: i64, now: DateTime<Utc>) -> StallOutcome {
        if length <= 0 {
            state.last_empty_at = now;
            state.escalated = false;
            return StallOutcome::default();
        }

        let stalled_for = elapsed(state.last_empty_at, now);
        let mut outcome = StallOutcome {
            stalled_for,
            ..StallOutcome::default()
        };

        if stalled_for < self.stall_threshold {
            return outcome;
        }

        let cooled_down = state
            .last_alert_at
            .map_or(true, |at| elapsed(at, now) > self.email_cooldown);
        if cooled_down {
            state.last_alert_at = Some(now);
            outcome.email = true;
        }

        if stalled_for > self.escalation_threshold && !state.escalated {
            state.escalated = true;
            outcome.escalate = true;
        }

        outcome
    }
}

impl From<&MonitorConfig> for StallPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            stall_threshold: config.stall_threshold,
            email_cooldown: config.email_cooldown,
            escalation_threshold: config.escalation_threshold,
        }
    }
}

/// Failure count seen at the previous evaluation of a job class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureBaseline {
    /// `None` until the class has been observed once
    pub last_count: Option<i64>,
}

/// Cycle-over-cycle failure growth policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPolicy {
    /// Fractional growth that triggers an alert (0.15 = 15%)
    pub failure_threshold: f64,
}

impl TrendPolicy {
    /// Apply the policy to one count sample.
    ///
    /// Returns the growth when it exceeds the threshold. The baseline always
    /// moves to `count`, so only jumps between consecutive cycles are caught.
    pub fn evaluate(&self, baseline: &mut FailureBaseline, count: i64) -> Option<f64> {
        let last = baseline.last_count.replace(count)?;

        let delta = growth(last, count);
        (delta > self.failure_threshold).then_some(delta)
    }
}

impl From<&MonitorConfig> for TrendPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
        }
    }
}

/// Relative growth from `last` to `current`.
///
/// Failures appearing on a zero baseline count as a 100% increase.
pub fn growth(last: i64, current: i64) -> f64 {
    if last <= 0 {
        return if current > 0 { 1.0 } else { 0.0 };
    }
    (current - last) as f64 / last as f64
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    // clock steps backwards read as no time passed
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
