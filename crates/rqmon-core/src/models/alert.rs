//! Alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of alert produced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Queue has not drained for longer than the stall threshold (cooldown-limited)
    StallEmail,
    /// One-shot escalation for a stall streak
    StallEscalation,
    /// Failure count for a job class jumped since the previous cycle
    Trend,
}

/// Delivery channel an alert kind is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// SMTP email
    Email,
    /// SMS gateway
    Sms,
}

impl AlertKind {
    /// Channel this kind of alert is delivered on
    pub fn channel(self) -> Channel {
        match self {
            Self::StallEmail | Self::Trend => Channel::Email,
            Self::StallEscalation => Channel::Sms,
        }
    }

    /// Stable identifier used in logs and payloads
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StallEmail => "stall-email",
            Self::StallEscalation => "stall-escalation",
            Self::Trend => "trend",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert decided by the engine, ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Unique identifier
    pub id: Uuid,

    /// Queue name or job class
    pub entity: String,

    /// What kind of alert this is
    pub kind: AlertKind,

    /// Queue length or failure count at decision time
    pub value: i64,

    /// Relative failure growth, for trend alerts
    pub delta: Option<f64>,

    /// Short subject line
    pub subject: String,

    /// Human-readable message
    pub message: String,

    /// Link into the Resque web UI
    pub link: String,

    /// When the alert was decided
    pub triggered_at: DateTime<Utc>,
}

impl AlertEvent {
    /// Stall reminder for a queue that isn't draining
    pub fn stall_email(queue: &str, length: i64, web_url: &str, now: DateTime<Utc>) -> Self {
        let subject = format!("{queue}'s queue length isn't shrinking");
        Self {
            id: Uuid::new_v4(),
            entity: queue.to_string(),
            kind: AlertKind::StallEmail,
            value: length,
            delta: None,
            message: format!("{subject} (Count: {length})."),
            subject,
            link: format!("{}/overview", web_url.trim_end_matches('/')),
            triggered_at: now,
        }
    }

    /// One-shot escalation for a queue stalled past the escalation threshold
    pub fn stall_escalation(
        queue: &str,
        length: i64,
        stalled_for: std::time::Duration,
        web_url: &str,
        now: DateTime<Utc>,
    ) -> Self {
        // whole seconds keep the rendered duration readable
        let stalled_for = std::time::Duration::from_secs(stalled_for.as_secs());
        let subject = format!("{queue}'s queue has not drained");
        Self {
            id: Uuid::new_v4(),
            entity: queue.to_string(),
            kind: AlertKind::StallEscalation,
            value: length,
            delta: None,
            message: format!(
                "{queue}'s queue has not drained for {} (Count: {length}).",
                humantime::format_duration(stalled_for)
            ),
            subject,
            link: format!("{}/overview", web_url.trim_end_matches('/')),
            triggered_at: now,
        }
    }

    /// Failure trend alert for a job class
    pub fn trend(class: &str, count: i64, delta: f64, web_url: &str, now: DateTime<Utc>) -> Self {
        let subject = format!("{class}'s failure trend is rising");
        Self {
            id: Uuid::new_v4(),
            entity: class.to_string(),
            kind: AlertKind::Trend,
            value: count,
            delta: Some(delta),
            message: format!("{subject} (Count: {count}, +{:.0}%).", delta * 100.0),
            subject,
            link: format!(
                "{}/cleaner_list?c={}",
                web_url.trim_end_matches('/'),
                url::form_urlencoded::byte_serialize(class.as_bytes()).collect::<String>()
            ),
            triggered_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_routing() {
        assert_eq!(AlertKind::StallEmail.channel(), Channel::Email);
        assert_eq!(AlertKind::Trend.channel(), Channel::Email);
        assert_eq!(AlertKind::StallEscalation.channel(), Channel::Sms);
    }

    #[test]
    fn test_trend_message_and_link() {
        let event = AlertEvent::trend("Resizer", 13, 0.3, "http://resque.example.com/", Utc::now());

        assert_eq!(event.message, "Resizer's failure trend is rising (Count: 13, +30%).");
        assert_eq!(event.link, "http://resque.example.com/cleaner_list?c=Resizer");
        assert_eq!(event.delta, Some(0.3));
    }

    #[test]
    fn test_trend_link_encodes_class() {
        let event = AlertEvent::trend("Billing::Retry & Sync", 4, 1.0, "http://resque.example.com", Utc::now());

        assert_eq!(
            event.link,
            "http://resque.example.com/cleaner_list?c=Billing%3A%3ARetry+%26+Sync"
        );
        assert_eq!(event.entity, "Billing::Retry & Sync");
    }

    #[test]
    fn test_escalation_message_renders_duration() {
        let event = AlertEvent::stall_escalation(
            "mailers",
            7,
            std::time::Duration::from_millis(7_800_250),
            "http://resque.example.com",
            Utc::now(),
        );

        assert_eq!(event.kind, AlertKind::StallEscalation);
        assert_eq!(event.message, "mailers's queue has not drained for 2h 10m (Count: 7).");
        assert_eq!(event.link, "http://resque.example.com/overview");
    }
}
