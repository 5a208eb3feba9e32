//! Routes decided alerts to their delivery channel

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use super::notifier::{
    EmailNotifier, LogNotifier, NotificationError, NotificationResult, Notifier, WebhookNotifier,
};
use crate::config::NotificationConfig;
use crate::models::{AlertEvent, Channel};

/// Hands each alert to the notifier for its kind's channel.
///
/// Delivery outcomes are reported, never fed back into engine state.
#[derive(Clone)]
pub struct Dispatcher {
    email: Arc<dyn Notifier>,
    sms: Arc<dyn Notifier>,
}

impl Dispatcher {
    /// Create a dispatcher from explicit notifiers
    pub fn new(email: Arc<dyn Notifier>, sms: Arc<dyn Notifier>) -> Self {
        Self { email, sms }
    }

    /// Build notifiers for the configured channels; missing ones log instead
    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let email: Arc<dyn Notifier> = match &config.email {
            Some(email) => Arc::new(EmailNotifier::new(email)?),
            None => {
                info!("No SMTP settings, email alerts will be logged");
                Arc::new(LogNotifier)
            }
        };
        let sms: Arc<dyn Notifier> = match &config.sms {
            Some(sms) => Arc::new(WebhookNotifier::new(sms)?),
            None => {
                info!("No SMS gateway, escalations will be logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::new(email, sms))
    }

    fn notifier_for(&self, channel: Channel) -> &Arc<dyn Notifier> {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
        }
    }

    /// Deliver one alert
    pub async fn dispatch(&self, event: &AlertEvent) -> NotificationResult {
        let notifier = self.notifier_for(event.kind.channel());
        let sent_at = Utc::now();
        let result = notifier.send(event).await;

        if let Err(e) = &result {
            error!(
                entity = %event.entity,
                kind = %event.kind,
                channel = notifier.channel_type(),
                error = %e,
                "Alert delivery failed"
            );
        }

        NotificationResult {
            alert_id: event.id,
            channel_type: notifier.channel_type().to_string(),
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            sent_at,
        }
    }

    /// Deliver a batch of alerts in order
    pub async fn dispatch_all(&self, events: &[AlertEvent]) -> Vec<NotificationResult> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            results.push(self.dispatch(event).await);
        }
        results
    }
}
