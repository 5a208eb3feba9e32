//! Notification delivery for alerts

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{EmailConfig, SmsConfig};
use crate::models::AlertEvent;

/// Result of delivering one alert
#[derive(Debug, Clone)]
pub struct NotificationResult {
    /// Alert that was delivered
    pub alert_id: uuid::Uuid,
    /// Channel that handled it
    pub channel_type: String,
    /// Whether delivery succeeded
    pub success: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// When delivery was attempted
    pub sent_at: DateTime<Utc>,
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("SMTP error: {0}")]
    SmtpError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A delivery channel. Implementations are dumb sinks: they never retry and
/// never deduplicate.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name for logs and results
    fn channel_type(&self) -> &'static str;

    /// Deliver one alert
    async fn send(&self, event: &AlertEvent) -> Result<(), NotificationError>;
}

/// Writes alerts to the log; used when a channel is not configured
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), NotificationError> {
        warn!(
            entity = %event.entity,
            kind = %event.kind,
            link = %event.link,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// Sends alerts by SMTP (STARTTLS)
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// Build the SMTP transport and validate both addresses
    pub fn new(config: &EmailConfig) -> Result<Self, NotificationError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotificationError::ConfigError(format!("invalid from address: {e}")))?;
        let to: Mailbox = config
            .to
            .parse()
            .map_err(|e| NotificationError::ConfigError(format!("invalid to address: {e}")))?;

        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotificationError::ConfigError(e.to_string()))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { mailer, from, to })
    }
}

fn build_message(
    from: &Mailbox,
    to: &Mailbox,
    event: &AlertEvent,
) -> Result<Message, NotificationError> {
    Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(format!("[RQMon] {}", event.subject))
        .header(ContentType::TEXT_PLAIN)
        .body(render_email_body(event))
        .map_err(|e| NotificationError::SmtpError(e.to_string()))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel_type(&self) -> &'static str {
        "email"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), NotificationError> {
        let message = build_message(&self.from, &self.to, event)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| NotificationError::SmtpError(e.to_string()))?;

        info!(entity = %event.entity, kind = %event.kind, "Email alert sent");
        Ok(())
    }
}

/// Plain-text body of an alert email
pub fn render_email_body(event: &AlertEvent) -> String {
    format!(
        "RQMon noticed the following alert has passed our alerting threshold:\n\
         \n\
         Issue: {}\n\
         \n\
         View Details: {}\n\
         \n\
         Thanks,\n\
         Resque Queue Monitoring Daemon\n",
        event.message, event.link
    )
}

/// Posts alerts as JSON to an SMS gateway
pub struct WebhookNotifier {
    client: Client,
    url: String,
    recipient: String,
}

impl WebhookNotifier {
    /// Create a webhook notifier for an SMS gateway
    pub fn new(config: &SmsConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotificationError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            url: config.webhook_url.clone(),
            recipient: config.recipient.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel_type(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), NotificationError> {
        let payload = SmsPayload {
            to: &self.recipient,
            body: &event.message,
            alert_id: event.id.to_string(),
            entity: &event.entity,
            kind: event.kind.as_str(),
            value: event.value,
            link: &event.link,
            triggered_at: event.triggered_at,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!(
                "SMS gateway returned {}: {}",
                status, body
            )));
        }

        info!(entity = %event.entity, url = %self.url, "SMS alert sent");
        Ok(())
    }
}

// SMS gateway payload
#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    body: &'a str,
    alert_id: String,
    entity: &'a str,
    kind: &'a str,
    value: i64,
    link: &'a str,
    triggered_at: DateTime<Utc>,
}
