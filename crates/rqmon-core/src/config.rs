//! Configuration management for RQMon
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `RQMON__`-prefixed environment variables (e.g. `RQMON__MONITOR__POLL_INTERVAL=30s`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const REDACTED: &str = "********";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Redis configuration
    pub redis: RedisConfig,

    /// Polling and alert policy configuration
    pub monitor: MonitorConfig,

    /// Notification channels
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Toml),
            );
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("RQMON")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Copy safe to print: SMTP and Redis passwords are masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let Some(email) = config.notifications.email.as_mut() {
            email.password = REDACTED.to_string();
        }
        if let Ok(mut url) = url::Url::parse(&config.redis.url) {
            if url.password().is_some() && url.set_password(Some(REDACTED)).is_ok() {
                config.redis.url = url.to_string();
            }
        }
        config
    }

    /// Reject settings the poll loops cannot run with
    pub fn validate(&self) -> Result<()> {
        let monitor = &self.monitor;
        if monitor.poll_interval.is_zero() {
            return Err(Error::config("monitor.poll_interval must be greater than zero"));
        }
        if monitor.source_timeout.is_zero() {
            return Err(Error::config("monitor.source_timeout must be greater than zero"));
        }
        if !monitor.failure_threshold.is_finite() || monitor.failure_threshold < 0.0 {
            return Err(Error::config(format!(
                "monitor.failure_threshold must be a non-negative number, got {}",
                monitor.failure_threshold
            )));
        }
        if self.redis.max_connections == 0 {
            return Err(Error::config("redis.max_connections must be greater than zero"));
        }
        Ok(())
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL
    pub url: String,
    /// Maximum connections
    pub max_connections: usize,
    /// Key prefix Resque writes under
    pub namespace: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 10,
            namespace: "resque:".to_string(),
        }
    }
}

/// Polling cadence and alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between two polls of the same metric family
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long a queue may stay non-empty before it is reported
    #[serde(with = "humantime_serde")]
    pub stall_threshold: Duration,
    /// Minimum spacing between two stall emails for the same queue
    #[serde(with = "humantime_serde")]
    pub email_cooldown: Duration,
    /// How long a queue may stay non-empty before the one-time escalation
    #[serde(with = "humantime_serde")]
    pub escalation_threshold: Duration,
    /// Cycle-over-cycle failure growth that triggers a trend alert (0.10 = 10%)
    pub failure_threshold: f64,
    /// Upper bound on a single metric source round trip
    #[serde(with = "humantime_serde")]
    pub source_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            stall_threshold: Duration::from_secs(6 * 60 * 60),
            email_cooldown: Duration::from_secs(30 * 60),
            escalation_threshold: Duration::from_secs(12 * 60 * 60),
            failure_threshold: 0.10,
            source_timeout: Duration::from_secs(5),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Base URL of the Resque web UI, used for alert links
    pub web_url: String,
    /// SMTP delivery for stall and trend alerts
    pub email: Option<EmailConfig>,
    /// SMS gateway webhook for escalations
    pub sms: Option<SmsConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            web_url: "http://resque.example.com".to_string(),
            email: None,
            sms: None,
        }
    }
}

/// SMTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host
    pub smtp_host: String,
    /// SMTP port (STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username
    pub username: String,
    /// SMTP password
    pub password: String,
    /// Sender address
    pub from: String,
    /// Recipient address
    pub to: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// SMS gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    /// Gateway endpoint receiving a JSON POST per escalation
    pub webhook_url: String,
    /// Phone number handed to the gateway
    pub recipient: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
    /// Append logs to this file instead of stdout
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_daemon_constants() {
        let config = Config::default();

        assert_eq!(config.monitor.poll_interval, Duration::from_secs(15));
        assert_eq!(config.monitor.stall_threshold, Duration::from_secs(6 * 3600));
        assert_eq!(config.monitor.email_cooldown, Duration::from_secs(30 * 60));
        assert!((config.monitor.failure_threshold - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.redis.namespace, "resque:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[monitor]
poll_interval = "2s"
stall_threshold = "10s"
failure_threshold = 0.15

[notifications]
web_url = "http://resque.internal"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.monitor.poll_interval, Duration::from_secs(2));
        assert_eq!(config.monitor.stall_threshold, Duration::from_secs(10));
        assert!((config.monitor.failure_threshold - 0.15).abs() < f64::EPSILON);
        // untouched keys keep their defaults
        assert_eq!(config.monitor.email_cooldown, Duration::from_secs(30 * 60));
        assert_eq!(config.notifications.web_url, "http://resque.internal");
        assert!(config.notifications.email.is_none());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/rqmon.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.monitor.failure_threshold = -0.5;
        assert!(config.validate().is_err());

        config.monitor.failure_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = Config::default();
        config.redis.url = "redis://:hunter2@redis.internal:6379/0".to_string();
        config.notifications.email = Some(EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            username: "me@example.com".to_string(),
            password: "Passw0rd".to_string(),
            from: "me@example.com".to_string(),
            to: "ops@example.com".to_string(),
        });

        let rendered = toml::to_string_pretty(&config.redacted()).unwrap();

        assert!(!rendered.contains("Passw0rd"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("redis.internal:6379"));
        assert!(rendered.contains("me@example.com"));
        // the live config keeps the real secret
        assert_eq!(config.notifications.email.unwrap().password, "Passw0rd");
    }

    #[test]
    fn test_redacted_leaves_plain_url_alone() {
        let config = Config::default();
        assert_eq!(config.redacted().redis.url, config.redis.url);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.monitor.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
