//! Alerting engine for RQMon
//!
//! Turns polled queue lengths and failure counts into debounced alerts:
//! stall reminders, one-shot stall escalations and failure-trend alerts.

mod dispatcher;
mod engine;
mod evaluator;
mod notifier;
mod state;

pub use dispatcher::Dispatcher;
pub use engine::AlertEngine;
pub use evaluator::{growth, FailureBaseline, QueueState, StallOutcome, StallPolicy, TrendPolicy};
pub use notifier::{
    render_email_body, EmailNotifier, LogNotifier, NotificationError, NotificationResult,
    Notifier, WebhookNotifier,
};
pub use state::{ReconcileSummary, StateStore};
