//! # RQMon
//!
//! Resque queue monitoring daemon.
//!
//! RQMon polls a Resque namespace in Redis and raises deduplicated alerts when
//! a queue stops draining or when a job class's failure count jumps.
//!
//! ## Architecture
//!
//! - **Metric source**: reads queue names, queue lengths and failed jobs from Redis
//! - **Alerting**: per-entity state stores, stall and failure-trend policies,
//!   notification dispatch (email, SMS gateway)
//! - **Monitor**: one fixed-interval poll loop per metric family
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the daemon
//! rqmon --config rqmon.toml run
//!
//! # Poll once and print what would be alerted
//! rqmon check
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertEngine, Dispatcher, Notifier};
    pub use crate::config::Config;
    pub use crate::db::{MetricSource, RedisMetricSource, RedisPool};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::monitor::Poller;
}
