//! Error types for RQMon

use std::time::Duration;

use thiserror::Error;

/// Result type alias using RQMon's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for RQMon operations
#[derive(Error, Debug)]
pub enum Error {
    /// Redis error (connection, pool or command failure)
    #[error("Redis error: {0}")]
    Redis(String),

    /// A metric source call exceeded its time bound
    #[error("Metric source call timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error should simply skip the current poll cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Redis(_) | Self::Timeout(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::Redis(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Redis(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors_are_transient() {
        let refused = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));

        assert!(Error::from(refused).is_transient());
        assert!(Error::Timeout(Duration::from_secs(5)).is_transient());
        assert!(!Error::config("bad threshold").is_transient());
    }
}
