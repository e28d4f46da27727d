//! Redis error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for Redis operations.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Redis errors.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No connection is registered under the name.
    #[error("Redis connection [{0}] is not configured")]
    UnknownConnection(String),

    /// Connecting took longer than the configured timeout.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RedisError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Redis(err) => err.is_connection_dropped() || err.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error indicates connection loss.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Redis(err) => err.is_connection_refusal() || err.is_connection_dropped(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(RedisError::Connection("refused".into()).is_retryable());
        assert!(RedisError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!RedisError::Config("bad url".into()).is_retryable());
        assert!(!RedisError::UnknownConnection("cache".into()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RedisError::UnknownConnection("cache".into()).to_string(),
            "Redis connection [cache] is not configured"
        );
        assert!(RedisError::Connection("refused".into()).is_connection_error());
    }
}
