//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Database-specific error
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The store does not implement the named capability
    #[error("Method not implemented by this store: {0}")]
    NotImplemented(&'static str),

    /// The store cannot provide the requested behaviour (e.g. tagging)
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Backend connection or transaction failure
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No store with this name is configured
    #[error("Cache store [{0}] is not defined")]
    UnknownStore(String),

    /// The configured driver is neither built in nor registered
    #[error("Driver [{0}] is not supported")]
    UnsupportedDriver(String),
}

impl CacheError {
    /// Check if this error came from the backing store rather than from cache logic.
    pub fn is_backend_error(&self) -> bool {
        match self {
            Self::Backend(_) => true,
            #[cfg(feature = "redis")]
            Self::Redis(_) => true,
            #[cfg(feature = "postgres")]
            Self::Database(_) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "redis")]
impl From<keystone_redis::RedisError> for CacheError {
    fn from(err: keystone_redis::RedisError) -> Self {
        match err {
            keystone_redis::RedisError::Redis(e) => Self::Redis(e),
            keystone_redis::RedisError::Config(msg) => Self::Config(msg),
            err @ keystone_redis::RedisError::UnknownConnection(_) => Self::Config(err.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::NotImplemented("add");
        assert_eq!(err.to_string(), "Method not implemented by this store: add");

        let err = CacheError::UnknownStore("files".to_string());
        assert!(err.to_string().contains("[files]"));
    }

    #[test]
    fn test_backend_classification() {
        assert!(CacheError::Backend("connection refused".to_string()).is_backend_error());
        assert!(!CacheError::NotSupported("tags".to_string()).is_backend_error());
        assert!(!CacheError::Config("missing table".to_string()).is_backend_error());
    }
}
