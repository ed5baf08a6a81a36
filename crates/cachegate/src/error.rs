//! Cache facade error types

use std::num::ParseIntError;
use std::string::FromUtf8Error;
use std::time::Duration;

use thiserror::Error;

/// Environment configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("neither REDIS_SERVER nor REDIS_HOST is set")]
    Missing,

    #[error("both REDIS_SERVER and REDIS_HOST are set, pick one topology")]
    Ambiguous,

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Cache facade errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build connection pool: {reason}")]
    Pool { reason: String },

    #[error("{op}: could not acquire a connection: {reason}")]
    Connection { op: &'static str, reason: String },

    #[error("{op} failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: redis::RedisError,
    },

    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("value at {key} is not a base-10 integer: {source}")]
    Parse {
        key: String,
        #[source]
        source: ParseIntError,
    },

    #[error("value at {key} is not valid UTF-8: {source}")]
    Encoding {
        key: String,
        #[source]
        source: FromUtf8Error,
    },

    #[error("expiry must be greater than zero, got {0:?}")]
    InvalidExpiry(Duration),

    #[error("list rewrite of {key} stopped after {applied} of {total} steps: {source}")]
    PartialFailure {
        key: String,
        applied: usize,
        total: usize,
        #[source]
        source: redis::RedisError,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Wrap a remote command failure with the name of the failing operation.
    pub(crate) fn transport(op: &'static str) -> impl FnOnce(redis::RedisError) -> Self {
        move |source| Self::Transport { op, source }
    }

    /// Whether the error is a read on an absent key.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_names_the_operation() {
        let source = redis::RedisError::from((redis::ErrorKind::IoError, "connection reset"));
        let err = CacheError::transport("GET")(source);
        assert!(err.to_string().starts_with("GET failed:"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found() {
        let err = CacheError::NotFound {
            key: "session:42".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "key not found: session:42");
    }

    #[test]
    fn test_config_error_converts() {
        let err: CacheError = ConfigError::Missing.into();
        assert!(matches!(err, CacheError::Config(ConfigError::Missing)));
    }
}
