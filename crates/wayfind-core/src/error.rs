//! Error types for wayfind-core.
//!
//! The engine separates failures it recovers from locally from failures it
//! must hand back to the caller.
//!
//! | Error | Surfaced? | Handling |
//! |-------|-----------|----------|
//! | [`QueryError`] | No | Treated as "no candidates this cycle"; the throttle anchor is left alone so the next qualifying update retries |
//! | Unresolvable trigger | No | Logged at `warn` and dropped |
//! | [`EffectError`] | No | Logged at `warn`; the discovery write already succeeded |
//! | [`MonitorError`] | No | Logged; the durable registration is kept and re-sent by `rearm_all` |
//! | [`Error::Storage`] | Yes | Returned from `on_location_update` / `on_trigger_fired`; not retried automatically |
//! | [`Error::InvalidLocation`] | Yes | Sample rejected before the throttle is consulted |

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a storage backend.
pub type StorageError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for storage collaborator calls.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors returned by the discovery engine and registry.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A durable store operation failed.
    #[error("Storage error during {operation}: {source}")]
    Storage {
        /// The store operation that failed.
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    /// The place query service failed.
    #[error("Place query failed: {0}")]
    Query(#[from] QueryError),

    /// A location sample carried unusable coordinates.
    #[error("Invalid location: {0}")]
    InvalidLocation(#[from] wayfind_types::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Wrap a storage backend failure with the operation that produced it.
    pub fn storage(operation: &'static str, source: impl Into<StorageError>) -> Self {
        Self::Storage {
            operation,
            source: source.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error came from the durable store.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

/// Failures of a [`PlaceQueryClient`](crate::PlaceQueryClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The service could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("Service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Could not decode response: {0}")]
    Decode(String),

    /// The request did not complete in time.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures of an [`EffectSink`](crate::EffectSink).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EffectError {
    /// The platform refused the effect (e.g. notifications disabled).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The output device or helper program is not available.
    #[error("Effect unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure reported by a [`GeofenceMonitor`](crate::GeofenceMonitor).
#[derive(Debug, Clone, Error)]
#[error("Geofence monitor error: {0}")]
pub struct MonitorError(pub String);

/// Result type alias using wayfind-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::storage("insert discovery", std::io::Error::other("disk full"));
        assert!(err.to_string().contains("insert discovery"));
        assert!(err.to_string().contains("disk full"));
        assert!(err.is_storage());

        let err = Error::from(QueryError::Service {
            status: 429,
            message: "rate limited".to_string(),
        });
        assert!(err.to_string().contains("429"));
        assert!(!err.is_storage());

        let err = Error::invalid_config("radius must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: radius must be positive"
        );
    }

    #[test]
    fn test_invalid_location_conversion() {
        let coord_err = wayfind_types::Coordinate::try_new(95.0, 0.0).unwrap_err();
        let err: Error = coord_err.into();
        assert!(matches!(err, Error::InvalidLocation(_)));
    }

    #[test]
    fn test_query_timeout_display() {
        let err = QueryError::Timeout(Duration::from_secs(30));
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn test_effect_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "paplay");
        let err: EffectError = io_err.into();
        assert!(matches!(err, EffectError::Io(_)));
        assert!(err.to_string().contains("paplay"));
    }
}
