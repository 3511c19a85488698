//! Error types for wayfind-types.

use thiserror::Error;

/// Errors raised when constructing or validating wayfind data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// Latitude or longitude is not finite or outside the WGS84 range.
    #[error("Invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// Offending latitude.
        latitude: f64,
        /// Offending longitude.
        longitude: f64,
    },
}

/// Result type alias using wayfind-types' Error type.
pub type Result<T> = std::result::Result<T, Error>;
