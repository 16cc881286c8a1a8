//! Error types for the tile engine.
//!
//! Misses, empty searches and no-op removals are not errors; they are
//! reported through `Option`/`bool` return values.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GeoTilesError>;

#[derive(Debug, Error)]
pub enum GeoTilesError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("feature {0} is not indexed")]
    FeatureNotFound(u64),

    #[error("vertex {index} out of range for feature {feature}")]
    VertexOutOfRange { feature: u64, index: usize },

    #[error("engine has been shut down")]
    EngineClosed,

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures inside the basemap download workers.
///
/// These never reach the render thread; workers log them and clear the
/// in-flight mark so the tile is retried on a later frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("zoom level {0} not supported by provider")]
    UnsupportedZoom(u8),

    #[error("failed to decode tile image: {0}")]
    Decode(String),

    #[error("disk cache error: {0}")]
    Disk(String),
}

impl From<image::ImageError> for FetchError {
    fn from(err: image::ImageError) -> Self {
        FetchError::Decode(err.to_string())
    }
}
