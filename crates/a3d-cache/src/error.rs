//! Error types for the grid cache.

use thiserror::Error;

/// Errors that can occur when reading or publishing cache entries.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error on the cache directory.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sidecar metadata could not be encoded or decoded.
    #[error("Cache metadata error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cached grid text could not be decoded.
    #[error("Cached grid error: {0}")]
    Grid(#[from] a3d_spatial::RegionError),

    /// The published file did not read back with the expected checksum.
    #[error("Checksum verification failed for {key}")]
    Verification {
        /// Cache key digest.
        key: String,
    },
}
