//! Error types for the spatial crate.

use thiserror::Error;

/// Errors raised while resolving regions and handling grids.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The region cannot be turned into a simulation grid.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// EPSG code that the resolver does not know how to handle.
    #[error("Unsupported coordinate reference system EPSG:{0}")]
    UnsupportedCrs(u32),

    /// Two grids that must share a definition do not.
    #[error("Grid alignment violated: {0}")]
    Misaligned(String),

    /// Malformed ESRI ASCII grid text.
    #[error("Malformed ASCII grid: {0}")]
    AsciiGrid(String),

    /// Malformed or unsupported GeoJSON geometry.
    #[error("Malformed GeoJSON: {0}")]
    GeoJson(String),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegionError {
    /// Shorthand for [`RegionError::InvalidRegion`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        RegionError::InvalidRegion(reason.into())
    }
}
