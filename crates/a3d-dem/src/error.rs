//! Error types for the DEM crate.

use thiserror::Error;

/// Errors that can occur while acquiring elevation data.
#[derive(Debug, Error)]
pub enum DemError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing required tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Unsupported data type in the TIFF file.
    #[error("Unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Tile fetching failed permanently or retries were exhausted.
    #[error("Elevation acquisition from {source_id} failed after {attempts} attempt(s): {last_error}")]
    Acquisition {
        /// Tile source identifier.
        source_id: String,
        /// Attempts made for the failing tile.
        attempts: u32,
        /// Last error reported by the source.
        last_error: String,
    },

    /// Cells of the grid are not covered by the source (strict policy).
    #[error("{missing_cells} grid cell(s) not covered by {source_id}")]
    Coverage {
        /// Tile source identifier.
        source_id: String,
        /// Number of uncovered cells.
        missing_cells: usize,
    },

    /// The tile source and the grid use different coordinate systems.
    #[error("Tile source CRS {source_crs} does not match grid CRS {grid_crs}")]
    CrsMismatch {
        source_crs: a3d_spatial::Crs,
        grid_crs: a3d_spatial::Crs,
    },

    /// Invalid source configuration (URL template, directory).
    #[error("Invalid tile source configuration: {0}")]
    InvalidSource(String),

    /// The run was cancelled between tile fetches.
    #[error("Elevation acquisition cancelled")]
    Cancelled,

    /// Grid cache error.
    #[error(transparent)]
    Cache(#[from] a3d_cache::CacheError),

    /// Grid construction error.
    #[error(transparent)]
    Grid(#[from] a3d_spatial::RegionError),
}
