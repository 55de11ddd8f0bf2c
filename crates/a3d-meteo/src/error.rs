//! Error types for station selection.

use thiserror::Error;

/// Errors that can occur while selecting stations or reading their series.
#[derive(Debug, Error)]
pub enum MeteoError {
    /// No station satisfies the selection rules.
    #[error("No qualifying meteo station ({considered} considered): {reason}")]
    InsufficientStations { considered: usize, reason: String },

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    /// The station catalogue could not be read.
    #[error("Invalid station catalogue {location}: {reason}")]
    Catalogue { location: String, reason: String },

    /// A SMET series is malformed or belongs to another station.
    #[error("Invalid SMET series for station {station_id}: {reason}")]
    Smet { station_id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Grid(#[from] a3d_spatial::RegionError),
}
