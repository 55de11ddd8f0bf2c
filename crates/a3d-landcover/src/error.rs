//! Error types for land-cover derivation.

use thiserror::Error;

/// Errors that can occur while deriving a land-cover grid.
#[derive(Debug, Error)]
pub enum LandCoverError {
    /// A source category has no PREVAH equivalent.
    #[error("Land-cover category '{category}' of source {source_id} has no PREVAH mapping")]
    UnmappedCategory { source_id: String, category: String },

    /// A value is not a valid `1LLCD` land-use code.
    #[error("Invalid land-use code {0}")]
    InvalidCode(i64),

    /// Source data could not be read or parsed.
    #[error("Invalid land-cover source {location}: {reason}")]
    InvalidSource { location: String, reason: String },

    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Grid(#[from] a3d_spatial::RegionError),

    #[error(transparent)]
    Cache(#[from] a3d_cache::CacheError),
}

impl LandCoverError {
    pub(crate) fn unmapped(source_id: &str, category: impl ToString) -> Self {
        Self::UnmappedCategory {
            source_id: source_id.to_string(),
            category: category.to_string(),
        }
    }
}
