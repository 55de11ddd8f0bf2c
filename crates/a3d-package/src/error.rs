//! Error types for the packager.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while assembling an output package.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Simulation name is empty or contains whitespace or path separators.
    #[error("Invalid simulation name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// An artifact path lies outside the package layout.
    #[error("Artifact path {path:?} is outside the package layout")]
    OutsideLayout { path: String },

    /// Two artifacts or configs claim the same path.
    #[error("Duplicate package path {0:?}")]
    DuplicatePath(String),

    /// Rendered configs reference files that are not in the package.
    #[error("Package is incomplete, missing: {}", .missing.join(", "))]
    IncompletePackage {
        /// Referenced paths without content, sorted.
        missing: Vec<String>,
    },

    /// Output exists and overwrite was not requested.
    #[error("Output {} already exists (use --overwrite to replace it)", .path.display())]
    AlreadyExists { path: PathBuf },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive error.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Manifest serialization error.
    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),
}
