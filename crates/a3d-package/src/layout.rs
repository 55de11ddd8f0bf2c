//! Package layout rules.

use crate::{PackageError, Result};

/// Directory for DEM, land-use and POI files.
pub const SURFACE_GRIDS_DIR: &str = "input/surface-grids";
/// Directory for SMET meteo series.
pub const METEO_DIR: &str = "input/meteo";
/// Directory for initial snow profiles.
pub const SNOWFILES_DIR: &str = "input/snowfiles";
/// Manifest file name, written by the packager itself.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Section of the package a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    SurfaceGrids,
    Meteo,
    SnowFiles,
    /// Top-level configuration file.
    Config,
}

impl Section {
    /// Classify a relative package path.
    ///
    /// Accepted are plain file names directly below one of the input
    /// directories, and plain top-level file names other than the manifest.
    pub fn of(path: &str) -> Result<Self> {
        let outside = || PackageError::OutsideLayout {
            path: path.to_string(),
        };
        if path.is_empty() || path.contains('\\') || path.contains(':') {
            return Err(outside());
        }
        let (dir, file) = match path.rsplit_once('/') {
            Some((dir, file)) => (Some(dir), file),
            None => (None, path),
        };
        if file.is_empty() || file == "." || file == ".." {
            return Err(outside());
        }
        match dir {
            None if file == MANIFEST_FILE => Err(outside()),
            None => Ok(Section::Config),
            Some(SURFACE_GRIDS_DIR) => Ok(Section::SurfaceGrids),
            Some(METEO_DIR) => Ok(Section::Meteo),
            Some(SNOWFILES_DIR) => Ok(Section::SnowFiles),
            Some(_) => Err(outside()),
        }
    }
}

/// Package path of a file in the surface-grids directory.
pub fn surface_grid(file: &str) -> String {
    format!("{SURFACE_GRIDS_DIR}/{file}")
}

/// Package path of a file in the meteo directory.
pub fn meteo(file: &str) -> String {
    format!("{METEO_DIR}/{file}")
}

/// Package path of a file in the snowfiles directory.
pub fn snowfile(file: &str) -> String {
    format!("{SNOWFILES_DIR}/{file}")
}

/// Check a simulation name: non-empty, no whitespace, no path separators.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.chars().any(char::is_whitespace) {
        Some("name contains whitespace")
    } else if name.contains(['/', '\\', ':']) {
        Some("name contains a path separator")
    } else if name.starts_with('.') {
        Some("name starts with a dot")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(PackageError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
