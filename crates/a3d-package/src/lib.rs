//! # a3d-package
//!
//! Assembles the simulation folder handed to Alpine3D:
//!
//! ```text
//! <output>/<name>/
//!     alpine3d.ini, snowpack.ini, meteoio.ini   rendered configs
//!     input/surface-grids/                      dem.asc, landuse.lus, poi.pts
//!     input/meteo/                              <station>.smet
//!     input/snowfiles/                          <station>.sno
//!     manifest.json                             SHA-256 of every file
//! <output>/<name>.zip
//! ```
//!
//! A package is only written when it is complete: every path a rendered
//! config references must be among the artifacts.

mod assemble;
mod error;
pub mod layout;
mod manifest;

pub use assemble::{Artifact, OutputPackage, Packager};
pub use error::PackageError;
pub use layout::Section;
pub use manifest::{Manifest, ManifestFile, MANIFEST_VERSION};

/// Result type for packaging operations.
pub type Result<T> = std::result::Result<T, PackageError>;
