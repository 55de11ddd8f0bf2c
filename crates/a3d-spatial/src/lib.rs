//! # a3d-spatial
//!
//! Spatial reference resolution for the A3D input preparation pipeline.
//!
//! This crate turns a user-specified region of interest into the single
//! [`GridDefinition`] that every raster of a simulation request is aligned to,
//! and provides the raster container ([`GridDataset`]) and the ESRI ASCII
//! grid codec used by Alpine3D.
//!
//! ## Overview
//!
//! - [`Crs`]: the coordinate systems understood by the pipeline (LV95, LV03,
//!   UTM, and WGS84 as a display-only system).
//! - [`RegionOfInterest`]: a bounding box or polygon plus target CRS and
//!   resolution.
//! - [`Coverage`]: where national data sources are available; the Swiss
//!   boundary for the national sources, unrestricted for user-provided data.
//! - [`resolve`]: deterministic snapping of a region onto the resolution
//!   lattice.
//!
//! ## Snapping
//!
//! The origin is snapped down (`floor(xmin / res) * res`) and the far edge up
//! (`ceil(xmax / res) * res`). Edges already on the lattice add no cell, so a
//! 2 km aligned box at 50 m resolves to exactly 40 x 40 cells.
//!
//! ## Example
//!
//! ```
//! use a3d_spatial::{resolve, Coverage, Crs, Point, RegionOfInterest};
//!
//! let roi = RegionOfInterest::square(Point::new(2_600_000.0, 1_200_000.0), Crs::Lv95, 2_000.0, Crs::Lv95, 50.0)?;
//! let grid = resolve(&roi, &Coverage::switzerland())?;
//! assert_eq!((grid.cols, grid.rows), (40, 40));
//! # Ok::<(), a3d_spatial::RegionError>(())
//! ```

mod ascii_grid;
mod coverage;
mod crs;
mod error;
mod geojson;
mod geometry;
mod grid;
mod region;

pub use ascii_grid::{parse_ascii_grid, read_ascii_grid, write_ascii_grid};
pub use coverage::Coverage;
pub use crs::Crs;
pub use error::RegionError;
pub use geojson::{Feature, FeatureCollection};
pub use geometry::{Bounds, Point, Polygon};
pub use grid::{resolve, GridDataset, GridDefinition, ValueKind, NO_DATA};
pub use region::{RegionOfInterest, RegionShape};

/// Result type for spatial operations.
pub type Result<T> = std::result::Result<T, RegionError>;
