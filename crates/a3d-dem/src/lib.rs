//! # a3d-dem
//!
//! Elevation acquisition for Alpine3D surface grids.
//!
//! This crate turns GeoTIFF elevation tiles into an elevation grid aligned to
//! a [`GridDefinition`](a3d_spatial::GridDefinition):
//! - swissALTI3D tiles fetched over HTTP ([`HttpTileSource`])
//! - a directory of user-provided GeoTIFF files ([`LocalDirSource`])
//!
//! ## Overview
//!
//! Tiles are indexed by their projected extent. For every grid cell the
//! elevation is sampled bilinearly at the cell centre from the first tile that
//! covers it; cells covered by no tile are handled according to the
//! [`CoveragePolicy`]. Results are stored in the shared
//! [`GridCache`](a3d_cache::GridCache), keyed by source, grid and source
//! version, so a second acquisition of the same grid performs no network
//! access.
//!
//! Transient HTTP failures (connect, timeout, 429, 5xx) are retried with
//! bounded exponential backoff ([`RetryPolicy`]). A 404 means the tile is
//! outside the source coverage.
//!
//! ## Example
//!
//! ```no_run
//! use a3d_cache::GridCache;
//! use a3d_dem::{acquire, AcquireOptions, CancellationToken, HttpTileSource};
//! use a3d_spatial::{Crs, GridDefinition};
//! use std::time::Duration;
//!
//! let cache = GridCache::open("./cache")?;
//! let source = HttpTileSource::swissalti3d("2019", Duration::from_secs(60))?;
//! let grid = GridDefinition::new(Crs::Lv95, 2_600_000.0, 1_200_000.0, 50.0, 40, 40)?;
//!
//! let dem = acquire(&grid, &source, &cache, &AcquireOptions::default(), &CancellationToken::new())?;
//! println!("elevation range: {:?}", dem.dataset.valid_range());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod acquire;
mod cancel;
mod error;
mod http;
mod local;
mod raster;
mod source;

pub use acquire::{acquire, AcquireOptions, AcquiredDem, CoveragePolicy};
pub use cancel::CancellationToken;
pub use error::DemError;
pub use http::{tiling, HttpTileSource, DEFAULT_TILE_SIZE_M, SWISSALTI3D_URL_TEMPLATE, SWISSALTI3D_VERSION};
pub use local::LocalDirSource;
pub use raster::DemTile;
pub use source::{FetchError, RetryPolicy, TileId, TileSource};

/// Result type for DEM operations.
pub type Result<T> = std::result::Result<T, DemError>;
