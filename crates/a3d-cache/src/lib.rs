//! # a3d-cache
//!
//! Content-addressed cache for derived grids (elevation, land cover).
//!
//! Entries are keyed by SHA-256 over the source identifier, the
//! [`GridDefinition`](a3d_spatial::GridDefinition) and the source version, and
//! stored as an ESRI ASCII grid plus an `entry.json` sidecar holding the
//! creation time and the grid checksum. The cache is an explicit service
//! object: open it once at startup and pass it by reference.
//!
//! ```no_run
//! use a3d_cache::{CacheKey, GridCache};
//! # use a3d_spatial::{Crs, GridDataset, GridDefinition, ValueKind};
//! # let grid = GridDefinition::new(Crs::Lv95, 2_600_000.0, 1_200_000.0, 50.0, 40, 40)?;
//!
//! let cache = GridCache::open("./cache")?;
//! let key = CacheKey::new("swissalti3d", "2024", &grid);
//! let cached = cache.get_or_compute::<_, a3d_cache::CacheError>(&key, || {
//!     Ok(GridDataset::filled(grid, ValueKind::Continuous, 1500.0))
//! })?;
//! println!("{:?}", cached.origin);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod entry;
mod error;
mod flight;
mod key;
mod store;

pub use entry::{CacheEntry, ENTRY_FILE, GRID_FILE};
pub use error::CacheError;
pub use key::{checksum, CacheKey};
pub use store::{CacheOrigin, Cached, GridCache};

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
