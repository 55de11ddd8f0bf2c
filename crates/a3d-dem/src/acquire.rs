//! Elevation acquisition: cache lookup, tile fetch, mosaic and resampling.

use crate::cancel::CancellationToken;
use crate::raster::DemTile;
use crate::source::{RetryPolicy, TileSource};
use crate::{DemError, Result};
use a3d_cache::{CacheKey, CacheOrigin, GridCache};
use a3d_metrics::metric_defs;
use a3d_spatial::{GridDataset, GridDefinition, ValueKind, NO_DATA};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What to do with grid cells no tile covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Fail with [`DemError::Coverage`].
    #[default]
    Strict,
    /// Leave the cells at no-data and report them.
    BestEffort,
}

/// Options of one [`acquire`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AcquireOptions {
    pub policy: CoveragePolicy,
    pub retry: RetryPolicy,
}

/// Result of an elevation acquisition.
#[derive(Debug, Clone)]
pub struct AcquiredDem {
    /// Elevation grid aligned to the requested definition.
    pub dataset: GridDataset,
    pub origin: CacheOrigin,
    /// Cells left at no-data (always 0 under [`CoveragePolicy::Strict`]).
    pub missing_cells: usize,
}

/// Acquire an elevation grid for `grid` from `source`.
///
/// Served from `cache` when an entry for (source, grid, version) exists;
/// otherwise the covering tiles are fetched one by one (checking `cancel`
/// before each), mosaicked and sampled bilinearly at cell centres, then
/// published to the cache. Concurrent calls for the same key fetch once.
pub fn acquire(
    grid: &GridDefinition,
    source: &dyn TileSource,
    cache: &GridCache,
    options: &AcquireOptions,
    cancel: &CancellationToken,
) -> Result<AcquiredDem> {
    if source.crs() != grid.crs {
        return Err(DemError::CrsMismatch {
            source_crs: source.crs(),
            grid_crs: grid.crs,
        });
    }
    if cancel.is_cancelled() {
        return Err(DemError::Cancelled);
    }

    let key = CacheKey::new(source.id(), source.version(), grid);
    // The key carries no policy: the mosaic is published whatever the caller
    // asked for, and coverage is judged below on the returned grid.
    let cached = cache.get_or_compute(&key, || build_grid(grid, source, &options.retry, cancel))?;

    let missing_cells = cached.dataset.no_data_count();
    if missing_cells > 0 {
        match options.policy {
            CoveragePolicy::Strict => {
                return Err(DemError::Coverage {
                    source_id: source.id().to_string(),
                    missing_cells,
                });
            }
            CoveragePolicy::BestEffort => {
                warn!(
                    source = source.id(),
                    missing_cells,
                    total_cells = grid.len(),
                    "Elevation grid has uncovered cells, left at no-data"
                );
                metrics::counter!(metric_defs::UNCOVERED_CELLS.name, "source" => source.id().to_string())
                    .increment(missing_cells as u64);
            }
        }
    }

    info!(
        source = source.id(),
        key = %key,
        origin = ?cached.origin,
        cols = grid.cols,
        rows = grid.rows,
        "Elevation grid ready"
    );

    Ok(AcquiredDem {
        dataset: cached.dataset,
        origin: cached.origin,
        missing_cells,
    })
}

/// Fetch the tiles covering `grid` and resample them onto it.
fn build_grid(
    grid: &GridDefinition,
    source: &dyn TileSource,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<GridDataset> {
    let tile_ids = source.tiles_for(&grid.bounds());
    debug!(source = source.id(), tiles = tile_ids.len(), "Fetching elevation tiles");

    let mut tiles = Vec::with_capacity(tile_ids.len());
    for id in &tile_ids {
        if cancel.is_cancelled() {
            return Err(DemError::Cancelled);
        }
        match retry.fetch(source, id)? {
            Some(tile) => tiles.push(tile),
            None => debug!(source = source.id(), tile = %id.name, "Tile not in coverage"),
        }
    }

    let values = mosaic(grid, &tiles);
    Ok(GridDataset::new(*grid, ValueKind::Continuous, values)?)
}

/// Sample `tiles` at every cell centre of `grid`, north row first.
///
/// Where tiles overlap the first one with a valid sample wins.
fn mosaic(grid: &GridDefinition, tiles: &[DemTile]) -> Vec<f64> {
    (0..grid.rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            (0..grid.cols).map(move |col| {
                let p = grid.cell_center(row, col);
                tiles
                    .iter()
                    .find_map(|tile| tile.sample_bilinear(p))
                    .unwrap_or(NO_DATA)
            })
        })
        .collect()
}
