//! Tile sources and transport retry.

use crate::raster::DemTile;
use crate::{DemError, Result};
use a3d_metrics::metric_defs;
use a3d_spatial::{Bounds, Crs};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Identifier and extent of one tile of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct TileId {
    /// Source specific name, e.g. `2600-1200` for a 1 km LV95 tile.
    pub name: String,
    /// Nominal extent of the tile in the source CRS.
    pub bounds: Bounds,
}

/// Failure of a single tile fetch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// The tile does not exist; its area is outside the source coverage.
    #[error("tile not in coverage")]
    NotFound,

    /// Connection, timeout, 429 or 5xx. Worth retrying.
    #[error("transient: {0}")]
    Transient(String),

    /// Anything else.
    #[error("{0}")]
    Fatal(String),
}

/// A provider of elevation tiles in a projected CRS.
pub trait TileSource: Send + Sync {
    /// Stable identifier, used in cache keys and errors.
    fn id(&self) -> &str;

    /// Data version. A change invalidates cached grids of this source.
    fn version(&self) -> &str;

    /// CRS of the tiles.
    fn crs(&self) -> Crs;

    /// Tiles that may intersect `bounds`, in a deterministic order.
    fn tiles_for(&self, bounds: &Bounds) -> Vec<TileId>;

    /// Fetch and decode one tile.
    fn fetch(&self, tile: &TileId) -> std::result::Result<DemTile, FetchError>;
}

/// Bounded exponential backoff for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per tile, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every retry.
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// No retries and no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Fetch `tile`, retrying transient failures.
    ///
    /// Returns `Ok(None)` when the tile is not in the source coverage.
    pub fn fetch(&self, source: &dyn TileSource, tile: &TileId) -> Result<Option<DemTile>> {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.initial_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match source.fetch(tile) {
                Ok(tile) => return Ok(Some(tile)),
                Err(FetchError::NotFound) => return Ok(None),
                Err(FetchError::Transient(e)) if attempt < max_attempts => {
                    warn!(
                        source = source.id(),
                        tile = %tile.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Tile fetch failed, retrying"
                    );
                    metrics::counter!(metric_defs::FETCH_RETRIES.name, "source" => source.id().to_string()).increment(1);
                    std::thread::sleep(delay);
                    delay = std::cmp::min(delay * 2, self.max_delay);
                }
                Err(e) => {
                    return Err(DemError::Acquisition {
                        source_id: source.id().to_string(),
                        attempts: attempt,
                        last_error: format!("tile {}: {}", tile.name, e),
                    });
                }
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
