//! Cached land-cover derivation.

use crate::prevah::{LusCode, SurfaceParameters};
use crate::sources::LandCoverSource;
use crate::{LandCoverError, Result};
use a3d_cache::{CacheKey, CacheOrigin, GridCache};
use a3d_spatial::{GridDataset, GridDefinition, ValueKind};
use std::collections::BTreeMap;
use tracing::info;

/// A derived land-cover grid and the parameters of its classes.
#[derive(Debug, Clone)]
pub struct LandCover {
    /// Categorical grid of LUS codes, aligned to the requested definition.
    pub dataset: GridDataset,
    /// Surface parameters of every code present in the grid.
    pub parameters: BTreeMap<LusCode, SurfaceParameters>,
    pub origin: CacheOrigin,
}

/// Derive the land-cover grid for `grid` from `source`, through `cache`.
pub fn derive(grid: &GridDefinition, source: &dyn LandCoverSource, cache: &GridCache) -> Result<LandCover> {
    let key = CacheKey::new(source.id(), source.version(), grid);
    let cached = cache.get_or_compute::<_, LandCoverError>(&key, || {
        let dataset = source.classify(grid)?;
        if dataset.kind() != ValueKind::Categorical {
            return Ok(GridDataset::new(*grid, ValueKind::Categorical, dataset.values().to_vec())?);
        }
        Ok(dataset)
    })?;

    let mut parameters = BTreeMap::new();
    for value in cached.dataset.distinct_values() {
        let code = LusCode::from_cell(value)?;
        parameters.insert(code, code.parameters());
    }

    info!(
        source = source.id(),
        key = %key,
        origin = ?cached.origin,
        classes = parameters.len(),
        "Land-cover grid ready"
    );

    Ok(LandCover {
        dataset: cached.dataset,
        parameters,
        origin: cached.origin,
    })
}
