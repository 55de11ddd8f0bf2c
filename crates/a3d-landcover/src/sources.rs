//! Land-cover sources.

use crate::location;
use crate::mapping::{lc27_code, tlm_code};
use crate::prevah::LusCode;
use crate::{LandCoverError, Result};
use a3d_spatial::{
    parse_ascii_grid, Bounds, Crs, FeatureCollection, GridDataset, GridDefinition, Point, Polygon, RegionError,
    ValueKind,
};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// A provider of categorical land-cover grids in LUS codes.
pub trait LandCoverSource: Send + Sync {
    /// Stable identifier, used in cache keys and errors.
    fn id(&self) -> &str;

    /// Version of the underlying data and options.
    fn version(&self) -> &str;

    /// Classify every cell of `grid`.
    fn classify(&self, grid: &GridDefinition) -> Result<GridDataset>;
}

/// Evaluate `f` at every cell centre of `grid`, rows in parallel.
fn rasterize<F>(grid: &GridDefinition, f: F) -> Result<GridDataset>
where
    F: Fn(Point) -> Result<f64> + Sync,
{
    let rows = (0..grid.rows)
        .into_par_iter()
        .map(|row| {
            (0..grid.cols)
                .map(|col| f(grid.cell_center(row, col)))
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;
    Ok(GridDataset::new(
        *grid,
        ValueKind::Categorical,
        rows.into_iter().flatten().collect(),
    )?)
}

// ============================================================================
// SwissTLMRegio
// ============================================================================

/// Attribute holding the land-cover category in SwissTLMRegio exports.
pub const TLM_CATEGORY_ATTRIBUTE: &str = "OBJVAL";

/// Default background for cells outside every polygon (class 7, pasture).
pub const DEFAULT_BACKGROUND: LusCode = LusCode::PASTURE;

/// SwissTLMRegio land-cover polygons, rasterized at cell centres.
#[derive(Debug)]
pub struct TlmSource {
    collection: FeatureCollection,
    crs: Crs,
    attribute: String,
    background: LusCode,
    version: String,
}

impl TlmSource {
    /// Load a GeoJSON export from a path or URL.
    ///
    /// Documents without a `crs` member are read as LV95 unless their
    /// coordinates are geographic.
    pub fn load(location: &str, attribute: &str, background: LusCode) -> Result<Self> {
        let bytes = location::read(location)?;
        let text = String::from_utf8(bytes).map_err(|e| LandCoverError::InvalidSource {
            location: location.to_string(),
            reason: e.to_string(),
        })?;
        let collection = FeatureCollection::parse(&text)?;
        let crs = match collection.epsg {
            Some(code) => Crs::from_epsg(code)?,
            None if looks_geographic(&collection) => Crs::Wgs84,
            None => Crs::Lv95,
        };
        debug!(location, features = collection.features.len(), %crs, "Loaded TLM land cover");

        Ok(Self {
            version: format!(
                "{};attr={};bg={}",
                location::content_version(text.as_bytes()),
                attribute,
                background
            ),
            collection,
            crs,
            attribute: attribute.to_string(),
            background,
        })
    }
}

fn looks_geographic(collection: &FeatureCollection) -> bool {
    collection
        .features
        .iter()
        .flat_map(|f| f.polygons.iter())
        .flat_map(|p| p.exterior().iter())
        .all(|p| p.x.abs() <= 180.0 && p.y.abs() <= 90.0)
}

impl LandCoverSource for TlmSource {
    fn id(&self) -> &str {
        "tlm"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn classify(&self, grid: &GridDefinition) -> Result<GridDataset> {
        let extent = grid.bounds();

        // Polygons touching the grid, in grid CRS, with their codes
        let mut shapes: Vec<(Polygon, Bounds, LusCode)> = Vec::new();
        for feature in &self.collection.features {
            for polygon in &feature.polygons {
                let projected = polygon.try_map(|p| self.crs.transform(p, grid.crs))?;
                let bounds = projected.bounds();
                if !bounds.intersects(&extent) {
                    continue;
                }
                let category = feature.property(&self.attribute).ok_or_else(|| LandCoverError::InvalidSource {
                    location: "tlm".to_string(),
                    reason: format!("feature without '{}' attribute", self.attribute),
                })?;
                shapes.push((projected, bounds, tlm_code(&category)?));
            }
        }
        debug!(polygons = shapes.len(), "Rasterizing TLM land cover");

        let background = self.background.value() as f64;
        rasterize(grid, |p| {
            Ok(shapes
                .iter()
                .find(|(poly, bounds, _)| bounds.contains(p) && poly.contains(p))
                .map(|(_, _, code)| code.value() as f64)
                .unwrap_or(background))
        })
    }
}

// ============================================================================
// BFS Arealstatistik
// ============================================================================

/// Edge of an Arealstatistik sample cell in metres.
const HECTARE: f64 = 100.0;

/// BFS Arealstatistik hectare points (`E,N,LC27`, LV95).
///
/// Each point stands for the hectare whose south-west corner it marks; a cell
/// takes the category of the hectare containing its centre.
#[derive(Debug)]
pub struct BfsSource {
    hectares: HashMap<(i64, i64), i64>,
    background: LusCode,
    version: String,
}

impl BfsSource {
    /// Load a CSV with `E`, `N` and `LC27` (or `LC_27`) columns.
    pub fn load(location: &str, background: LusCode) -> Result<Self> {
        let bytes = location::read(location)?;
        let invalid = |reason: String| LandCoverError::InvalidSource {
            location: location.to_string(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(sniff_delimiter(&bytes))
            .from_reader(bytes.as_slice());
        let headers = reader.headers()?.clone();
        let column = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
                .ok_or_else(|| invalid(format!("missing column {}", names[0])))
        };
        let (e_col, n_col, lc_col) = (column(&["E"])?, column(&["N"])?, column(&["LC27", "LC_27", "AS18_27"])?);

        let mut hectares = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| -> Result<f64> {
                let raw = record.get(i).unwrap_or("").trim();
                raw.parse::<f64>()
                    .map_err(|_| invalid(format!("invalid number {raw:?} on line {}", record.position().map_or(0, |p| p.line()))))
            };
            let (e, n, lc) = (field(e_col)?, field(n_col)?, field(lc_col)?);
            hectares.insert(hectare_of(Point::new(e, n)), lc as i64);
        }
        debug!(location, hectares = hectares.len(), "Loaded BFS land cover");

        Ok(Self {
            hectares,
            background,
            version: format!("{};bg={}", location::content_version(&bytes), background),
        })
    }
}

fn hectare_of(p: Point) -> (i64, i64) {
    ((p.x / HECTARE).floor() as i64, (p.y / HECTARE).floor() as i64)
}

/// Semicolon-separated exports are common; fall back to comma.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or(&[]);
    if first_line.contains(&b';') {
        b';'
    } else {
        b','
    }
}

impl LandCoverSource for BfsSource {
    fn id(&self) -> &str {
        "bfs"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn classify(&self, grid: &GridDefinition) -> Result<GridDataset> {
        let background = self.background.value() as f64;
        rasterize(grid, |p| {
            let lv95 = grid.crs.transform(p, Crs::Lv95)?;
            match self.hectares.get(&hectare_of(lv95)) {
                Some(category) => Ok(lc27_code(*category)?.value() as f64),
                None => Ok(background),
            }
        })
    }
}

// ============================================================================
// Constant
// ============================================================================

/// One code for the whole domain.
#[derive(Debug)]
pub struct ConstantSource {
    code: LusCode,
    version: String,
}

impl ConstantSource {
    pub fn new(code: LusCode) -> Self {
        Self {
            code,
            version: code.to_string(),
        }
    }
}

impl LandCoverSource for ConstantSource {
    fn id(&self) -> &str {
        "constant"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn classify(&self, grid: &GridDefinition) -> Result<GridDataset> {
        Ok(GridDataset::filled(*grid, ValueKind::Categorical, self.code.value() as f64))
    }
}

// ============================================================================
// User override
// ============================================================================

/// A user-supplied ESRI ASCII grid of LUS codes.
///
/// The file must describe exactly the requested grid and contain a valid
/// code in every cell.
#[derive(Debug)]
pub struct OverrideSource {
    location: String,
    text: String,
    version: String,
}

impl OverrideSource {
    pub fn load(location: &str) -> Result<Self> {
        let bytes = location::read(location)?;
        let version = location::content_version(&bytes);
        let text = String::from_utf8(bytes).map_err(|e| LandCoverError::InvalidSource {
            location: location.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            location: location.to_string(),
            text,
            version,
        })
    }
}

impl LandCoverSource for OverrideSource {
    fn id(&self) -> &str {
        "override"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn classify(&self, grid: &GridDefinition) -> Result<GridDataset> {
        let dataset = parse_ascii_grid(&self.text, grid.crs, ValueKind::Categorical)?;
        if dataset.definition() != grid {
            return Err(RegionError::Misaligned(format!(
                "{}: {} does not match {}",
                self.location,
                dataset.definition().fingerprint(),
                grid.fingerprint()
            ))
            .into());
        }
        for &value in dataset.values() {
            if dataset.is_no_data(value) || LusCode::from_cell(value).is_err() {
                return Err(LandCoverError::unmapped("override", value));
            }
        }
        // Normalize the no-data marker
        Ok(GridDataset::new(*grid, ValueKind::Categorical, dataset.values().to_vec())?)
    }
}
