//! Grid definitions and raster datasets.
//!
//! A [`GridDefinition`] is the lattice that every raster of a request shares.
//! Rows are stored north first: row 0 is the northernmost row, matching the
//! ESRI ASCII grid layout read by Alpine3D.

use crate::coverage::Coverage;
use crate::crs::Crs;
use crate::geometry::{Bounds, Point, Polygon};
use crate::region::RegionOfInterest;
use crate::{RegionError, Result};
use serde::{Deserialize, Serialize};

/// No-data value used for every dataset produced by the pipeline.
pub const NO_DATA: f64 = -9999.0;

/// Tolerance (in cells) below which a coordinate counts as lying on the lattice.
const LATTICE_EPSILON: f64 = 1e-6;

/// Lattice shared by all rasters of one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDefinition {
    pub crs: Crs,
    /// West edge of the grid (`xllcorner`).
    pub xllcorner: f64,
    /// South edge of the grid (`yllcorner`).
    pub yllcorner: f64,
    pub cell_size: f64,
    pub cols: usize,
    pub rows: usize,
}

impl GridDefinition {
    /// Create a definition, checking that it describes a non-empty metric grid.
    pub fn new(crs: Crs, xllcorner: f64, yllcorner: f64, cell_size: f64, cols: usize, rows: usize) -> Result<Self> {
        if !crs.is_projected() {
            return Err(RegionError::invalid(format!("grid CRS {crs} is not projected")));
        }
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(RegionError::invalid(format!("cell size must be positive, got {cell_size}")));
        }
        if cols == 0 || rows == 0 {
            return Err(RegionError::invalid("grid has no cells"));
        }
        Ok(Self {
            crs,
            xllcorner,
            yllcorner,
            cell_size,
            cols,
            rows,
        })
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            self.xllcorner,
            self.yllcorner,
            self.xllcorner + self.cols as f64 * self.cell_size,
            self.yllcorner + self.rows as f64 * self.cell_size,
        )
    }

    /// Centre of the cell at `(row, col)`, row 0 being the northernmost.
    pub fn cell_center(&self, row: usize, col: usize) -> Point {
        Point::new(
            self.xllcorner + (col as f64 + 0.5) * self.cell_size,
            self.yllcorner + ((self.rows - 1 - row) as f64 + 0.5) * self.cell_size,
        )
    }

    /// Cell containing `p`, or `None` outside the grid.
    pub fn cell_index(&self, p: Point) -> Option<(usize, usize)> {
        let col = ((p.x - self.xllcorner) / self.cell_size).floor();
        let row_from_south = ((p.y - self.yllcorner) / self.cell_size).floor();
        if col < 0.0 || row_from_south < 0.0 {
            return None;
        }
        let (col, row_from_south) = (col as usize, row_from_south as usize);
        if col >= self.cols || row_from_south >= self.rows {
            return None;
        }
        Some((self.rows - 1 - row_from_south, col))
    }

    /// Iterate over `(row, col, centre)` in storage order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, Point)> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| (row, col, self.cell_center(row, col))))
    }

    /// Canonical text form, stable across runs, used in cache keys.
    pub fn fingerprint(&self) -> String {
        format!(
            "epsg={};xll={:.6};yll={:.6};cell={:.6};cols={};rows={}",
            self.crs.epsg(),
            self.xllcorner,
            self.yllcorner,
            self.cell_size,
            self.cols,
            self.rows
        )
    }
}

/// Snap a region onto its resolution lattice.
///
/// The west/south edges go down to the previous lattice line and the east/north
/// edges up to the next one; edges already on the lattice stay put.
pub fn resolve(region: &RegionOfInterest, coverage: &Coverage) -> Result<GridDefinition> {
    region.validate()?;
    let outline = region.target_polygon()?;
    coverage.check(&outline, region.target_crs)?;

    let res = region.resolution;
    let b = outline.bounds();
    let x0 = snap_down(b.min_x, res);
    let y0 = snap_down(b.min_y, res);
    let x1 = snap_up(b.max_x, res);
    let y1 = snap_up(b.max_y, res);

    let cols = ((x1 - x0) / res).round() as usize;
    let rows = ((y1 - y0) / res).round() as usize;
    GridDefinition::new(region.target_crs, x0, y0, res, cols, rows)
}

fn snap_down(v: f64, res: f64) -> f64 {
    let q = v / res;
    let nearest = q.round();
    if (q - nearest).abs() < LATTICE_EPSILON {
        nearest * res
    } else {
        q.floor() * res
    }
}

fn snap_up(v: f64, res: f64) -> f64 {
    let q = v / res;
    let nearest = q.round();
    if (q - nearest).abs() < LATTICE_EPSILON {
        nearest * res
    } else {
        q.ceil() * res
    }
}

/// How values of a dataset are interpreted when resampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Measured quantity (elevation); bilinear interpolation is valid.
    Continuous,
    /// Class codes (land use); only nearest-neighbour is valid.
    Categorical,
}

/// A raster over a [`GridDefinition`], stored row-major north row first.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDataset {
    definition: GridDefinition,
    kind: ValueKind,
    no_data: f64,
    values: Vec<f64>,
}

impl GridDataset {
    /// Wrap `values`, which must hold exactly one value per cell.
    pub fn new(definition: GridDefinition, kind: ValueKind, values: Vec<f64>) -> Result<Self> {
        Self::with_no_data(definition, kind, NO_DATA, values)
    }

    pub fn with_no_data(definition: GridDefinition, kind: ValueKind, no_data: f64, values: Vec<f64>) -> Result<Self> {
        if values.len() != definition.len() {
            return Err(RegionError::Misaligned(format!(
                "{} values for a {}x{} grid",
                values.len(),
                definition.cols,
                definition.rows
            )));
        }
        Ok(Self {
            definition,
            kind,
            no_data,
            values,
        })
    }

    /// Dataset with every cell set to `value`.
    pub fn filled(definition: GridDefinition, kind: ValueKind, value: f64) -> Self {
        Self {
            definition,
            kind,
            no_data: NO_DATA,
            values: vec![value; definition.len()],
        }
    }

    pub fn definition(&self) -> &GridDefinition {
        &self.definition
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn no_data(&self) -> f64 {
        self.no_data
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_no_data(&self, v: f64) -> bool {
        v.is_nan() || v == self.no_data
    }

    /// Value at `(row, col)`, `None` for no-data or out-of-range indices.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.definition.rows || col >= self.definition.cols {
            return None;
        }
        let v = self.values[row * self.definition.cols + col];
        (!self.is_no_data(v)).then_some(v)
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if row < self.definition.rows && col < self.definition.cols {
            self.values[row * self.definition.cols + col] = value;
        }
    }

    /// Number of no-data cells.
    pub fn no_data_count(&self) -> usize {
        self.values.iter().filter(|v| self.is_no_data(**v)).count()
    }

    /// Minimum and maximum of valid cells, `None` if every cell is no-data.
    pub fn valid_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .filter(|v| !self.is_no_data(**v))
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Distinct valid values, sorted ascending (for categorical grids).
    pub fn distinct_values(&self) -> Vec<f64> {
        let mut out: Vec<f64> = self.values.iter().copied().filter(|v| !self.is_no_data(*v)).collect();
        out.sort_by(|a, b| a.total_cmp(b));
        out.dedup();
        out
    }

    /// Nearest-neighbour sample at a point in the grid CRS.
    pub fn sample_nearest(&self, p: Point) -> Option<f64> {
        let (row, col) = self.definition.cell_index(p)?;
        self.get(row, col)
    }

    /// Bilinear sample between cell centres.
    ///
    /// Near the outer edge, or next to no-data cells, falls back to the
    /// nearest cell. Categorical datasets are always sampled nearest.
    pub fn sample_bilinear(&self, p: Point) -> Option<f64> {
        if self.kind == ValueKind::Categorical {
            return self.sample_nearest(p);
        }
        let def = &self.definition;
        let fx = (p.x - def.xllcorner) / def.cell_size - 0.5;
        let fy_south = (p.y - def.yllcorner) / def.cell_size - 0.5;
        let fy = (def.rows as f64 - 1.0) - fy_south;

        let c0 = fx.floor();
        let r0 = fy.floor();
        if c0 < 0.0 || r0 < 0.0 || c0 + 1.0 >= def.cols as f64 || r0 + 1.0 >= def.rows as f64 {
            return self.sample_nearest(p);
        }
        let (c0, r0) = (c0 as usize, r0 as usize);
        let (dx, dy) = (fx - c0 as f64, fy - r0 as f64);

        let corners = (
            self.get(r0, c0),
            self.get(r0, c0 + 1),
            self.get(r0 + 1, c0),
            self.get(r0 + 1, c0 + 1),
        );
        match corners {
            (Some(v00), Some(v01), Some(v10), Some(v11)) => {
                let top = v00 * (1.0 - dx) + v01 * dx;
                let bottom = v10 * (1.0 - dx) + v11 * dx;
                Some(top * (1.0 - dy) + bottom * dy)
            }
            _ => self.sample_nearest(p),
        }
    }

    /// Set every cell whose centre lies outside `outline` to no-data and
    /// return how many cells were outside. The definition is unchanged.
    pub fn mask_outside(&mut self, outline: &Polygon) -> usize {
        let def = self.definition;
        let mut outside = 0;
        for (row, col, centre) in def.cells() {
            if !outline.contains(centre) {
                self.values[row * def.cols + col] = self.no_data;
                outside += 1;
            }
        }
        outside
    }

    /// Fail unless `other` shares this dataset's grid definition.
    pub fn ensure_aligned(&self, other: &GridDataset) -> Result<()> {
        if self.definition != other.definition {
            return Err(RegionError::Misaligned(format!(
                "{} vs {}",
                self.definition.fingerprint(),
                other.definition.fingerprint()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionShape;
    use approx::assert_abs_diff_eq;

    fn def(cols: usize, rows: usize) -> GridDefinition {
        GridDefinition::new(Crs::Lv95, 2_600_000.0, 1_200_000.0, 10.0, cols, rows).unwrap()
    }

    fn bbox(x0: f64, y0: f64, x1: f64, y1: f64, res: f64) -> RegionOfInterest {
        RegionOfInterest::new(RegionShape::BoundingBox(Bounds::new(x0, y0, x1, y1)), Crs::Lv95, Crs::Lv95, res)
    }

    #[test]
    fn test_resolve_aligned_box() {
        let grid = resolve(&bbox(2_600_000.0, 1_200_000.0, 2_602_000.0, 1_202_000.0, 50.0), &Coverage::Unrestricted).unwrap();
        assert_eq!((grid.cols, grid.rows), (40, 40));
        assert_eq!(grid.xllcorner, 2_600_000.0);
        assert_eq!(grid.yllcorner, 1_200_000.0);
    }

    #[test]
    fn test_resolve_misaligned_box() {
        let grid = resolve(&bbox(2_600_010.0, 1_200_020.0, 2_602_010.0, 1_202_020.0, 50.0), &Coverage::Unrestricted).unwrap();
        assert_eq!((grid.cols, grid.rows), (41, 41));
        assert_eq!(grid.xllcorner, 2_600_000.0);
        assert!(grid.bounds().contains_bounds(&Bounds::new(2_600_010.0, 1_200_020.0, 2_602_010.0, 1_202_020.0)));
    }

    #[test]
    fn test_resolve_tolerates_float_noise() {
        let grid = resolve(
            &bbox(2_600_000.000_000_1, 1_200_000.0, 2_601_999.999_999_9, 1_202_000.0, 50.0),
            &Coverage::Unrestricted,
        )
        .unwrap();
        assert_eq!((grid.cols, grid.rows), (40, 40));
    }

    #[test]
    fn test_cell_center_and_index_north_first() {
        let d = def(4, 3);
        let nw = d.cell_center(0, 0);
        assert_eq!(nw, Point::new(2_600_005.0, 1_200_025.0));
        assert_eq!(d.cell_index(nw), Some((0, 0)));
        assert_eq!(d.cell_index(Point::new(2_600_035.0, 1_200_001.0)), Some((2, 3)));
        assert_eq!(d.cell_index(Point::new(2_600_040.0, 1_200_001.0)), None);
        assert_eq!(d.cell_index(Point::new(2_599_999.0, 1_200_001.0)), None);
        assert_eq!(d.cells().count(), 12);
    }

    #[test]
    fn test_dataset_length_checked() {
        assert!(matches!(
            GridDataset::new(def(2, 2), ValueKind::Continuous, vec![1.0; 3]),
            Err(RegionError::Misaligned(_))
        ));
    }

    #[test]
    fn test_valid_range_skips_no_data() {
        let ds = GridDataset::new(def(2, 2), ValueKind::Continuous, vec![1500.0, NO_DATA, 1200.0, 2100.0]).unwrap();
        assert_eq!(ds.valid_range(), Some((1200.0, 2100.0)));
        assert_eq!(ds.no_data_count(), 1);
        assert_eq!(ds.get(0, 1), None);

        let empty = GridDataset::filled(def(2, 2), ValueKind::Continuous, NO_DATA);
        assert_eq!(empty.valid_range(), None);
    }

    #[test]
    fn test_bilinear_between_centres() {
        // North row 10, 20 ; south row 30, 40
        let ds = GridDataset::new(def(2, 2), ValueKind::Continuous, vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        let mid = Point::new(2_600_010.0, 1_200_010.0);
        assert_abs_diff_eq!(ds.sample_bilinear(mid).unwrap(), 25.0, epsilon = 1e-9);
        // Exactly on the north-west centre
        assert_abs_diff_eq!(ds.sample_bilinear(Point::new(2_600_005.0, 1_200_015.0)).unwrap(), 10.0, epsilon = 1e-9);
        // Outer half-cell falls back to nearest
        assert_eq!(ds.sample_bilinear(Point::new(2_600_001.0, 1_200_019.0)), Some(10.0));
        assert_eq!(ds.sample_bilinear(Point::new(2_500_000.0, 1_200_019.0)), None);
    }

    #[test]
    fn test_categorical_sampling_is_nearest() {
        let ds = GridDataset::new(def(2, 2), ValueKind::Categorical, vec![10300.0, 10200.0, 10300.0, 11500.0]).unwrap();
        let v = ds.sample_bilinear(Point::new(2_600_011.0, 1_200_009.0)).unwrap();
        assert_eq!(v, 11500.0);
        assert_eq!(ds.distinct_values(), vec![10200.0, 10300.0, 11500.0]);
    }

    #[test]
    fn test_alignment_check() {
        let a = GridDataset::filled(def(2, 2), ValueKind::Continuous, 1.0);
        let b = GridDataset::filled(def(2, 3), ValueKind::Categorical, 1.0);
        assert!(a.ensure_aligned(&a.clone()).is_ok());
        assert!(matches!(a.ensure_aligned(&b), Err(RegionError::Misaligned(_))));
    }

    #[test]
    fn test_mask_outside_polygon() {
        let mut ds = GridDataset::filled(def(4, 4), ValueKind::Continuous, 1500.0);
        // South-west half of the grid, diagonal cells included
        let outline = Polygon::new(vec![
            Point::new(2_599_995.0, 1_199_995.0),
            Point::new(2_600_050.0, 1_199_995.0),
            Point::new(2_599_995.0, 1_200_050.0),
        ])
        .unwrap();

        assert_eq!(ds.mask_outside(&outline), 6);
        assert_eq!(ds.no_data_count(), 6);
        assert_eq!(ds.definition(), &def(4, 4));
        assert_eq!(ds.get(0, 0), Some(1500.0));
        assert_eq!(ds.get(3, 3), Some(1500.0));
        assert_eq!(ds.get(0, 3), None);
        assert_eq!(ds.get(2, 3), None);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(
            def(4, 3).fingerprint(),
            "epsg=2056;xll=2600000.000000;yll=1200000.000000;cell=10.000000;cols=4;rows=3"
        );
    }
}
