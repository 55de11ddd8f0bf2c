//! Regions of interest.

use crate::crs::Crs;
use crate::geometry::{Bounds, Point, Polygon};
use crate::{RegionError, Result};

/// Outline of a region.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionShape {
    BoundingBox(Bounds),
    Polygon(Polygon),
}

/// A region of interest: outline, the CRS it is expressed in, the metric
/// target CRS of the simulation grid, and the target cell size.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOfInterest {
    pub shape: RegionShape,
    /// CRS of the coordinates in `shape` (may be WGS84).
    pub input_crs: Crs,
    /// Projected CRS of the simulation grid.
    pub target_crs: Crs,
    /// Cell size in metres.
    pub resolution: f64,
}

impl RegionOfInterest {
    pub fn new(shape: RegionShape, input_crs: Crs, target_crs: Crs, resolution: f64) -> Self {
        Self {
            shape,
            input_crs,
            target_crs,
            resolution,
        }
    }

    /// Square region of side `size` metres around `center`.
    ///
    /// The centre is projected into `target_crs` first, so the square is
    /// metric even when the centre was picked on a lat/lon map.
    pub fn square(center: Point, center_crs: Crs, size: f64, target_crs: Crs, resolution: f64) -> Result<Self> {
        if !size.is_finite() || size <= 0.0 {
            return Err(RegionError::invalid(format!("ROI size must be positive, got {size}")));
        }
        if !target_crs.is_projected() {
            return Err(RegionError::invalid(format!("target CRS {target_crs} is not projected")));
        }
        let center = center_crs.transform(center, target_crs)?;
        Ok(Self::new(
            RegionShape::BoundingBox(Bounds::square(center, size)),
            target_crs,
            target_crs,
            resolution,
        ))
    }

    /// Check the invariants that do not depend on coverage.
    pub fn validate(&self) -> Result<()> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(RegionError::invalid(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !self.target_crs.is_projected() {
            return Err(RegionError::invalid(format!(
                "target CRS {} is geographic; a projected CRS is required",
                self.target_crs
            )));
        }
        let area = self.target_polygon()?.area();
        if !(area > 0.0) {
            return Err(RegionError::invalid("region has zero area"));
        }
        Ok(())
    }

    /// Outline projected into the target CRS.
    pub fn target_polygon(&self) -> Result<Polygon> {
        let outline = match &self.shape {
            RegionShape::BoundingBox(b) => b.to_polygon(),
            RegionShape::Polygon(p) => p.clone(),
        };
        if self.input_crs == self.target_crs {
            return Ok(outline);
        }
        outline.try_map(|p| self.input_crs.transform(p, self.target_crs))
    }

    /// Check that a point (in the target CRS) lies inside the region.
    pub fn contains(&self, point: Point) -> Result<bool> {
        let outline = self.target_polygon()?;
        Ok(outline.contains(point) || on_boundary(&outline.bounds(), point, &self.shape))
    }
}

/// Bounding boxes include their edges; polygons use the strict interior test.
fn on_boundary(bounds: &Bounds, point: Point, shape: &RegionShape) -> bool {
    matches!(shape, RegionShape::BoundingBox(_)) && bounds.contains(point)
}
