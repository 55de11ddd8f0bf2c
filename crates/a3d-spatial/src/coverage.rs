//! Data coverage areas.

use crate::crs::Crs;
use crate::geometry::{Point, Polygon};
use crate::{RegionError, Result};

/// Simplified Swiss national boundary in LV95 (EPSG:2056).
const SWISS_BOUNDARY_LV95: [(f64, f64); 21] = [
    (2_485_000.0, 1_075_000.0),
    (2_485_000.0, 1_110_000.0),
    (2_490_000.0, 1_145_000.0),
    (2_495_000.0, 1_185_000.0),
    (2_510_000.0, 1_230_000.0),
    (2_525_000.0, 1_265_000.0),
    (2_570_000.0, 1_295_000.0),
    (2_630_000.0, 1_296_000.0),
    (2_720_000.0, 1_295_000.0),
    (2_795_000.0, 1_280_000.0),
    (2_834_000.0, 1_255_000.0),
    (2_830_000.0, 1_220_000.0),
    (2_815_000.0, 1_185_000.0),
    (2_785_000.0, 1_150_000.0),
    (2_750_000.0, 1_110_000.0),
    (2_715_000.0, 1_085_000.0),
    (2_680_000.0, 1_080_000.0),
    (2_630_000.0, 1_085_000.0),
    (2_580_000.0, 1_095_000.0),
    (2_530_000.0, 1_085_000.0),
    (2_490_000.0, 1_078_000.0),
];

/// Area in which the configured data sources can serve a region.
#[derive(Debug, Clone, PartialEq)]
pub enum Coverage {
    /// No restriction (user-provided data).
    Unrestricted,
    /// Regions must lie entirely inside `polygon`, expressed in `crs`.
    Boundary {
        name: String,
        polygon: Polygon,
        crs: Crs,
    },
}

impl Coverage {
    /// Coverage of the Swiss national data sources.
    pub fn switzerland() -> Self {
        let ring = SWISS_BOUNDARY_LV95.iter().map(|&(x, y)| Point::new(x, y)).collect();
        match Polygon::new(ring) {
            Ok(polygon) => Coverage::Boundary {
                name: "Switzerland".to_string(),
                polygon,
                crs: Crs::Lv95,
            },
            Err(_) => Coverage::Unrestricted,
        }
    }

    /// Check that `region` (expressed in `crs`) is fully covered.
    pub fn check(&self, region: &Polygon, crs: Crs) -> Result<()> {
        let (name, boundary, boundary_crs) = match self {
            Coverage::Unrestricted => return Ok(()),
            Coverage::Boundary { name, polygon, crs } => (name, polygon, *crs),
        };

        let boundary = if boundary_crs == crs {
            boundary.clone()
        } else {
            boundary.try_map(|p| boundary_crs.transform(p, crs))?
        };

        if boundary.contains_polygon(region) {
            Ok(())
        } else if boundary.intersects(region) {
            Err(RegionError::invalid(format!("region crosses the {name} coverage boundary")))
        } else {
            Err(RegionError::invalid(format!("region lies completely outside {name} coverage")))
        }
    }
}
