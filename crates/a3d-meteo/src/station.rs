//! Station metadata.

use crate::dates::DateRange;
use crate::Result;
use a3d_spatial::{Crs, Point};
use serde::{Deserialize, Serialize};

/// A meteorological station as listed in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Identifier, e.g. `WFJ2`. Also the SMET file stem.
    pub id: String,
    pub name: String,
    /// WGS84 latitude in degrees.
    pub latitude: f64,
    /// WGS84 longitude in degrees.
    pub longitude: f64,
    /// Elevation above sea level in metres.
    pub elevation: f64,
    /// Period with data.
    pub available: DateRange,
}

impl Station {
    /// Position in a projected CRS.
    pub fn project(&self, crs: Crs) -> Result<Point> {
        Ok(crs.from_wgs84(self.latitude, self.longitude)?)
    }
}
