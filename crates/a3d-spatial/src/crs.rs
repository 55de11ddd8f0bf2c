//! Coordinate reference systems supported by the pipeline.
//!
//! Target grids must be metric, so only projected systems are accepted as
//! targets. WGS84 is accepted as a display system (what a web map produces)
//! and is projected into the target system before any grid work happens.
//!
//! ## Projections
//!
//! - Swiss LV95 / LV03 use the swisstopo approximate formulas, accurate to
//!   about one metre inside Switzerland.
//! - UTM uses the Krüger series truncated after the sixth-order terms
//!   (Snyder, *Map Projections: A Working Manual*, p. 61).

use crate::geometry::Point;
use crate::{RegionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// WGS84 semi-major axis in metres.
const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// UTM scale factor on the central meridian.
const UTM_K0: f64 = 0.9996;

/// False easting shared by all UTM zones.
const UTM_FALSE_EASTING: f64 = 500_000.0;

/// False northing of southern-hemisphere UTM zones.
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Offset between LV95 and LV03 coordinates (exact by definition).
const LV95_LV03_OFFSET: (f64, f64) = (2_000_000.0, 1_000_000.0);

/// A coordinate reference system, identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Crs {
    /// Geographic WGS84 (EPSG:4326), latitude/longitude in degrees.
    Wgs84,
    /// Swiss CH1903+/LV95 (EPSG:2056).
    Lv95,
    /// Swiss CH1903/LV03 (EPSG:21781).
    Lv03,
    /// WGS84 / UTM (EPSG:326zz north, 327zz south).
    Utm {
        /// UTM zone (1-60).
        zone: u8,
        /// Northern hemisphere.
        north: bool,
    },
}

impl Crs {
    /// Look up a CRS by EPSG code.
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 => Ok(Crs::Wgs84),
            2056 => Ok(Crs::Lv95),
            21781 => Ok(Crs::Lv03),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            other => Err(RegionError::UnsupportedCrs(other)),
        }
    }

    /// EPSG code of this CRS.
    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::Lv95 => 2056,
            Crs::Lv03 => 21781,
            Crs::Utm { zone, north: true } => 32600 + *zone as u32,
            Crs::Utm { zone, north: false } => 32700 + *zone as u32,
        }
    }

    /// Whether coordinates are metric (required for simulation grids).
    pub fn is_projected(&self) -> bool {
        !matches!(self, Crs::Wgs84)
    }

    /// Coordinate system name and parameter as understood by MeteoIO.
    pub fn meteoio_coordsys(&self) -> (&'static str, String) {
        match self {
            Crs::Wgs84 => ("WGS84", String::new()),
            Crs::Lv95 => ("CH1903+", String::new()),
            Crs::Lv03 => ("CH1903", String::new()),
            Crs::Utm { zone, north } => ("UTM", format!("{}{}", zone, if *north { 'N' } else { 'S' })),
        }
    }

    /// Project a WGS84 latitude/longitude into this CRS.
    ///
    /// For [`Crs::Wgs84`] the point is returned as `(x = lon, y = lat)`.
    pub fn from_wgs84(&self, lat: f64, lon: f64) -> Result<Point> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(RegionError::invalid(format!(
                "geographic coordinate ({lat}, {lon}) out of range"
            )));
        }
        match self {
            Crs::Wgs84 => Ok(Point::new(lon, lat)),
            Crs::Lv95 => Ok(wgs84_to_lv95(lat, lon)),
            Crs::Lv03 => {
                let p = wgs84_to_lv95(lat, lon);
                Ok(Point::new(p.x - LV95_LV03_OFFSET.0, p.y - LV95_LV03_OFFSET.1))
            }
            Crs::Utm { zone, north } => Ok(wgs84_to_utm(lat, lon, *zone, *north)),
        }
    }

    /// Transform a point expressed in `self` into `target`.
    ///
    /// Supported: identity, WGS84 to any projected system, and the exact
    /// LV95/LV03 offset. Anything else fails with `InvalidRegion`.
    pub fn transform(&self, point: Point, target: Crs) -> Result<Point> {
        match (self, target) {
            (a, b) if *a == b => Ok(point),
            (Crs::Wgs84, target) => target.from_wgs84(point.y, point.x),
            (Crs::Lv95, Crs::Lv03) => Ok(Point::new(
                point.x - LV95_LV03_OFFSET.0,
                point.y - LV95_LV03_OFFSET.1,
            )),
            (Crs::Lv03, Crs::Lv95) => Ok(Point::new(
                point.x + LV95_LV03_OFFSET.0,
                point.y + LV95_LV03_OFFSET.1,
            )),
            (from, to) => Err(RegionError::invalid(format!(
                "no transformation from EPSG:{} to EPSG:{}",
                from.epsg(),
                to.epsg()
            ))),
        }
    }
}

impl TryFrom<u32> for Crs {
    type Error = RegionError;

    fn try_from(code: u32) -> Result<Self> {
        Crs::from_epsg(code)
    }
}

impl From<Crs> for u32 {
    fn from(crs: Crs) -> u32 {
        crs.epsg()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// swisstopo approximate WGS84 → LV95 conversion.
fn wgs84_to_lv95(lat: f64, lon: f64) -> Point {
    // Auxiliary values in units of 10000 arc-seconds relative to Bern
    let phi = (lat * 3600.0 - 169_028.66) / 10_000.0;
    let lambda = (lon * 3600.0 - 26_782.5) / 10_000.0;

    let e = 2_600_072.37 + 211_455.93 * lambda
        - 10_938.51 * lambda * phi
        - 0.36 * lambda * phi.powi(2)
        - 44.54 * lambda.powi(3);
    let n = 1_200_147.07 + 308_807.95 * phi + 3_745.25 * lambda.powi(2) + 76.63 * phi.powi(2)
        - 194.56 * lambda.powi(2) * phi
        + 119.79 * phi.powi(3);

    Point::new(e, n)
}

/// WGS84 → UTM forward projection.
fn wgs84_to_utm(lat: f64, lon: f64, zone: u8, north: bool) -> Point {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);

    let phi = lat.to_radians();
    let lambda0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();
    let lambda = lon.to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lambda - lambda0);

    let m = WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

    let x = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + UTM_FALSE_EASTING;

    let mut y = UTM_K0
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if !north {
        y += UTM_FALSE_NORTHING_SOUTH;
    }

    Point::new(x, y)
}
