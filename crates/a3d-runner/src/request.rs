//! Simulation request files.

use a3d_dem::CoveragePolicy;
use a3d_landcover::LusCode;
use a3d_meteo::{DateRange, MeteoError};
use a3d_spatial::{Bounds, Crs, FeatureCollection, Point, RegionError, RegionOfInterest, RegionShape};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reading a request file.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Cannot read request {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid request {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Outline of the region of interest.
///
/// ```yaml
/// roi: { center: { x: 2783500, y: 1187500 }, size: 2000 }
/// roi: { bbox: { min_x: 2782500, min_y: 1186500, max_x: 2784500, max_y: 1188500 } }
/// roi: { geojson: davos.geojson }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoiSpec {
    /// Square of side `size` metres around `center`.
    Square { center: Point, size: f64 },
    BoundingBox { bbox: Bounds },
    /// First polygon of a GeoJSON file, relative to the request file.
    GeoJson { geojson: PathBuf },
}

/// Land-cover source of a request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandCoverChoice {
    /// swissTLM3D polygons.
    #[default]
    Tlm,
    /// BFS Arealstatistik hectares.
    Bfs,
    /// One code for every cell.
    Constant(LusCode),
    /// A user grid aligned with the simulation grid.
    Override(PathBuf),
}

/// Where elevation data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// National sources; the region must lie inside Switzerland.
    #[default]
    Switzerland,
    /// GeoTIFF tiles from `user_dem_dir`; no national coverage check.
    UserProvided,
}

/// A named point of interest. Without `z` the elevation is sampled from the DEM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoiSpec {
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: Option<f64>,
}

fn default_crs() -> u32 {
    2056
}

fn default_true() -> bool {
    true
}

/// Which grids of a polygon request are cut to the polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Masking {
    pub landcover: bool,
    pub dem: bool,
}

/// A simulation request, immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationRequest {
    pub simulation_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub roi: RoiSpec,
    /// EPSG code of the simulation grid.
    #[serde(default = "default_crs")]
    pub crs: u32,
    /// EPSG code of `roi` and `pois` when they are not given in `crs`.
    #[serde(default)]
    pub display_crs: Option<u32>,
    /// Cell size in metres.
    pub resolution: f64,
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub landcover: LandCoverChoice,
    #[serde(default)]
    pub pois: Vec<PoiSpec>,
    #[serde(default)]
    pub mode: Mode,
    /// Directory of user GeoTIFF tiles (`user_provided` mode).
    #[serde(default)]
    pub user_dem_dir: Option<PathBuf>,
    /// Overrides the coverage policy of the settings.
    #[serde(default)]
    pub coverage: Option<CoveragePolicy>,
    /// Skip station selection; the meteo directory is left for the user.
    #[serde(default)]
    pub skip_meteo: bool,
    /// Set land-use cells outside a polygon ROI to no-data.
    #[serde(default = "default_true")]
    pub mask_landcover: bool,
    /// Set elevation cells outside a polygon ROI to no-data. Defaults to
    /// `mask_landcover` and needs it.
    #[serde(default)]
    pub mask_dem: Option<bool>,
}

impl SimulationRequest {
    /// Read a request file. Relative paths inside it are resolved against
    /// the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RequestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RequestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut request = Self::from_yaml(&text).map_err(|source| RequestError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            request.rebase(base);
        }
        Ok(request)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let RoiSpec::GeoJson { geojson } = &mut self.roi {
            join(geojson);
        }
        if let LandCoverChoice::Override(p) = &mut self.landcover {
            join(p);
        }
        if let Some(dir) = &mut self.user_dem_dir {
            join(dir);
        }
    }

    pub fn target_crs(&self) -> Result<Crs, RegionError> {
        Crs::from_epsg(self.crs)
    }

    /// CRS of the ROI and POI coordinates.
    pub fn input_crs(&self) -> Result<Crs, RegionError> {
        Crs::from_epsg(self.display_crs.unwrap_or(self.crs))
    }

    /// Region of interest with the target CRS and resolution.
    pub fn region(&self) -> Result<RegionOfInterest, RegionError> {
        let target = self.target_crs()?;
        let input = self.input_crs()?;
        let roi = match &self.roi {
            RoiSpec::Square { center, size } => {
                RegionOfInterest::square(*center, input, *size, target, self.resolution)?
            }
            RoiSpec::BoundingBox { bbox } => {
                RegionOfInterest::new(RegionShape::BoundingBox(*bbox), input, target, self.resolution)
            }
            RoiSpec::GeoJson { geojson } => {
                let doc = FeatureCollection::from_file(geojson)?;
                let crs = match doc.epsg {
                    Some(code) => Crs::from_epsg(code)?,
                    None => input,
                };
                let polygon = doc.first_polygon()?.clone();
                RegionOfInterest::new(RegionShape::Polygon(polygon), crs, target, self.resolution)
            }
        };
        roi.validate()?;
        Ok(roi)
    }

    /// Grids to cut to the ROI polygon. Bounding-box regions are never masked.
    pub fn masking(&self) -> Result<Masking, RegionError> {
        let dem = self.mask_dem.unwrap_or(self.mask_landcover);
        if dem && !self.mask_landcover {
            return Err(RegionError::invalid("mask_dem requires mask_landcover"));
        }
        if !matches!(self.roi, RoiSpec::GeoJson { .. }) {
            return Ok(Masking::default());
        }
        Ok(Masking {
            landcover: self.mask_landcover,
            dem,
        })
    }

    pub fn dates(&self) -> Result<DateRange, MeteoError> {
        DateRange::new(self.start_date, self.end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAVOS: &str = r#"
simulation_name: davos
start_date: 2023-10-01
end_date: 2024-06-30
roi:
  center: { x: 2783500, y: 1187500 }
  size: 2000
resolution: 50
pois:
  - { name: WFJ, x: 2783700, y: 1187700, z: 2540 }
  - { name: valley, x: 2783000, y: 1187000 }
"#;

    #[test]
    fn test_defaults() {
        let r = SimulationRequest::from_yaml(DAVOS).unwrap();
        assert_eq!(r.crs, 2056);
        assert_eq!(r.landcover, LandCoverChoice::Tlm);
        assert_eq!(r.mode, Mode::Switzerland);
        assert_eq!(r.coverage, None);
        assert!(!r.skip_meteo);
        assert!(r.mask_landcover);
        assert_eq!(r.mask_dem, None);
        assert_eq!(r.masking().unwrap(), Masking::default());
        assert_eq!(r.pois[1].z, None);
        assert_eq!(r.dates().unwrap().days(), 274);

        let roi = r.region().unwrap();
        let b = roi.target_polygon().unwrap().bounds();
        assert_eq!((b.min_x, b.max_y), (2_782_500.0, 1_188_500.0));
    }

    #[test]
    fn test_landcover_variants() {
        let parse = |lc: &str| {
            let yaml = format!("{DAVOS}landcover: {lc}\n");
            SimulationRequest::from_yaml(&yaml).map(|r| r.landcover)
        };
        assert_eq!(parse("bfs").unwrap(), LandCoverChoice::Bfs);
        assert_eq!(
            parse("{ constant: 11500 }").unwrap(),
            LandCoverChoice::Constant(LusCode::new(11500).unwrap())
        );
        assert_eq!(
            parse("{ override: lus.asc }").unwrap(),
            LandCoverChoice::Override(PathBuf::from("lus.asc"))
        );
        assert!(parse("{ constant: 42 }").is_err());
        assert!(parse("corine").is_err());
    }

    #[test]
    fn test_bbox_and_display_crs() {
        let yaml = r#"
simulation_name: wgs
start_date: 2024-01-01
end_date: 2024-01-31
roi: { center: { x: 9.8228, y: 46.7947 }, size: 1000 }
display_crs: 4326
resolution: 25
"#;
        let r = SimulationRequest::from_yaml(yaml).unwrap();
        assert_eq!(r.input_crs().unwrap(), Crs::Wgs84);
        let b = r.region().unwrap().target_polygon().unwrap().bounds();
        assert!((b.width() - 1000.0).abs() < 1e-6);

        let bbox = r#"
simulation_name: box
start_date: 2024-01-01
end_date: 2024-01-31
roi: { bbox: { min_x: 2600000, min_y: 1200000, max_x: 2601000, max_y: 1200500 } }
resolution: 100
"#;
        let r = SimulationRequest::from_yaml(bbox).unwrap();
        assert!(matches!(r.roi, RoiSpec::BoundingBox { .. }));
        assert!(r.region().is_ok());
    }

    #[test]
    fn test_polygon_masking_flags() {
        let polygon = DAVOS.replace(
            "roi:\n  center: { x: 2783500, y: 1187500 }\n  size: 2000\n",
            "roi: { geojson: davos.geojson }\n",
        );
        let masking = |extra: &str| SimulationRequest::from_yaml(&format!("{polygon}{extra}")).unwrap().masking();

        assert_eq!(masking("").unwrap(), Masking { landcover: true, dem: true });
        assert_eq!(
            masking("mask_dem: false\n").unwrap(),
            Masking { landcover: true, dem: false }
        );
        assert_eq!(
            masking("mask_landcover: false\n").unwrap(),
            Masking { landcover: false, dem: false }
        );
        assert!(matches!(
            masking("mask_landcover: false\nmask_dem: true\n"),
            Err(RegionError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let zero_res = DAVOS.replace("resolution: 50", "resolution: 0");
        let r = SimulationRequest::from_yaml(&zero_res).unwrap();
        assert!(matches!(r.region(), Err(RegionError::InvalidRegion(_))));

        let geographic = format!("{DAVOS}crs: 4326\n");
        let r = SimulationRequest::from_yaml(&geographic).unwrap();
        assert!(r.region().is_err());

        let reversed = DAVOS.replace("end_date: 2024-06-30", "end_date: 2023-01-01");
        let r = SimulationRequest::from_yaml(&reversed).unwrap();
        assert!(r.dates().is_err());

        assert!(SimulationRequest::from_yaml(&format!("{DAVOS}unknown: 1\n")).is_err());
    }

    #[test]
    fn test_relative_paths_follow_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!("{DAVOS}landcover: {{ override: grids/lus.asc }}\nuser_dem_dir: /abs/dem\n");
        let path = dir.path().join("request.yaml");
        std::fs::write(&path, yaml).unwrap();

        let r = SimulationRequest::from_file(&path).unwrap();
        assert_eq!(r.landcover, LandCoverChoice::Override(dir.path().join("grids/lus.asc")));
        assert_eq!(r.user_dem_dir, Some(PathBuf::from("/abs/dem")));
    }
}
