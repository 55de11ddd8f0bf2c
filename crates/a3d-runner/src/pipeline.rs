//! The input preparation pipeline.
//!
//! `Resolving → Acquiring → Deriving → Selecting → Rendering → Packaging`.
//! Elevation acquisition and land-cover derivation share the resolved grid
//! and run on two scoped threads that are joined before station selection,
//! which needs the elevation range.

use crate::request::{LandCoverChoice, Masking, Mode, SimulationRequest};
use crate::settings::Settings;
use crate::stage::{failed, PipelineError, Progress, Stage, StageError, StageTiming};
use a3d_cache::{CacheOrigin, GridCache};
use a3d_dem::{acquire, AcquireOptions, AcquiredDem, CancellationToken, DemError, LocalDirSource, TileSource};
use a3d_landcover::{
    derive, BfsSource, ConstantSource, LandCover, LandCoverError, LandCoverSource, LusCode, OverrideSource,
    TlmSource,
};
use a3d_meteo::{fetch_series, select, DateRange, MeteoError, MeteoSeries, SelectedStation, StationCatalogue};
use a3d_metrics::metric_defs;
use a3d_package::{layout, Artifact, Packager};
use a3d_spatial::{resolve, write_ascii_grid, Coverage, GridDataset, GridDefinition, Point, RegionError, RegionOfInterest};
use a3d_templates::{Params, RenderedConfig, TemplateEngine};
use chrono::{NaiveDateTime, NaiveTime};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use tracing::{error, info, warn};

/// Package path of the elevation grid.
pub const DEM_FILE: &str = "dem.asc";
/// Package path of the land-use grid.
pub const LANDUSE_FILE: &str = "landuse.lus";
/// Package path of the points of interest.
pub const POI_FILE: &str = "poi.pts";
/// Top-level configs rendered for every run.
pub const CONFIG_TEMPLATES: [&str; 3] = ["alpine3d.ini", "snowpack.ini", "meteoio.ini"];

/// A point of interest in the target CRS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPoi {
    pub name: String,
    pub point: Point,
    /// Elevation given in the request, if any.
    pub z: Option<f64>,
}

/// Output of the resolving stage.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub region: RegionOfInterest,
    pub grid: GridDefinition,
    pub dates: DateRange,
    pub pois: Vec<ResolvedPoi>,
    pub masking: Masking,
}

/// Validate a request and resolve its grid.
///
/// Deterministic: the same request always yields the same grid.
pub fn resolve_request(request: &SimulationRequest) -> Result<ResolvedRequest, StageError> {
    layout::validate_name(&request.simulation_name)?;
    let region = request.region()?;
    let coverage = match request.mode {
        Mode::Switzerland => Coverage::switzerland(),
        Mode::UserProvided => Coverage::Unrestricted,
    };
    let grid = resolve(&region, &coverage)?;
    let dates = request.dates()?;
    let masking = request.masking()?;

    let input = request.input_crs()?;
    let mut pois = Vec::with_capacity(request.pois.len());
    for poi in &request.pois {
        let point = input.transform(Point::new(poi.x, poi.y), grid.crs)?;
        if !region.contains(point)? {
            return Err(RegionError::invalid(format!(
                "point of interest {} ({}, {}) lies outside the region",
                poi.name, poi.x, poi.y
            ))
            .into());
        }
        pois.push(ResolvedPoi {
            name: poi.name.clone(),
            point,
            z: poi.z,
        });
    }

    Ok(ResolvedRequest {
        region,
        grid,
        dates,
        pois,
        masking,
    })
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub simulation_name: String,
    pub grid: GridDefinition,
    pub package_dir: PathBuf,
    pub archive: PathBuf,
    pub stations: Vec<String>,
    /// `hit`, `computed` or `joined`.
    pub dem_cache: &'static str,
    pub landcover_cache: &'static str,
    pub missing_cells: usize,
    pub warnings: Vec<String>,
    pub timings: Vec<StageTiming>,
}

fn origin_label(origin: CacheOrigin) -> &'static str {
    match origin {
        CacheOrigin::Hit => "hit",
        CacheOrigin::Computed => "computed",
        CacheOrigin::Joined => "joined",
    }
}

/// Services shared by every run of a process.
pub struct Pipeline<'a> {
    pub settings: &'a Settings,
    pub cache: &'a GridCache,
    pub templates: &'a TemplateEngine,
    pub packager: &'a Packager,
    /// Elevation source of the `switzerland` mode.
    pub national_dem: &'a dyn TileSource,
    pub catalogue: Option<&'a dyn StationCatalogue>,
    pub cancel: &'a CancellationToken,
}

impl Pipeline<'_> {
    /// Run one request to completion.
    pub fn run(&self, request: &SimulationRequest, overwrite: bool) -> Result<RunReport, PipelineError> {
        let result = self.execute(request, overwrite);
        match &result {
            Ok(report) => {
                metrics::counter!(metric_defs::RUNS_COMPLETED.name).increment(1);
                info!(
                    simulation = %report.simulation_name,
                    package = %report.package_dir.display(),
                    "Run complete"
                );
            }
            Err(e) => {
                metrics::counter!(metric_defs::RUNS_FAILED.name, "stage" => e.stage().as_str()).increment(1);
                error!(simulation = %request.simulation_name, stage = %e.stage(), "{e}");
            }
        }
        result
    }

    /// Run several requests, in parallel when `parallel` is set.
    ///
    /// Requests sharing a simulation name would write the same package;
    /// every request after the first with a given name fails while resolving.
    pub fn run_all(
        &self,
        requests: &[SimulationRequest],
        overwrite: bool,
        parallel: bool,
    ) -> Vec<Result<RunReport, PipelineError>> {
        let mut seen = HashMap::new();
        let duplicate: Vec<bool> = requests
            .iter()
            .map(|r| {
                let count = seen.entry(r.simulation_name.as_str()).or_insert(0usize);
                *count += 1;
                *count > 1
            })
            .collect();

        let run_one = |(request, dup): (&SimulationRequest, &bool)| {
            if *dup {
                return Err(failed(Stage::Resolving)(StageError::Conflict(format!(
                    "simulation name {} is used by another request of this batch",
                    request.simulation_name
                ))));
            }
            self.run(request, overwrite)
        };
        if parallel {
            requests.par_iter().zip(duplicate.par_iter()).map(run_one).collect()
        } else {
            requests.iter().zip(duplicate.iter()).map(run_one).collect()
        }
    }

    fn execute(&self, request: &SimulationRequest, overwrite: bool) -> Result<RunReport, PipelineError> {
        let mut progress = Progress::new(&request.simulation_name, self.cancel);
        let mut warnings = Vec::new();

        let t = progress.begin(Stage::Resolving)?;
        let resolved = resolve_request(request).map_err(failed(Stage::Resolving))?;
        let grid = resolved.grid;
        info!(
            simulation = %request.simulation_name,
            cols = grid.cols,
            rows = grid.rows,
            cell_size = grid.cell_size,
            crs = %grid.crs,
            "Grid resolved"
        );
        progress.end(Stage::Resolving, t.elapsed());

        // Both stages are entered before either runs; each is timed on its thread
        progress.begin(Stage::Acquiring)?;
        progress.begin(Stage::Deriving)?;
        let ((dem, dem_elapsed), (landcover, landcover_elapsed)) = thread::scope(|s| {
            let dem = s.spawn(|| {
                let started = Instant::now();
                (self.acquire_dem(request, &grid), started.elapsed())
            });
            let landcover = s.spawn(|| {
                let started = Instant::now();
                (self.derive_landcover(request, &grid), started.elapsed())
            });
            (
                dem.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
                landcover.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
            )
        });
        let mut dem = dem.map_err(failed(Stage::Acquiring))?;
        progress.end(Stage::Acquiring, dem_elapsed);
        let mut landcover = landcover.map_err(failed(Stage::Deriving))?;
        progress.end(Stage::Deriving, landcover_elapsed);
        dem.dataset
            .ensure_aligned(&landcover.dataset)
            .map_err(failed(Stage::Deriving))?;
        if dem.missing_cells > 0 {
            warnings.push(format!(
                "{} of {} cells have no elevation data",
                dem.missing_cells,
                grid.len()
            ));
        }
        // Points of interest near the outline still take their height from the full grid
        let mut unmasked = None;
        if resolved.masking.landcover {
            let outline = resolved.region.target_polygon().map_err(failed(Stage::Deriving))?;
            let outside = landcover.dataset.mask_outside(&outline);
            let present = landcover.dataset.distinct_values();
            landcover
                .parameters
                .retain(|code, _| present.contains(&f64::from(code.value())));
            if resolved.masking.dem {
                unmasked = Some(dem.dataset.clone());
                dem.dataset.mask_outside(&outline);
            }
            info!(
                simulation = %request.simulation_name,
                outside,
                dem = resolved.masking.dem,
                "Grids masked to the region polygon"
            );
        }

        let t = progress.begin(Stage::Selecting)?;
        let (stations, series) = if request.skip_meteo {
            warn!(simulation = %request.simulation_name, "Station selection skipped");
            warnings.push(format!(
                "meteo skipped: add SMET files to {}/ and list them in the configs",
                layout::METEO_DIR
            ));
            (Vec::new(), Vec::new())
        } else {
            self.select_stations(&grid, &dem, &resolved.dates)
                .map_err(failed(Stage::Selecting))?
        };
        progress.end(Stage::Selecting, t.elapsed());

        let t = progress.begin(Stage::Rendering)?;
        let (configs, mut artifacts) = self
            .render(
                request,
                &resolved,
                unmasked.as_ref().unwrap_or(&dem.dataset),
                &landcover,
                &stations,
                &series,
            )
            .map_err(failed(Stage::Rendering))?;
        progress.end(Stage::Rendering, t.elapsed());

        let t = progress.begin(Stage::Packaging)?;
        artifacts.push(Artifact::new(layout::surface_grid(DEM_FILE), write_ascii_grid(&dem.dataset)));
        artifacts.push(Artifact::new(
            layout::surface_grid(LANDUSE_FILE),
            write_ascii_grid(&landcover.dataset),
        ));
        for s in &series {
            artifacts.push(Artifact::new(layout::meteo(&s.file_name()), s.text.clone()));
        }
        let package = self
            .packager
            .assemble(&request.simulation_name, artifacts, &configs, overwrite)
            .map_err(failed(Stage::Packaging))?;
        progress.end(Stage::Packaging, t.elapsed());

        Ok(RunReport {
            simulation_name: request.simulation_name.clone(),
            grid,
            package_dir: package.dir,
            archive: package.archive,
            stations: stations.iter().map(|s| s.station.id.clone()).collect(),
            dem_cache: origin_label(dem.origin),
            landcover_cache: origin_label(landcover.origin),
            missing_cells: dem.missing_cells,
            warnings,
            timings: progress.into_timings(),
        })
    }

    fn acquire_dem(&self, request: &SimulationRequest, grid: &GridDefinition) -> Result<AcquiredDem, DemError> {
        let options = AcquireOptions {
            policy: request.coverage.unwrap_or(self.settings.dem.coverage),
            retry: self.settings.dem.retry,
        };
        match request.mode {
            Mode::Switzerland => acquire(grid, self.national_dem, self.cache, &options, self.cancel),
            Mode::UserProvided => {
                let dir = request.user_dem_dir.as_ref().ok_or_else(|| {
                    DemError::InvalidSource("user_provided mode requires user_dem_dir".to_string())
                })?;
                let source = LocalDirSource::open(dir, grid.crs)?;
                acquire(grid, &source, self.cache, &options, self.cancel)
            }
        }
    }

    fn derive_landcover(&self, request: &SimulationRequest, grid: &GridDefinition) -> Result<LandCover, LandCoverError> {
        let lc = &self.settings.landcover;
        let not_configured = |name: &str, key: &str| LandCoverError::InvalidSource {
            location: name.to_string(),
            reason: format!("no location configured (landcover.{key})"),
        };
        let source: Box<dyn LandCoverSource> = match &request.landcover {
            LandCoverChoice::Tlm => {
                let location = lc.tlm.as_deref().ok_or_else(|| not_configured("swissTLM3D", "tlm"))?;
                Box::new(TlmSource::load(location, &lc.tlm_attribute, lc.background)?)
            }
            LandCoverChoice::Bfs => {
                let location = lc.bfs.as_deref().ok_or_else(|| not_configured("BFS Arealstatistik", "bfs"))?;
                Box::new(BfsSource::load(location, lc.background)?)
            }
            LandCoverChoice::Constant(code) => Box::new(ConstantSource::new(*code)),
            LandCoverChoice::Override(path) => Box::new(OverrideSource::load(&path.to_string_lossy())?),
        };
        derive(grid, source.as_ref(), self.cache)
    }

    fn select_stations(
        &self,
        grid: &GridDefinition,
        dem: &AcquiredDem,
        dates: &DateRange,
    ) -> Result<(Vec<SelectedStation>, Vec<MeteoSeries>), MeteoError> {
        let catalogue = self.catalogue.ok_or_else(|| MeteoError::InsufficientStations {
            considered: 0,
            reason: "no station catalogue configured (meteo.catalogue)".to_string(),
        })?;
        let stations = select(
            &grid.bounds(),
            grid.crs,
            dem.dataset.valid_range(),
            dates,
            catalogue,
            &self.settings.meteo.rules,
        )?;
        let series = fetch_series(catalogue, &stations)?;
        Ok((stations, series))
    }

    /// Render the top-level configs, the POI file and one snow profile per station.
    fn render(
        &self,
        request: &SimulationRequest,
        resolved: &ResolvedRequest,
        elevation: &GridDataset,
        landcover: &LandCover,
        stations: &[SelectedStation],
        series: &[MeteoSeries],
    ) -> Result<(Vec<RenderedConfig>, Vec<Artifact>), StageError> {
        let grid = &resolved.grid;
        let (coordsys, coordparam) = grid.crs.meteoio_coordsys();
        let start = NaiveDateTime::new(resolved.dates.start(), NaiveTime::MIN);
        // Runs cover the end date completely
        let end_date = resolved.dates.end().succ_opt().unwrap_or(resolved.dates.end());
        let end = NaiveDateTime::new(end_date, NaiveTime::MIN);

        let mut points = Vec::with_capacity(resolved.pois.len());
        for poi in &resolved.pois {
            let z = poi
                .z
                .or_else(|| elevation.sample_bilinear(poi.point))
                .or_else(|| elevation.sample_nearest(poi.point))
                .ok_or_else(|| RegionError::invalid(format!("no elevation for point of interest {}", poi.name)))?;
            points.push(format!("{:.1} {:.1} {:.1}", poi.point.x, poi.point.y, z));
        }

        let meteo_files: Vec<String> = series.iter().map(|s| layout::meteo(&s.file_name())).collect();
        let snow_files: Vec<String> = stations
            .iter()
            .map(|s| layout::snowfile(&format!("{}.sno", s.station.id)))
            .collect();
        let meteo_stations = series
            .iter()
            .enumerate()
            .map(|(i, s)| format!("STATION{} = {}", i + 1, s.file_name()))
            .collect::<Vec<_>>()
            .join("\n");
        let land_use_summary = landcover
            .parameters
            .iter()
            .map(|(code, p)| {
                format!(
                    "# {} {}: albedo {}, z0 {} m",
                    code.value(),
                    code.name(),
                    p.albedo,
                    p.roughness_length
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let canopy = landcover.parameters.values().any(|p| p.canopy);

        let mut params = Params::new();
        params
            .str("simulation_name", request.simulation_name.as_str())
            .int("cols", grid.cols as i64)
            .int("rows", grid.rows as i64)
            .float("cell_size", grid.cell_size)
            .str("coordsys", coordsys)
            .str("coordparam", coordparam)
            .datetime("start", start)
            .datetime("end", end)
            .path("dem_file", layout::surface_grid(DEM_FILE))
            .path("landuse_file", layout::surface_grid(LANDUSE_FILE))
            .path("poi_file", layout::surface_grid(POI_FILE))
            .paths("meteo_files", meteo_files)
            .paths("snow_files", snow_files)
            .block("meteo_stations", meteo_stations)
            .block("land_use_summary", land_use_summary)
            .bool("canopy", canopy)
            .block("points", points.join("\n"));

        let configs = CONFIG_TEMPLATES
            .iter()
            .map(|name| self.templates.render(name, &params))
            .collect::<Result<Vec<_>, _>>()?;

        let mut artifacts = Vec::with_capacity(stations.len() + 1);
        let poi = self.templates.render(POI_FILE, &params)?;
        artifacts.push(Artifact::new(layout::surface_grid(POI_FILE), poi.text));

        for selected in stations {
            let station = &selected.station;
            // Soil parameters of the land-use class under the station, if it lies in the grid
            let code = station
                .project(grid.crs)
                .ok()
                .and_then(|p| landcover.dataset.sample_nearest(p))
                .and_then(|v| LusCode::from_cell(v).ok())
                .unwrap_or(self.settings.landcover.background);
            let surface = code.parameters();
            let mut sno = Params::new();
            sno.str("station_id", station.id.as_str())
                .str("station_name", station.name.as_str())
                .float("latitude", station.latitude)
                .float("longitude", station.longitude)
                .float("altitude", station.elevation)
                .datetime("profile_date", start)
                .float("soil_albedo", surface.albedo)
                .float("bare_soil_z0", surface.roughness_length);
            let profile = self.templates.render("station.sno", &sno)?;
            artifacts.push(Artifact::new(
                layout::snowfile(&format!("{}.sno", station.id)),
                profile.text,
            ));
        }
        Ok((configs, artifacts))
    }
}
