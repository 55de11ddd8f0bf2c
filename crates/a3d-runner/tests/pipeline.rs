//! End-to-end runs against in-memory sources.

use a3d_cache::GridCache;
use a3d_dem::{
    tiling, CancellationToken, CoveragePolicy, DemError, DemTile, FetchError, RetryPolicy, TileId, TileSource,
};
use a3d_landcover::LusCode;
use a3d_meteo::{DateRange, InMemoryCatalogue, MeteoError, Station, StationCatalogue};
use a3d_package::{Manifest, PackageError, Packager};
use a3d_runner::{
    resolve_request, LandCoverChoice, Pipeline, PipelineError, PoiSpec, RoiSpec, RunReport, Settings,
    SimulationRequest, Stage, StageError,
};
use a3d_spatial::{parse_ascii_grid, Bounds, Crs, GridDataset, Point, RegionError, ValueKind};
use a3d_templates::{TemplateEngine, TemplateError};
use approx::assert_relative_eq;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const TILE: f64 = 1000.0;
const WEST: f64 = 2_782_000.0;

/// 1 km swissALTI3D-like tiles with 10 m pixels; elevation rises 0.25 m per metre eastwards.
struct FakeAlti {
    coverage: Bounds,
    fetches: AtomicUsize,
}

impl FakeAlti {
    fn new(coverage: Bounds) -> Self {
        Self {
            coverage,
            fetches: AtomicUsize::new(0),
        }
    }

    fn davos() -> Self {
        Self::new(Bounds::new(2_770_000.0, 1_175_000.0, 2_800_000.0, 1_200_000.0))
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TileSource for FakeAlti {
    fn id(&self) -> &str {
        "swissalti3d"
    }

    fn version(&self) -> &str {
        "2019"
    }

    fn crs(&self) -> Crs {
        Crs::Lv95
    }

    fn tiles_for(&self, bounds: &Bounds) -> Vec<TileId> {
        tiling(bounds, TILE)
    }

    fn fetch(&self, tile: &TileId) -> Result<DemTile, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.coverage.contains_bounds(&tile.bounds) {
            return Err(FetchError::NotFound);
        }
        let b = tile.bounds;
        let data = (0..100 * 100)
            .map(|i| (1500.0 + (b.min_x - WEST + (i % 100) as f64 * 10.0 + 5.0) * 0.25) as f32)
            .collect();
        Ok(DemTile::from_parts(data, 100, 100, Point::new(b.min_x, b.max_y), (10.0, 10.0), None).unwrap())
    }
}

fn station(id: &str, lat: f64, lon: f64, elevation: f64) -> Station {
    Station {
        id: id.to_string(),
        name: id.to_lowercase(),
        latitude: lat,
        longitude: lon,
        elevation,
        available: DateRange::parse("2000-01-01", "2030-12-31").unwrap(),
    }
}

fn smet(id: &str) -> String {
    format!("SMET 1.1 ASCII\n[HEADER]\nstation_id = {id}\nfields = timestamp TA\n[DATA]\n2023-10-01T00:00:00 271.3\n")
}

fn catalogue() -> InMemoryCatalogue {
    let stations = vec![
        station("WFJ2", 46.8296, 9.8092, 2536.0),
        station("DAV", 46.8130, 9.8094, 1594.0),
        station("SLF2", 46.8126, 9.8483, 1563.0),
        station("KLO", 47.4800, 8.5400, 426.0),
    ];
    let mut catalogue = InMemoryCatalogue::new(stations);
    for id in ["WFJ2", "DAV", "SLF2", "KLO"] {
        catalogue = catalogue.with_series(id, smet(id));
    }
    catalogue
}

fn request(name: &str) -> SimulationRequest {
    SimulationRequest::from_yaml(&format!(
        r#"
simulation_name: {name}
start_date: 2023-10-01
end_date: 2024-06-30
roi: {{ center: {{ x: 2783500, y: 1187500 }}, size: 2000 }}
resolution: 50
landcover: {{ constant: 10700 }}
pois:
  - {{ name: ridge, x: 2783000, y: 1187000 }}
  - {{ name: plot, x: 2784000, y: 1188000, z: 2000 }}
"#
    ))
    .unwrap()
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.dem.retry = RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    settings
}

struct Fixture {
    _dir: tempfile::TempDir,
    settings: Settings,
    cache: GridCache,
    templates: TemplateEngine,
    packager: Packager,
    cancel: CancellationToken,
}

impl Fixture {
    fn new() -> Self {
        Self::with_templates(None)
    }

    fn with_templates(override_dir: Option<&Path>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = GridCache::open(dir.path().join("cache")).unwrap();
        let packager = Packager::new(dir.path().join("output"));
        Self {
            settings: settings(),
            cache,
            templates: TemplateEngine::with_override_dir(override_dir),
            packager,
            cancel: CancellationToken::new(),
            _dir: dir,
        }
    }

    fn pipeline<'a>(&'a self, dem: &'a FakeAlti, catalogue: Option<&'a dyn StationCatalogue>) -> Pipeline<'a> {
        Pipeline {
            settings: &self.settings,
            cache: &self.cache,
            templates: &self.templates,
            packager: &self.packager,
            national_dem: dem,
            catalogue,
            cancel: &self.cancel,
        }
    }

    fn output(&self) -> &Path {
        self.packager.output_dir()
    }
}

fn read(report: &RunReport, path: &str) -> String {
    std::fs::read_to_string(report.package_dir.join(path)).unwrap()
}

#[test]
fn test_full_run_produces_package() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let catalogue = catalogue();
    let report = fx.pipeline(&dem, Some(&catalogue)).run(&request("davos"), false).unwrap();

    assert_eq!((report.grid.cols, report.grid.rows), (40, 40));
    assert_relative_eq!(report.grid.xllcorner, 2_782_500.0);
    assert_relative_eq!(report.grid.yllcorner, 1_186_500.0);
    assert_relative_eq!(report.grid.cell_size, 50.0);
    assert_eq!(report.dem_cache, "computed");
    assert_eq!(report.landcover_cache, "computed");
    assert_eq!(report.missing_cells, 0);
    assert!(report.warnings.is_empty());

    let mut stations = report.stations.clone();
    stations.sort();
    assert_eq!(stations, vec!["DAV", "SLF2", "WFJ2"]);

    let stages: Vec<Stage> = report.timings.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Resolving,
            Stage::Acquiring,
            Stage::Deriving,
            Stage::Selecting,
            Stage::Rendering,
            Stage::Packaging
        ]
    );

    assert!(report.archive.is_file());
    let manifest: Manifest = serde_json::from_str(&read(&report, "manifest.json")).unwrap();
    assert_eq!(manifest.simulation_name, "davos");
    for path in [
        "alpine3d.ini",
        "snowpack.ini",
        "meteoio.ini",
        "input/surface-grids/dem.asc",
        "input/surface-grids/landuse.lus",
        "input/surface-grids/poi.pts",
        "input/meteo/WFJ2.smet",
        "input/meteo/DAV.smet",
        "input/snowfiles/SLF2.sno",
    ] {
        assert!(manifest.files.contains_key(path), "{path} missing from manifest");
    }
    assert!(!manifest.files.contains_key("input/meteo/KLO.smet"));

    let dem_text = read(&report, "input/surface-grids/dem.asc");
    assert!(dem_text.contains("ncols"));
    assert!(dem_text.contains("40"));

    let landuse = read(&report, "input/surface-grids/landuse.lus");
    assert!(landuse.contains("10700"));

    let alpine3d = read(&report, "alpine3d.ini");
    assert!(alpine3d.contains("input/surface-grids/dem.asc"));
    assert!(alpine3d.contains("2023-10-01T00:00:00"));
    // The end date is simulated completely
    assert!(alpine3d.contains("2024-07-01T00:00:00"));

    let poi = read(&report, "input/surface-grids/poi.pts");
    assert!(poi.contains("2783000.0 1187000.0 "));
    assert!(poi.contains("2784000.0 1188000.0 2000.0"));
    // Sampled from the eastward ramp at x = 2783000
    assert!(poi.contains("2783000.0 1187000.0 1750.0"));
}

#[test]
fn test_second_run_hits_cache() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let catalogue = catalogue();
    let pipeline = fx.pipeline(&dem, Some(&catalogue));

    let first = pipeline.run(&request("davos"), false).unwrap();
    let fetched = dem.fetches();
    assert!(fetched > 0);

    let second = pipeline.run(&request("davos"), true).unwrap();
    assert_eq!(dem.fetches(), fetched);
    assert_eq!(second.dem_cache, "hit");
    assert_eq!(second.landcover_cache, "hit");
    assert_eq!(
        read(&first, "input/surface-grids/dem.asc"),
        read(&second, "input/surface-grids/dem.asc")
    );
}

#[test]
fn test_existing_package_needs_overwrite() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let catalogue = catalogue();
    let pipeline = fx.pipeline(&dem, Some(&catalogue));

    pipeline.run(&request("davos"), false).unwrap();
    let err = pipeline.run(&request("davos"), false).unwrap_err();
    assert_eq!(err.stage(), Stage::Packaging);
    assert!(matches!(
        err,
        PipelineError::Failed {
            source: StageError::Package(PackageError::AlreadyExists { .. }),
            ..
        }
    ));
}

#[test]
fn test_skip_meteo() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let mut req = request("no-meteo");
    req.skip_meteo = true;

    let report = fx.pipeline(&dem, None).run(&req, false).unwrap();
    assert!(report.stations.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("input/meteo"));
    let manifest: Manifest = serde_json::from_str(&read(&report, "manifest.json")).unwrap();
    assert!(!manifest.files.keys().any(|k| k.starts_with("input/meteo/")));
}

#[test]
fn test_no_qualifying_station() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let catalogue = InMemoryCatalogue::new(vec![station("KLO", 47.48, 8.54, 426.0)]);

    let err = fx.pipeline(&dem, Some(&catalogue)).run(&request("davos"), false).unwrap_err();
    assert_eq!(err.stage(), Stage::Selecting);
    assert!(matches!(
        err,
        PipelineError::Failed {
            source: StageError::Meteo(MeteoError::InsufficientStations { considered: 1, .. }),
            ..
        }
    ));
    assert!(!fx.output().join("davos").exists());
}

#[test]
fn test_missing_catalogue_fails_selection() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let err = fx.pipeline(&dem, None).run(&request("davos"), false).unwrap_err();
    assert_eq!(err.stage(), Stage::Selecting);
    assert!(err.to_string().contains("meteo.catalogue"));
}

#[test]
fn test_template_error_writes_nothing() {
    let templates = tempfile::tempdir().unwrap();
    std::fs::write(
        templates.path().join("meteoio.ini"),
        "[Input]\nDEMFILE = {{dem_file:path}}\nBUFFER = {{buffer_days:int}}\n",
    )
    .unwrap();
    let fx = Fixture::with_templates(Some(templates.path()));
    let dem = FakeAlti::davos();
    let catalogue = catalogue();

    let err = fx.pipeline(&dem, Some(&catalogue)).run(&request("davos"), false).unwrap_err();
    assert_eq!(err.stage(), Stage::Rendering);
    match err {
        PipelineError::Failed {
            source: StageError::Template(TemplateError::TemplateRender { template, key, .. }),
            ..
        } => {
            assert_eq!(template, "meteoio.ini");
            assert_eq!(key, "buffer_days");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.output().join("davos").exists());
    assert!(!fx.output().join("davos.zip").exists());
}

#[test]
fn test_cancelled_run() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let catalogue = catalogue();
    fx.cancel.cancel();

    let err = fx.pipeline(&dem, Some(&catalogue)).run(&request("davos"), false).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(dem.fetches(), 0);
}

#[test]
fn test_region_outside_switzerland() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let mut req = request("paris");
    req.roi = RoiSpec::Square {
        center: Point::new(2_300_000.0, 1_200_000.0),
        size: 2000.0,
    };
    req.pois.clear();

    let err = fx.pipeline(&dem, None).run(&req, false).unwrap_err();
    assert_eq!(err.stage(), Stage::Resolving);
    assert!(matches!(
        err,
        PipelineError::Failed {
            source: StageError::Region(RegionError::InvalidRegion(_)),
            ..
        }
    ));
    assert_eq!(dem.fetches(), 0);
}

#[test]
fn test_partial_elevation_coverage() {
    // Tiles east of x = 2784000 are missing
    let dem = FakeAlti::new(Bounds::new(2_770_000.0, 1_175_000.0, 2_784_000.0, 1_200_000.0));
    let catalogue = catalogue();

    let fx = Fixture::new();
    let err = fx.pipeline(&dem, Some(&catalogue)).run(&request("strict"), false).unwrap_err();
    assert_eq!(err.stage(), Stage::Acquiring);
    assert!(matches!(
        err,
        PipelineError::Failed {
            source: StageError::Dem(DemError::Coverage { .. }),
            ..
        }
    ));

    let mut req = request("best-effort");
    req.coverage = Some(CoveragePolicy::BestEffort);
    let report = fx.pipeline(&dem, Some(&catalogue)).run(&req, false).unwrap();
    assert!(report.missing_cells > 0);
    assert!(report.missing_cells < 1600);
    assert!(report.warnings.iter().any(|w| w.contains("no elevation data")));
}

#[test]
fn test_uncovered_region_has_no_elevation_range() {
    let dem = FakeAlti::new(Bounds::new(2_600_000.0, 1_200_000.0, 2_601_000.0, 1_201_000.0));
    let catalogue = catalogue();
    let fx = Fixture::new();
    let mut req = request("gap");
    req.coverage = Some(CoveragePolicy::BestEffort);

    // Every cell is no-data, so no station can be matched on elevation
    let err = fx.pipeline(&dem, Some(&catalogue)).run(&req, false).unwrap_err();
    assert_eq!(err.stage(), Stage::Selecting);
    assert!(err.to_string().contains("no valid cell"));
}

#[test]
fn test_point_outside_region() {
    let mut req = request("davos");
    req.pois.push(PoiSpec {
        name: "zurich".to_string(),
        x: 2_683_000.0,
        y: 1_248_000.0,
        z: None,
    });
    let err = resolve_request(&req).unwrap_err();
    assert!(err.to_string().contains("zurich"));
}

#[test]
fn test_resolution_is_deterministic() {
    let a = resolve_request(&request("davos")).unwrap();
    let b = resolve_request(&request("davos")).unwrap();
    assert_eq!(a.grid, b.grid);
    assert_eq!(a.dates.days(), 274);
    assert_eq!(a.pois.len(), 2);
}

#[test]
fn test_batch_runs_in_parallel() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let catalogue = catalogue();
    let mut pasture = request("pasture");
    pasture.landcover = LandCoverChoice::Constant(LusCode::PASTURE);
    let requests = vec![request("davos"), pasture, request("davos")];

    let results = fx.pipeline(&dem, Some(&catalogue)).run_all(&requests, false, true);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().simulation_name, "davos");
    assert_eq!(results[1].as_ref().unwrap().simulation_name, "pasture");
    match &results[2] {
        Err(PipelineError::Failed {
            stage: Stage::Resolving,
            source: StageError::Conflict(reason),
        }) => assert!(reason.contains("davos")),
        other => panic!("unexpected result: {other:?}"),
    }

    // Both runs share one grid, acquired once
    let dem_origins: Vec<&str> = results[..2].iter().map(|r| r.as_ref().unwrap().dem_cache).collect();
    assert!(dem_origins.contains(&"computed"));
    assert!(fx.output().join("davos.zip").is_file());
    assert!(fx.output().join("pasture.zip").is_file());
}

/// Bounding box of the davos request with its north-east half cut off along
/// a diagonal just past the cell centres of the south-west half.
fn polygon_request(dir: &Path, name: &str, extra: &str) -> SimulationRequest {
    let outline = serde_json::json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "name": "dischma" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [2782500.0, 1186500.0],
                    [2784500.0, 1186500.0],
                    [2784500.0, 1186520.0],
                    [2782520.0, 1188500.0],
                    [2782500.0, 1188500.0],
                    [2782500.0, 1186500.0]
                ]]
            }
        }]
    });
    let path = dir.join(format!("{name}.geojson"));
    std::fs::write(&path, outline.to_string()).unwrap();
    SimulationRequest::from_yaml(&format!(
        r#"
simulation_name: {name}
start_date: 2023-10-01
end_date: 2024-06-30
roi: {{ geojson: {} }}
resolution: 50
landcover: {{ constant: 10700 }}
skip_meteo: true
pois:
  - {{ name: ridge, x: 2783000, y: 1187000 }}
{extra}"#,
        path.display()
    ))
    .unwrap()
}

fn surface_grids(report: &RunReport) -> (GridDataset, GridDataset) {
    let dem = parse_ascii_grid(&read(report, "input/surface-grids/dem.asc"), Crs::Lv95, ValueKind::Continuous).unwrap();
    let landuse =
        parse_ascii_grid(&read(report, "input/surface-grids/landuse.lus"), Crs::Lv95, ValueKind::Categorical).unwrap();
    (dem, landuse)
}

#[test]
fn test_polygon_region_masks_outside_cells() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let dir = tempfile::tempdir().unwrap();
    let report = fx
        .pipeline(&dem, None)
        .run(&polygon_request(dir.path(), "dischma", ""), false)
        .unwrap();

    // Grid extent is still the bounding box
    assert_eq!((report.grid.cols, report.grid.rows), (40, 40));
    assert_relative_eq!(report.grid.xllcorner, 2_782_500.0);
    assert_eq!(report.missing_cells, 0);

    let (elevation, landuse) = surface_grids(&report);
    assert_eq!(elevation.definition(), &report.grid);
    elevation.ensure_aligned(&landuse).unwrap();
    // Cells with col > row lie north-east of the diagonal
    assert_eq!(landuse.no_data_count(), 780);
    assert_eq!(elevation.no_data_count(), 780);
    assert_eq!(landuse.get(0, 39), None);
    assert_eq!(elevation.get(0, 39), None);
    assert_eq!(landuse.get(39, 0), Some(10700.0));
    assert_eq!(landuse.get(20, 20), Some(10700.0));
    assert!(elevation.get(39, 0).is_some());

    let poi = read(&report, "input/surface-grids/poi.pts");
    assert!(poi.contains("2783000.0 1187000.0 1750.0"), "{poi}");
}

#[test]
fn test_polygon_masking_can_keep_elevation() {
    let fx = Fixture::new();
    let dem = FakeAlti::davos();
    let dir = tempfile::tempdir().unwrap();

    let report = fx
        .pipeline(&dem, None)
        .run(&polygon_request(dir.path(), "lus-only", "mask_dem: false\n"), false)
        .unwrap();
    let (elevation, landuse) = surface_grids(&report);
    assert_eq!(landuse.no_data_count(), 780);
    assert_eq!(elevation.no_data_count(), 0);

    let report = fx
        .pipeline(&dem, None)
        .run(&polygon_request(dir.path(), "unmasked", "mask_landcover: false\n"), false)
        .unwrap();
    let (elevation, landuse) = surface_grids(&report);
    assert_eq!(landuse.no_data_count(), 0);
    assert_eq!(elevation.no_data_count(), 0);

    let err = fx
        .pipeline(&dem, None)
        .run(
            &polygon_request(dir.path(), "invalid", "mask_landcover: false\nmask_dem: true\n"),
            false,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Failed {
            stage: Stage::Resolving,
            source: StageError::Region(RegionError::InvalidRegion(_)),
        }
    ));
}
