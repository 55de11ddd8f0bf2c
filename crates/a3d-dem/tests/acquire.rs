//! Acquisition behaviour against an in-memory tile source.

use a3d_cache::{CacheOrigin, GridCache};
use a3d_dem::{
    acquire, tiling, AcquireOptions, CancellationToken, CoveragePolicy, DemError, DemTile, FetchError, RetryPolicy,
    TileId, TileSource,
};
use a3d_spatial::{Bounds, Crs, GridDefinition, Point, NO_DATA};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

const X0: f64 = 2_600_000.0;
const Y0: f64 = 1_200_000.0;
const TILE: f64 = 100.0;

/// 100 m tiles with 10 m pixels; elevation rises 1 m per metre eastwards.
struct FakeSource {
    /// Covered area; tiles outside answer 404.
    coverage: Bounds,
    fetches: AtomicUsize,
    /// Transient failures to report before succeeding.
    transient_failures: AtomicUsize,
    version: String,
}

impl FakeSource {
    fn new(coverage: Bounds) -> Self {
        Self {
            coverage,
            fetches: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
            version: "2024".to_string(),
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TileSource for FakeSource {
    fn id(&self) -> &str {
        "fake"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn crs(&self) -> Crs {
        Crs::Lv95
    }

    fn tiles_for(&self, bounds: &Bounds) -> Vec<TileId> {
        tiling(bounds, TILE)
    }

    fn fetch(&self, tile: &TileId) -> Result<DemTile, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FetchError::Transient("HTTP 503 Service Unavailable".to_string()));
        }
        if !self.coverage.contains_bounds(&tile.bounds) {
            return Err(FetchError::NotFound);
        }
        let b = tile.bounds;
        let data = (0..100)
            .map(|i| (1000.0 + (b.min_x - X0) + (i % 10) as f64 * 10.0 + 5.0) as f32)
            .collect();
        Ok(DemTile::from_parts(data, 10, 10, Point::new(b.min_x, b.max_y), (10.0, 10.0), None).unwrap())
    }
}

fn grid() -> GridDefinition {
    GridDefinition::new(Crs::Lv95, X0, Y0, 20.0, 10, 10).unwrap()
}

fn full_coverage() -> Bounds {
    Bounds::new(X0 - 1000.0, Y0 - 1000.0, X0 + 1000.0, Y0 + 1000.0)
}

fn options(policy: CoveragePolicy) -> AcquireOptions {
    AcquireOptions {
        policy,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
    }
}

#[test]
fn test_second_acquisition_does_not_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(full_coverage());
    let cancel = CancellationToken::new();

    let first = acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &cancel).unwrap();
    let fetched = source.fetches();
    assert_eq!(fetched, 4);
    assert_eq!(first.origin, CacheOrigin::Computed);
    assert_eq!(first.missing_cells, 0);

    let second = acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &cancel).unwrap();
    assert_eq!(source.fetches(), fetched);
    assert_eq!(second.origin, CacheOrigin::Hit);
    assert_eq!(first.dataset, second.dataset);

    // West edge cell centre at x + 10 m: 1000 + 10
    let (lo, hi) = second.dataset.valid_range().unwrap();
    assert!((lo - 1010.0).abs() < 1e-6);
    assert!((hi - 1190.0).abs() < 1e-6);
}

#[test]
fn test_concurrent_acquisitions_fetch_once() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(full_coverage());
    let cancel = CancellationToken::new();
    let barrier = Barrier::new(6);
    let grid = grid();
    let opts = options(CoveragePolicy::Strict);
    let (cache, source_ref, cancel, barrier, grid, opts) = (&cache, &source, &cancel, &barrier, &grid, &opts);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    acquire(grid, source_ref, cache, opts, cancel).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(source.fetches(), 4);
    for r in &results {
        assert_eq!(r.dataset, results[0].dataset);
    }
}

#[test]
fn test_partial_coverage() {
    // Only the western half of the grid is covered
    let coverage = Bounds::new(X0 - 1000.0, Y0 - 1000.0, X0 + 100.0, Y0 + 1000.0);

    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(coverage);
    let cancel = CancellationToken::new();

    let err = acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &cancel).unwrap_err();
    match err {
        DemError::Coverage { source_id, missing_cells } => {
            assert_eq!(source_id, "fake");
            assert_eq!(missing_cells, 50);
        }
        other => panic!("unexpected error: {other}"),
    }
    let fetched = source.fetches();

    // The partial mosaic was published by the strict run
    let dem = acquire(&grid(), &source, &cache, &options(CoveragePolicy::BestEffort), &cancel).unwrap();
    assert_eq!(dem.origin, CacheOrigin::Hit);
    assert_eq!(source.fetches(), fetched);
    assert_eq!(dem.missing_cells, 50);
    assert_eq!(dem.dataset.values()[9], NO_DATA);
    assert!(dem.dataset.get(0, 0).is_some());

    // Strict still refuses the cached partial grid
    assert!(matches!(
        acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &cancel),
        Err(DemError::Coverage { missing_cells: 50, .. })
    ));
}

#[test]
fn test_strict_and_best_effort_share_a_flight() {
    let coverage = Bounds::new(X0 - 1000.0, Y0 - 1000.0, X0 + 100.0, Y0 + 1000.0);
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(coverage);
    let cancel = CancellationToken::new();
    let barrier = Barrier::new(2);
    let grid = grid();
    let (cache, source_ref, cancel, barrier, grid) = (&cache, &source, &cancel, &barrier, &grid);

    let (strict, best_effort) = thread::scope(|s| {
        let run = |policy: CoveragePolicy| {
            s.spawn(move || {
                barrier.wait();
                acquire(grid, source_ref, cache, &options(policy), cancel)
            })
        };
        let strict = run(CoveragePolicy::Strict);
        let best_effort = run(CoveragePolicy::BestEffort);
        (strict.join().unwrap(), best_effort.join().unwrap())
    });

    assert!(matches!(strict, Err(DemError::Coverage { missing_cells: 50, .. })));
    let dem = best_effort.unwrap();
    assert_eq!(dem.missing_cells, 50);
    assert_eq!(source.fetches(), 4);
}

#[test]
fn test_concurrent_strict_failures_are_typed() {
    let coverage = Bounds::new(X0 + 10_000.0, Y0 + 10_000.0, X0 + 11_000.0, Y0 + 11_000.0);
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(coverage);
    let cancel = CancellationToken::new();
    let barrier = Barrier::new(2);
    let grid = grid();
    let opts = options(CoveragePolicy::Strict);
    let (cache, source_ref, cancel, barrier, grid, opts) = (&cache, &source, &cancel, &barrier, &grid, &opts);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    acquire(grid, source_ref, cache, opts, cancel)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for r in &results {
        assert!(
            matches!(r, Err(DemError::Coverage { missing_cells: 100, .. })),
            "unexpected result: {r:?}"
        );
    }
}

#[test]
fn test_fully_uncovered_region() {
    let coverage = Bounds::new(X0 + 10_000.0, Y0 + 10_000.0, X0 + 11_000.0, Y0 + 11_000.0);
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(coverage);
    let cancel = CancellationToken::new();

    assert!(matches!(
        acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &cancel),
        Err(DemError::Coverage { missing_cells: 100, .. })
    ));

    let dem = acquire(&grid(), &source, &cache, &options(CoveragePolicy::BestEffort), &cancel).unwrap();
    assert_eq!(dem.missing_cells, 100);
    assert!(dem.dataset.valid_range().is_none());
}

#[test]
fn test_transient_failures_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(full_coverage());
    source.transient_failures.store(2, Ordering::SeqCst);

    let dem = acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &CancellationToken::new()).unwrap();
    assert_eq!(dem.missing_cells, 0);
    assert_eq!(source.fetches(), 6);
}

#[test]
fn test_retry_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(full_coverage());
    source.transient_failures.store(10, Ordering::SeqCst);

    let err = acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &CancellationToken::new())
        .unwrap_err();
    match err {
        DemError::Acquisition {
            source_id,
            attempts,
            last_error,
        } => {
            assert_eq!(source_id, "fake");
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_cancelled_before_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(full_coverage());
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &cancel),
        Err(DemError::Cancelled)
    ));
    assert_eq!(source.fetches(), 0);
}

#[test]
fn test_crs_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let source = FakeSource::new(full_coverage());
    let grid = GridDefinition::new(Crs::Lv03, 600_000.0, 200_000.0, 20.0, 10, 10).unwrap();

    assert!(matches!(
        acquire(&grid, &source, &cache, &options(CoveragePolicy::Strict), &CancellationToken::new()),
        Err(DemError::CrsMismatch { .. })
    ));
}

#[test]
fn test_new_version_invalidates() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let mut source = FakeSource::new(full_coverage());
    let cancel = CancellationToken::new();

    acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &cancel).unwrap();
    source.version = "2025".to_string();
    let dem = acquire(&grid(), &source, &cache, &options(CoveragePolicy::Strict), &cancel).unwrap();

    assert_eq!(dem.origin, CacheOrigin::Computed);
    assert_eq!(source.fetches(), 8);
    assert_eq!(cache.entries().unwrap().len(), 1);
}
