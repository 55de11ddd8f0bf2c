//! Concurrency properties of the grid cache.

use a3d_cache::{CacheError, CacheKey, CacheOrigin, GridCache};
use a3d_spatial::{Crs, GridDataset, GridDefinition, ValueKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

fn grid() -> GridDefinition {
    GridDefinition::new(Crs::Lv95, 2_780_000.0, 1_185_000.0, 25.0, 20, 20).unwrap()
}

fn slow_dem(calls: &AtomicUsize) -> Result<GridDataset, CacheError> {
    calls.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    let values = (0..400).map(|i| 1800.0 + (i % 20) as f64 * 2.5).collect();
    Ok(GridDataset::new(grid(), ValueKind::Continuous, values)?)
}

#[test]
fn test_concurrent_requests_compute_once() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let key = CacheKey::new("swissalti3d", "2024", &grid());
    let calls = AtomicUsize::new(0);
    let barrier = Barrier::new(8);
    let (cache, key, calls_ref, barrier) = (&cache, &key, &calls, &barrier);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    cache.get_or_compute(key, || slow_dem(calls_ref)).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let computed = results.iter().filter(|r| r.origin == CacheOrigin::Computed).count();
    assert_eq!(computed, 1);
    for r in &results {
        assert_eq!(r.dataset, results[0].dataset);
    }
}

#[test]
fn test_second_acquisition_is_a_hit() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let key = CacheKey::new("swissalti3d", "2024", &grid());
    let calls = AtomicUsize::new(0);

    let first = cache.get_or_compute(&key, || slow_dem(&calls)).unwrap();
    let second = cache.get_or_compute(&key, || slow_dem(&calls)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.origin, CacheOrigin::Computed);
    assert_eq!(second.origin, CacheOrigin::Hit);
    assert_eq!(
        a3d_spatial::write_ascii_grid(&first.dataset),
        a3d_spatial::write_ascii_grid(&second.dataset)
    );

    // A fresh service over the same directory sees the entry too
    let reopened = GridCache::open(dir.path()).unwrap();
    let third = reopened.get_or_compute(&key, || slow_dem(&calls)).unwrap();
    assert_eq!(third.origin, CacheOrigin::Hit);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_waiters_see_typed_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let key = CacheKey::new("swissalti3d", "2024", &grid());
    let calls = AtomicUsize::new(0);
    let barrier = Barrier::new(4);
    let (cache_ref, key_ref, calls_ref, barrier) = (&cache, &key, &calls, &barrier);

    let errors: Vec<CacheError> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    cache_ref
                        .get_or_compute::<_, CacheError>(key_ref, || {
                            calls_ref.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(100));
                            Err(CacheError::Io(std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "tile server timed out",
                            )))
                        })
                        .unwrap_err()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for e in &errors {
        assert!(
            matches!(e, CacheError::Io(io) if io.kind() == std::io::ErrorKind::TimedOut),
            "unexpected error: {e}"
        );
    }
    // Each caller ran its own computation, one at a time
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // Nothing was published, so a later caller may retry
    assert!(cache.lookup(&key).unwrap().is_none());
}

#[test]
fn test_concurrent_readers_discard_corrupt_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GridCache::open(dir.path()).unwrap();
    let key = CacheKey::new("swissalti3d", "2024", &grid());
    let calls = AtomicUsize::new(0);
    let published = cache.get_or_compute(&key, || slow_dem(&calls)).unwrap();
    let entries = cache.entries().unwrap();
    let grid_file = entries[0].grid_path();
    let text = std::fs::read_to_string(&grid_file).unwrap();
    std::fs::write(&grid_file, text.replacen("1800.000", "1234.000", 1)).unwrap();
    assert_eq!(published.origin, CacheOrigin::Computed);

    let barrier = Barrier::new(8);
    let (cache_ref, key_ref, barrier) = (&cache, &key, &barrier);
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    cache_ref.lookup(key_ref).map(|hit| hit.is_none())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for r in results {
        assert!(r.unwrap(), "corrupt entry must read as a miss");
    }
    assert!(cache.entries().unwrap().is_empty());
}
