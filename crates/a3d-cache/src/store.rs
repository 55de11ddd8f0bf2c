//! The grid cache service.
//!
//! ## Layout
//!
//! ```text
//! <root>/<source>/<scope>/<digest>/grid.asc
//! <root>/<source>/<scope>/<digest>/entry.json
//! ```
//!
//! `scope` identifies source + grid, `digest` additionally the source version.
//! Publishing a new version removes the other digests under the same scope.
//!
//! ## Thread Safety
//!
//! `GridCache` is shared by reference between the stages of a run and between
//! concurrent runs:
//! - Lookups of published entries never block
//! - Concurrent [`GridCache::get_or_compute`] calls for one key run the
//!   computation once; the others wait and read the published entry
//! - Files are written to a temporary name and renamed into place

use crate::entry::{CacheEntry, ENTRY_FILE, GRID_FILE};
use crate::flight::{FlightTable, Outcome, Role};
use crate::key::{checksum, CacheKey};
use crate::{CacheError, Result};
use a3d_metrics::metric_defs;
use a3d_spatial::{parse_ascii_grid, write_ascii_grid, GridDataset};
use chrono::Utc;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How a [`Cached`] value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    /// Read from a published entry.
    Hit,
    /// Computed by this caller and published.
    Computed,
    /// Computed by a concurrent caller and read after it published.
    Joined,
}

/// A dataset returned by the cache, with its provenance.
#[derive(Debug, Clone)]
pub struct Cached {
    pub dataset: GridDataset,
    pub origin: CacheOrigin,
}

/// Content-addressed store of derived grids.
pub struct GridCache {
    root: PathBuf,
    flights: FlightTable,
}

impl std::fmt::Debug for GridCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridCache").field("root", &self.root).finish()
    }
}

impl GridCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            flights: FlightTable::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scope_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.source_dir_name()).join(key.scope())
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.scope_dir(key).join(key.digest())
    }

    /// Look up a published entry.
    ///
    /// An entry whose grid does not match its recorded checksum, or that cannot
    /// be decoded, is deleted and reported as a miss.
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<GridDataset>> {
        let dir = self.entry_dir(key);
        if !dir.join(ENTRY_FILE).exists() {
            return Ok(None);
        }

        match read_verified(&dir) {
            Ok(dataset) => {
                debug!(key = %key, "Grid cache hit");
                metrics::counter!(metric_defs::CACHE_HITS.name, "source" => key.source_id().to_string()).increment(1);
                Ok(Some(dataset))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding corrupt cache entry");
                match fs::remove_dir_all(&dir) {
                    // Another reader discarded it first
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    other => other?,
                }
                metrics::counter!(
                    metric_defs::CACHE_EVICTIONS.name,
                    "source" => key.source_id().to_string(),
                    "reason" => "checksum"
                )
                .increment(1);
                Ok(None)
            }
        }
    }

    /// Publish `dataset` under `key` and return the dataset decoded from the
    /// published bytes.
    ///
    /// Other versions of the same source and grid are pruned.
    pub fn publish(&self, key: &CacheKey, dataset: &GridDataset) -> Result<GridDataset> {
        let dir = self.entry_dir(key);
        fs::create_dir_all(&dir)?;

        // A previous sidecar would vouch for the file being replaced
        let sidecar = dir.join(ENTRY_FILE);
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }

        let text = write_ascii_grid(dataset);
        let sum = checksum(text.as_bytes());
        write_atomic(&dir, GRID_FILE, text.as_bytes())?;

        let written = fs::read(dir.join(GRID_FILE))?;
        if checksum(&written) != sum {
            return Err(CacheError::Verification {
                key: key.digest().to_string(),
            });
        }

        let entry = CacheEntry {
            key: key.digest().to_string(),
            source_id: key.source_id().to_string(),
            version: key.version().to_string(),
            grid: *dataset.definition(),
            kind: dataset.kind(),
            created_at: Utc::now(),
            checksum: sum,
            size_bytes: written.len() as u64,
            dir: dir.clone(),
        };
        write_atomic(&dir, ENTRY_FILE, serde_json::to_string_pretty(&entry)?.as_bytes())?;
        info!(key = %key, bytes = entry.size_bytes, "Published grid to cache");

        self.prune_stale(key)?;

        let text = String::from_utf8_lossy(&written);
        Ok(parse_ascii_grid(&text, entry.grid.crs, entry.kind)?)
    }

    fn prune_stale(&self, key: &CacheKey) -> Result<()> {
        for item in fs::read_dir(self.scope_dir(key))? {
            let item = item?;
            if item.file_name().to_string_lossy() == key.digest() || !item.file_type()?.is_dir() {
                continue;
            }
            info!(key = %key, stale = %item.file_name().to_string_lossy(), "Pruning stale cache version");
            fs::remove_dir_all(item.path())?;
            metrics::counter!(
                metric_defs::CACHE_EVICTIONS.name,
                "source" => key.source_id().to_string(),
                "reason" => "stale_version"
            )
            .increment(1);
        }
        Ok(())
    }

    /// Return the cached dataset for `key`, computing and publishing it on a
    /// miss.
    ///
    /// Concurrent callers for the same key run `compute` once: the first
    /// becomes the leader, the others wait and read the published entry. If
    /// the leader fails nothing is published; each waiter then takes the lead
    /// in turn and runs its own `compute`, so every caller gets a typed error.
    pub fn get_or_compute<F, E>(&self, key: &CacheKey, compute: F) -> std::result::Result<Cached, E>
    where
        F: FnOnce() -> std::result::Result<GridDataset, E>,
        E: From<CacheError> + std::fmt::Display,
    {
        if let Some(dataset) = self.lookup(key)? {
            return Ok(Cached {
                dataset,
                origin: CacheOrigin::Hit,
            });
        }

        loop {
            match self.flights.begin(key.digest()) {
                Role::Leader(guard) => {
                    let result = self.lead(key, compute);
                    match &result {
                        Ok(_) => guard.complete(),
                        Err(e) => guard.fail(e.to_string()),
                    }
                    return result;
                }
                Role::Waiter(Outcome::Complete) => {
                    metrics::counter!(metric_defs::CACHE_JOINED.name, "source" => key.source_id().to_string())
                        .increment(1);
                    if let Some(dataset) = self.lookup(key)? {
                        return Ok(Cached {
                            dataset,
                            origin: CacheOrigin::Joined,
                        });
                    }
                    // Entry vanished (cleared concurrently); start over
                    debug!(key = %key, "Joined entry missing, retrying");
                }
                Role::Waiter(Outcome::Failed(reason)) => {
                    debug!(key = %key, reason = %reason, "Concurrent computation failed, retrying as leader");
                }
            }
        }
    }

    fn lead<F, E>(&self, key: &CacheKey, compute: F) -> std::result::Result<Cached, E>
    where
        F: FnOnce() -> std::result::Result<GridDataset, E>,
        E: From<CacheError>,
    {
        // Published between our first lookup and taking the lead
        if let Some(dataset) = self.lookup(key)? {
            return Ok(Cached {
                dataset,
                origin: CacheOrigin::Hit,
            });
        }

        debug!(key = %key, "Grid cache miss, computing");
        metrics::counter!(metric_defs::CACHE_MISSES.name, "source" => key.source_id().to_string()).increment(1);
        let dataset = compute()?;
        let dataset = self.publish(key, &dataset)?;
        Ok(Cached {
            dataset,
            origin: CacheOrigin::Computed,
        })
    }

    /// All complete entries, sorted by source then creation time.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut out = Vec::new();
        for source in subdirs(&self.root)? {
            for scope in subdirs(&source)? {
                for dir in subdirs(&scope)? {
                    if dir.join(ENTRY_FILE).exists() {
                        match CacheEntry::read(&dir) {
                            Ok(entry) => out.push(entry),
                            Err(e) => warn!(dir = %dir.display(), error = %e, "Unreadable cache entry"),
                        }
                    }
                }
            }
        }
        out.sort_by(|a, b| a.source_id.cmp(&b.source_id).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    /// Remove all entries, or only those of `source_id`. Returns the number of
    /// entries removed.
    pub fn clear(&self, source_id: Option<&str>) -> Result<usize> {
        let entries = self.entries()?;
        let mut removed = 0;
        for entry in entries.iter().filter(|e| source_id.map_or(true, |s| e.source_id == s)) {
            fs::remove_dir_all(&entry.dir)?;
            metrics::counter!(
                metric_defs::CACHE_EVICTIONS.name,
                "source" => entry.source_id.clone(),
                "reason" => "clear"
            )
            .increment(1);
            removed += 1;
        }
        info!(removed, source = source_id.unwrap_or("*"), "Cleared grid cache");
        Ok(removed)
    }
}

fn read_verified(dir: &Path) -> Result<GridDataset> {
    let entry = CacheEntry::read(dir)?;
    let bytes = fs::read(entry.grid_path())?;
    if checksum(&bytes) != entry.checksum {
        return Err(CacheError::Verification { key: entry.key });
    }
    let text = String::from_utf8_lossy(&bytes);
    let dataset = parse_ascii_grid(&text, entry.grid.crs, entry.kind)?;
    if *dataset.definition() != entry.grid {
        return Err(CacheError::Verification { key: entry.key });
    }
    Ok(dataset)
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        if item.file_type()?.is_dir() {
            out.push(item.path());
        }
    }
    out.sort();
    Ok(out)
}
