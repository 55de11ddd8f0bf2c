//! User-provided GeoTIFF tiles in a local directory.

use crate::raster::DemTile;
use crate::source::{FetchError, TileId, TileSource};
use crate::{DemError, Result};
use a3d_spatial::{Bounds, Crs};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Directory of GeoTIFF tiles indexed by their georeferenced extent.
///
/// Only the tags are read when indexing; tile data is loaded on fetch. The
/// version is a digest over file names, sizes and modification times, so
/// editing the directory invalidates grids cached from it.
#[derive(Debug)]
pub struct LocalDirSource {
    id: String,
    dir: PathBuf,
    crs: Crs,
    version: String,
    /// Tile extents by file name (sorted for a deterministic order).
    tiles: BTreeMap<String, (PathBuf, Bounds)>,
}

fn is_geotiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

impl LocalDirSource {
    /// Index all `.tif`/`.tiff` files of `dir`. The files must use `crs`.
    pub fn open<P: AsRef<Path>>(dir: P, crs: Crs) -> Result<Self> {
        let dir = dir.as_ref();
        if !crs.is_projected() {
            return Err(DemError::InvalidSource(format!("tile CRS {crs} is not projected")));
        }

        let mut tiles = BTreeMap::new();
        let mut hasher = Sha256::new();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_geotiff(path))
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_name().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let bounds = match DemTile::read_bounds(&path) {
                Ok(bounds) => bounds,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable GeoTIFF");
                    continue;
                }
            };
            let meta = std::fs::metadata(&path)?;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            hasher.update(format!("{name};{};{mtime}\n", meta.len()).as_bytes());
            tiles.insert(name, (path, bounds));
        }

        if tiles.is_empty() {
            return Err(DemError::InvalidSource(format!(
                "no GeoTIFF tiles found in {}",
                dir.display()
            )));
        }
        debug!(dir = %dir.display(), tiles = tiles.len(), "Indexed local DEM directory");

        Ok(Self {
            id: "user_dem".to_string(),
            dir: dir.to_path_buf(),
            crs,
            version: hex::encode(&hasher.finalize()[..8]),
            tiles,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of indexed tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl TileSource for LocalDirSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn crs(&self) -> Crs {
        self.crs
    }

    fn tiles_for(&self, bounds: &Bounds) -> Vec<TileId> {
        self.tiles
            .iter()
            .filter(|(_, (_, b))| b.intersects(bounds))
            .map(|(name, (_, b))| TileId {
                name: name.clone(),
                bounds: *b,
            })
            .collect()
    }

    fn fetch(&self, tile: &TileId) -> std::result::Result<DemTile, FetchError> {
        let (path, _) = self.tiles.get(&tile.name).ok_or(FetchError::NotFound)?;
        DemTile::from_file(path).map_err(|e| match e {
            DemError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => FetchError::NotFound,
            other => FetchError::Fatal(format!("{}: {}", path.display(), other)),
        })
    }
}
