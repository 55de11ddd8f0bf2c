//! Cache entry sidecar metadata.

use a3d_spatial::{GridDefinition, ValueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the cached grid inside an entry directory.
pub const GRID_FILE: &str = "grid.asc";

/// File name of the sidecar inside an entry directory.
///
/// The sidecar is written last; an entry directory without it is incomplete
/// and treated as a miss.
pub const ENTRY_FILE: &str = "entry.json";

/// Metadata of one cached grid, stored as `entry.json` next to the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex digest of the cache key.
    pub key: String,
    pub source_id: String,
    pub version: String,
    pub grid: GridDefinition,
    pub kind: ValueKind,
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the grid file.
    pub checksum: String,
    pub size_bytes: u64,
    /// Entry directory (not serialized).
    #[serde(skip)]
    pub dir: PathBuf,
}

impl CacheEntry {
    /// Path of the cached grid file.
    pub fn grid_path(&self) -> PathBuf {
        self.dir.join(GRID_FILE)
    }

    /// Read the sidecar of the entry stored in `dir`.
    pub fn read(dir: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(dir.join(ENTRY_FILE))?;
        let mut entry: CacheEntry = serde_json::from_str(&text)?;
        entry.dir = dir.to_path_buf();
        Ok(entry)
    }
}
