//! Content-addressed cache keys.

use a3d_spatial::GridDefinition;
use sha2::{Digest, Sha256};
use std::fmt;

/// Key of a cached grid: SHA-256 over source id, grid definition and
/// source version.
///
/// The `scope` digest leaves out the version, so all versions of the same
/// source and grid share one directory and stale ones can be pruned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source_id: String,
    version: String,
    scope: String,
    digest: String,
}

impl CacheKey {
    pub fn new(source_id: &str, version: &str, grid: &GridDefinition) -> Self {
        let fingerprint = grid.fingerprint();
        Self {
            source_id: source_id.to_string(),
            version: version.to_string(),
            scope: sha256_hex(&[source_id, &fingerprint]),
            digest: sha256_hex(&[source_id, &fingerprint, version]),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Hex digest identifying source and grid, independent of version.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Hex digest identifying this exact entry.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Directory name for the source, safe on every filesystem.
    pub(crate) fn source_dir_name(&self) -> String {
        sanitize(&self.source_id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.source_id, self.version, &self.digest[..12])
    }
}

/// Hex SHA-256 of newline-joined parts.
pub(crate) fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of raw bytes.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
