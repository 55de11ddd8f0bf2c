//! Package manifest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// One file listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub sha256: String,
    pub size: u64,
}

/// Checksums of every file in a package, keyed by relative path.
///
/// Contains no timestamps: identical inputs give an identical manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub simulation_name: String,
    pub files: BTreeMap<String, ManifestFile>,
}

impl Manifest {
    pub(crate) fn build<'a>(
        simulation_name: &str,
        files: impl IntoIterator<Item = (&'a String, &'a Vec<u8>)>,
    ) -> Self {
        let files = files
            .into_iter()
            .map(|(path, content)| {
                let entry = ManifestFile {
                    sha256: sha256_hex(content),
                    size: content.len() as u64,
                };
                (path.clone(), entry)
            })
            .collect();
        Self {
            version: MANIFEST_VERSION,
            simulation_name: simulation_name.to_string(),
            files,
        }
    }

    /// Paths whose content on disk no longer matches the manifest.
    pub fn verify(&self, dir: &std::path::Path) -> std::io::Result<Vec<String>> {
        let mut mismatched = Vec::new();
        for (path, expected) in &self.files {
            match std::fs::read(dir.join(path)) {
                Ok(bytes) if sha256_hex(&bytes) == expected.sha256 => {}
                Ok(_) => mismatched.push(path.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => mismatched.push(path.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok(mismatched)
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let a = ("a.ini".to_string(), b"one".to_vec());
        let b = ("b.ini".to_string(), b"two".to_vec());
        let manifest = Manifest::build("sim", [(&a.0, &a.1), (&b.0, &b.1)]);
        std::fs::write(dir.path().join("a.ini"), b"one").unwrap();
        std::fs::write(dir.path().join("b.ini"), b"changed").unwrap();

        assert_eq!(manifest.verify(dir.path()).unwrap(), vec!["b.ini".to_string()]);
        assert_eq!(manifest.files["a.ini"].size, 3);
    }
}
