//! Package assembly: staging, archive and atomic publication.

use crate::layout::{validate_name, Section, MANIFEST_FILE};
use crate::manifest::Manifest;
use crate::{PackageError, Result};
use a3d_templates::RenderedConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::CompressionMethod;

/// A file to ship, addressed by its package path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: String,
    pub content: Vec<u8>,
}

impl Artifact {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A published package.
#[derive(Debug, Clone)]
pub struct OutputPackage {
    pub name: String,
    /// `<output>/<name>/`
    pub dir: PathBuf,
    /// `<output>/<name>.zip`
    pub archive: PathBuf,
    pub manifest: Manifest,
}

/// Writes packages below one output directory.
#[derive(Debug, Clone)]
pub struct Packager {
    output_dir: PathBuf,
}

impl Packager {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Validate and publish a package.
    ///
    /// Artifacts must lie inside the layout and every path referenced by a
    /// config must be present. Nothing is written unless both hold. The
    /// folder and archive are built in a staging directory and renamed into
    /// place; with `overwrite` an existing package is replaced as a whole.
    pub fn assemble(
        &self,
        simulation_name: &str,
        artifacts: Vec<Artifact>,
        configs: &[RenderedConfig],
        overwrite: bool,
    ) -> Result<OutputPackage> {
        validate_name(simulation_name)?;

        let mut contents: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let config_files = configs
            .iter()
            .map(|c| Artifact::new(c.name.clone(), c.text.clone().into_bytes()));
        for artifact in artifacts.into_iter().chain(config_files) {
            Section::of(&artifact.path)?;
            if contents.contains_key(&artifact.path) {
                return Err(PackageError::DuplicatePath(artifact.path));
            }
            contents.insert(artifact.path, artifact.content);
        }

        let missing: Vec<String> = configs
            .iter()
            .flat_map(|c| c.references.iter())
            .filter(|r| !contents.contains_key(*r))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !missing.is_empty() {
            return Err(PackageError::IncompletePackage { missing });
        }

        let dir = self.output_dir.join(simulation_name);
        let archive = self.output_dir.join(format!("{simulation_name}.zip"));
        if !overwrite {
            if let Some(existing) = [&dir, &archive].into_iter().find(|p| p.exists()) {
                return Err(PackageError::AlreadyExists {
                    path: existing.clone(),
                });
            }
        }

        let manifest = Manifest::build(simulation_name, &contents);
        let mut manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        manifest_bytes.push(b'\n');
        contents.insert(MANIFEST_FILE.to_string(), manifest_bytes);

        fs::create_dir_all(&self.output_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{simulation_name}.staging-"))
            .tempdir_in(&self.output_dir)?;
        let staged_dir = staging.path().join(simulation_name);
        let staged_archive = staging.path().join(format!("{simulation_name}.zip"));

        write_tree(&staged_dir, &contents)?;
        write_archive(&staged_archive, simulation_name, &contents)?;
        debug!(staging = %staging.path().display(), "Package staged");

        // Any previous package ends up in the staging directory, which is
        // removed when it goes out of scope
        swap_into_place(
            staging.path(),
            &[(staged_dir, dir.clone()), (staged_archive, archive.clone())],
        )?;

        info!(
            simulation = simulation_name,
            files = manifest.files.len(),
            dir = %dir.display(),
            "Package written"
        );

        Ok(OutputPackage {
            name: simulation_name.to_string(),
            dir,
            archive,
            manifest,
        })
    }
}

/// Rename each staged path onto its target, moving existing targets into
/// `backup_dir` first. On failure the new targets are removed and the
/// previous ones restored.
fn swap_into_place(backup_dir: &Path, moves: &[(PathBuf, PathBuf)]) -> std::io::Result<()> {
    let mut backups = Vec::new();
    let mut installed = Vec::new();
    let Err(e) = swap(backup_dir, moves, &mut backups, &mut installed) else {
        return Ok(());
    };

    for target in &installed {
        let removed = if target.is_dir() {
            fs::remove_dir_all(target)
        } else {
            fs::remove_file(target)
        };
        if let Err(re) = removed {
            warn!(path = %target.display(), error = %re, "Could not remove partially published output");
        }
    }
    for (backup, target) in backups.iter().rev() {
        if let Err(re) = fs::rename(backup, target) {
            warn!(path = %target.display(), error = %re, "Could not restore previous package");
        }
    }
    Err(e)
}

fn swap(
    backup_dir: &Path,
    moves: &[(PathBuf, PathBuf)],
    backups: &mut Vec<(PathBuf, PathBuf)>,
    installed: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for (_, target) in moves {
        if target.exists() {
            let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let backup = backup_dir.join(format!("previous-{name}"));
            fs::rename(target, &backup)?;
            backups.push((backup, target.clone()));
        }
    }
    for (staged, target) in moves {
        fs::rename(staged, target)?;
        installed.push(target.clone());
    }
    Ok(())
}

fn write_tree(root: &Path, contents: &BTreeMap<String, Vec<u8>>) -> Result<()> {
    for (path, content) in contents {
        let target = root.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
    }
    Ok(())
}

/// Entries are written in path order with a fixed timestamp so identical
/// contents give an identical archive.
fn write_archive(path: &Path, name: &str, contents: &BTreeMap<String, Vec<u8>>) -> Result<()> {
    let mut zip = zip::ZipWriter::new(File::create(path)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    for (entry, content) in contents {
        zip.start_file(format!("{name}/{entry}"), options)?;
        zip.write_all(content)?;
    }
    let file = zip.finish()?;
    file.sync_all()?;
    Ok(())
}
