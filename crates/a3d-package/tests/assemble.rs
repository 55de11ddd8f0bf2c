//! Package completeness, layout and publication.

use a3d_package::{layout, Artifact, PackageError, Packager};
use a3d_templates::RenderedConfig;
use std::collections::BTreeSet;
use std::io::Read;

fn config(name: &str, refs: &[&str]) -> RenderedConfig {
    RenderedConfig {
        name: name.to_string(),
        text: format!("# {name}\n"),
        references: refs.iter().map(|r| r.to_string()).collect::<BTreeSet<_>>(),
    }
}

fn artifacts() -> Vec<Artifact> {
    vec![
        Artifact::new(layout::surface_grid("dem.asc"), "ncols 2\n"),
        Artifact::new(layout::surface_grid("landuse.lus"), "ncols 2\n"),
        Artifact::new(layout::meteo("WFJ2.smet"), "SMET 1.1 ASCII\n"),
    ]
}

fn configs() -> Vec<RenderedConfig> {
    vec![config(
        "alpine3d.ini",
        &[
            "input/surface-grids/dem.asc",
            "input/surface-grids/landuse.lus",
            "input/meteo/WFJ2.smet",
        ],
    )]
}

#[test]
fn test_complete_package_is_published() {
    let out = tempfile::tempdir().unwrap();
    let packager = Packager::new(out.path());
    let package = packager.assemble("davos", artifacts(), &configs(), false).unwrap();

    assert_eq!(package.dir, out.path().join("davos"));
    assert!(package.dir.join("input/meteo/WFJ2.smet").is_file());
    assert!(package.dir.join("alpine3d.ini").is_file());
    assert!(package.archive.is_file());
    assert_eq!(package.manifest.files.len(), 4);
    assert!(package.manifest.verify(&package.dir).unwrap().is_empty());

    let manifest: a3d_package::Manifest =
        serde_json::from_slice(&std::fs::read(package.dir.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest, package.manifest);

    let mut zip = zip::ZipArchive::new(std::fs::File::open(&package.archive).unwrap()).unwrap();
    let mut text = String::new();
    zip.by_name("davos/input/surface-grids/dem.asc")
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "ncols 2\n");
    assert!(zip.by_name("davos/manifest.json").is_ok());

    // Only the published outputs remain, no staging leftovers
    let names: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
}

#[test]
fn test_missing_references_are_named() {
    let out = tempfile::tempdir().unwrap();
    let packager = Packager::new(out.path());
    let mut files = artifacts();
    files.retain(|a| !a.path.ends_with(".smet"));
    let configs = vec![
        config("alpine3d.ini", &["input/surface-grids/dem.asc", "input/meteo/WFJ2.smet"]),
        config("snowpack.ini", &["input/snowfiles/WFJ2.sno", "input/meteo/WFJ2.smet"]),
    ];

    match packager.assemble("davos", files, &configs, false) {
        Err(PackageError::IncompletePackage { missing }) => {
            assert_eq!(missing, vec!["input/meteo/WFJ2.smet", "input/snowfiles/WFJ2.sno"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!out.path().join("davos").exists());
    assert!(!out.path().join("davos.zip").exists());
}

#[test]
fn test_rejects_paths_outside_layout() {
    let out = tempfile::tempdir().unwrap();
    let mut files = artifacts();
    files.push(Artifact::new("output/HS.asc", "x"));
    let err = Packager::new(out.path())
        .assemble("davos", files, &configs(), false)
        .unwrap_err();
    assert!(matches!(err, PackageError::OutsideLayout { ref path } if path == "output/HS.asc"));
}

#[test]
fn test_rejects_duplicates_and_bad_names() {
    let out = tempfile::tempdir().unwrap();
    let packager = Packager::new(out.path());
    let mut files = artifacts();
    files.push(Artifact::new("alpine3d.ini", "shadow"));
    assert!(matches!(
        packager.assemble("davos", files, &configs(), false),
        Err(PackageError::DuplicatePath(p)) if p == "alpine3d.ini"
    ));
    assert!(matches!(
        packager.assemble("my run", artifacts(), &configs(), false),
        Err(PackageError::InvalidName { .. })
    ));
}

#[test]
fn test_existing_output_requires_overwrite() {
    let out = tempfile::tempdir().unwrap();
    let packager = Packager::new(out.path());
    packager.assemble("davos", artifacts(), &configs(), false).unwrap();
    std::fs::write(out.path().join("davos/stale.txt"), "old").unwrap();

    let err = packager.assemble("davos", artifacts(), &configs(), false).unwrap_err();
    assert!(matches!(err, PackageError::AlreadyExists { .. }));
    assert!(out.path().join("davos/stale.txt").exists());

    // Full replacement: files of the previous package do not survive
    let package = packager.assemble("davos", artifacts(), &configs(), true).unwrap();
    assert!(!package.dir.join("stale.txt").exists());
    assert!(package.dir.join("input/surface-grids/dem.asc").is_file());
}

#[test]
fn test_archive_is_reproducible() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let first = Packager::new(a.path()).assemble("davos", artifacts(), &configs(), false).unwrap();
    let second = Packager::new(b.path()).assemble("davos", artifacts(), &configs(), false).unwrap();
    assert_eq!(
        std::fs::read(first.archive).unwrap(),
        std::fs::read(second.archive).unwrap()
    );
    assert_eq!(first.manifest, second.manifest);
}
