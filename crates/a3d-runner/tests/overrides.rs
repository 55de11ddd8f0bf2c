//! Environment overrides of the settings file.

use a3d_runner::{Overrides, Settings};
use clap::Parser;
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
}

const VARS: [&str; 6] = [
    "A3D_CACHE_DIR",
    "A3D_OUTPUT_DIR",
    "A3D_TEMPLATE_DIR",
    "ALPINE3D_BIN",
    "SNOWPACK_BIN",
    "METEOIO_BIN",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a3dshell.yaml");
    std::fs::write(&path, "paths:\n  cache_dir: /srv/a3d/cache\n  output_dir: /srv/a3d/out\n").unwrap();

    env::set_var("A3D_OUTPUT_DIR", "/scratch/packages");
    env::set_var("ALPINE3D_BIN", "/opt/alpine3d/bin/alpine3d");
    let cli = Cli::parse_from(["a3dshell"]);
    clear_env();

    let mut settings = Settings::load(Some(&path)).unwrap();
    settings.apply(&cli.overrides);
    assert_eq!(settings.paths.cache_dir, PathBuf::from("/srv/a3d/cache"));
    assert_eq!(settings.paths.output_dir, PathBuf::from("/scratch/packages"));
    assert_eq!(settings.model.alpine3d_bin, Some(PathBuf::from("/opt/alpine3d/bin/alpine3d")));
    assert!(settings.validate().is_ok());
}

#[test]
#[serial]
fn test_flag_beats_environment() {
    clear_env();
    env::set_var("A3D_CACHE_DIR", "/from/env");
    let cli = Cli::parse_from(["a3dshell", "--cache-dir", "/from/flag"]);
    clear_env();

    assert_eq!(cli.overrides.cache_dir, Some(PathBuf::from("/from/flag")));
    assert_eq!(cli.overrides.output_dir, None);
}

#[test]
#[serial]
fn test_no_environment_keeps_defaults() {
    clear_env();
    let cli = Cli::parse_from(["a3dshell"]);
    assert_eq!(cli.overrides, Overrides::default());

    let mut settings = Settings::default();
    settings.apply(&cli.overrides);
    assert_eq!(settings, Settings::default());
}

#[test]
#[serial]
fn test_missing_settings_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Settings::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
    assert!(err.to_string().contains("absent.yaml"));
}
