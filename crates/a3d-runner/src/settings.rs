//! Operator settings (`a3dshell.yaml`) and environment overrides.

use a3d_dem::{CoveragePolicy, RetryPolicy, DEFAULT_TILE_SIZE_M, SWISSALTI3D_URL_TEMPLATE, SWISSALTI3D_VERSION};
use a3d_landcover::{LusCode, DEFAULT_BACKGROUND, TLM_CATEGORY_ATTRIBUTE};
use a3d_meteo::SelectionRules;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "a3dshell.yaml";

/// Errors loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Cannot read settings {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// All operator settings. Every section and field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub paths: PathSettings,
    pub dem: DemSettings,
    pub landcover: LandCoverSettings,
    pub meteo: MeteoSettings,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Template override directory, consulted before the built-ins.
    pub template_dir: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("output"),
            template_dir: None,
        }
    }
}

/// National elevation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemSettings {
    /// URL template with `{x}` and `{y}` tile coordinates in km.
    pub url_template: String,
    /// Dataset version, part of every cache key.
    pub version: String,
    pub tile_size_m: f64,
    pub retry: RetryPolicy,
    /// HTTP request timeout in seconds.
    pub timeout_s: u64,
    /// Default coverage policy when a request does not name one.
    pub coverage: CoveragePolicy,
}

impl Default for DemSettings {
    fn default() -> Self {
        Self {
            url_template: SWISSALTI3D_URL_TEMPLATE.to_string(),
            version: SWISSALTI3D_VERSION.to_string(),
            tile_size_m: DEFAULT_TILE_SIZE_M,
            retry: RetryPolicy::default(),
            timeout_s: 60,
            coverage: CoveragePolicy::default(),
        }
    }
}

impl DemSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

/// Land-cover source locations (file paths or HTTP URLs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LandCoverSettings {
    /// swissTLM3D land-cover polygons (GeoJSON).
    pub tlm: Option<String>,
    /// BFS Arealstatistik hectare points (CSV).
    pub bfs: Option<String>,
    /// Feature property holding the TLM category.
    pub tlm_attribute: String,
    /// Code of cells not covered by any feature or hectare.
    pub background: LusCode,
}

impl Default for LandCoverSettings {
    fn default() -> Self {
        Self {
            tlm: None,
            bfs: None,
            tlm_attribute: TLM_CATEGORY_ATTRIBUTE.to_string(),
            background: DEFAULT_BACKGROUND,
        }
    }
}

/// Station catalogue and selection rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteoSettings {
    /// JSON station catalogue.
    pub catalogue: Option<PathBuf>,
    /// Directory of `<station>.smet` files; defaults to the catalogue's directory.
    pub smet_dir: Option<PathBuf>,
    #[serde(flatten)]
    pub rules: SelectionRules,
}

/// Downstream model binaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSettings {
    pub alpine3d_bin: Option<PathBuf>,
    pub snowpack_bin: Option<PathBuf>,
    pub meteoio_bin: Option<PathBuf>,
    /// Arguments passed to Alpine3D, run inside the package directory.
    pub alpine3d_args: Vec<String>,
    /// Wall-clock limit in seconds.
    pub timeout_s: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            alpine3d_bin: None,
            snowpack_bin: None,
            meteoio_bin: None,
            alpine3d_args: vec!["--iofile=alpine3d.ini".to_string()],
            timeout_s: 6 * 3600,
        }
    }
}

impl ModelSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

/// Values that override the settings file, usually from the environment.
#[derive(Debug, Clone, Default, PartialEq, clap::Args)]
pub struct Overrides {
    /// Grid cache directory
    #[arg(long, env = "A3D_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Output directory for packages
    #[arg(long, env = "A3D_OUTPUT_DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Template override directory
    #[arg(long, env = "A3D_TEMPLATE_DIR", global = true)]
    pub template_dir: Option<PathBuf>,

    /// Alpine3D binary
    #[arg(long, env = "ALPINE3D_BIN", global = true)]
    pub alpine3d_bin: Option<PathBuf>,

    /// Snowpack binary
    #[arg(long, env = "SNOWPACK_BIN", global = true)]
    pub snowpack_bin: Option<PathBuf>,

    /// MeteoIO binary
    #[arg(long, env = "METEOIO_BIN", global = true)]
    pub meteoio_bin: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `path`, or from [`DEFAULT_SETTINGS_FILE`] when it
    /// exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !default.is_file() {
                    debug!("No settings file, using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        let settings = Self::from_yaml(&text).map_err(|source| SettingsError::Yaml {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document means all defaults
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Apply overrides; set values win over the file.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(dir) = &overrides.cache_dir {
            self.paths.cache_dir = dir.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            self.paths.output_dir = dir.clone();
        }
        if let Some(dir) = &overrides.template_dir {
            self.paths.template_dir = Some(dir.clone());
        }
        if let Some(bin) = &overrides.alpine3d_bin {
            self.model.alpine3d_bin = Some(bin.clone());
        }
        if let Some(bin) = &overrides.snowpack_bin {
            self.model.snowpack_bin = Some(bin.clone());
        }
        if let Some(bin) = &overrides.meteoio_bin {
            self.model.meteoio_bin = Some(bin.clone());
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |key, reason: String| Err(SettingsError::Invalid { key, reason });
        if !(self.dem.tile_size_m > 0.0) {
            return invalid("dem.tile_size_m", format!("must be positive, got {}", self.dem.tile_size_m));
        }
        if self.dem.retry.max_attempts == 0 {
            return invalid("dem.retry.max_attempts", "must be at least 1".to_string());
        }
        if self.dem.timeout_s == 0 {
            return invalid("dem.timeout_s", "must be positive".to_string());
        }
        if !self.dem.url_template.contains("{x}") || !self.dem.url_template.contains("{y}") {
            return invalid("dem.url_template", "must contain {x} and {y}".to_string());
        }
        let rules = &self.meteo.rules;
        if !(rules.radius_m > 0.0) {
            return invalid("meteo.radius_m", format!("must be positive, got {}", rules.radius_m));
        }
        if !(rules.elevation_tolerance_m >= 0.0) || !(rules.elevation_weight >= 0.0) {
            return invalid("meteo", "elevation tolerance and weight must not be negative".to_string());
        }
        if self.model.timeout_s == 0 {
            return invalid("model.timeout_s", "must be positive".to_string());
        }
        Ok(())
    }

    /// Directory of SMET files: explicit setting, else next to the catalogue.
    pub fn smet_dir(&self) -> Option<PathBuf> {
        self.meteo.smet_dir.clone().or_else(|| {
            self.meteo
                .catalogue
                .as_ref()
                .and_then(|c| c.parent().map(Path::to_path_buf))
        })
    }
}
