//! Station catalogues.

use crate::station::Station;
use crate::{MeteoError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of station metadata and SMET series.
pub trait StationCatalogue: Send + Sync {
    /// All stations of the catalogue.
    fn stations(&self) -> Result<Vec<Station>>;

    /// SMET text of a station.
    fn series(&self, station_id: &str) -> Result<String>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogueFile {
    Wrapped { stations: Vec<Station> },
    List(Vec<Station>),
}

/// JSON station list plus a directory of `<id>.smet` files.
///
/// The JSON is either an array of stations or `{"stations": [...]}`.
#[derive(Debug)]
pub struct JsonCatalogue {
    path: PathBuf,
    smet_dir: PathBuf,
    stations: Vec<Station>,
}

impl JsonCatalogue {
    /// Load the station list. `smet_dir` defaults to the JSON file's directory.
    pub fn open<P: AsRef<Path>>(path: P, smet_dir: Option<PathBuf>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| MeteoError::Catalogue {
            location: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let stations = match serde_json::from_str(&text)? {
            CatalogueFile::Wrapped { stations } | CatalogueFile::List(stations) => stations,
        };
        let smet_dir = smet_dir
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(catalogue = %path.display(), stations = stations.len(), "Loaded station catalogue");

        Ok(Self {
            path: path.to_path_buf(),
            smet_dir,
            stations,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StationCatalogue for JsonCatalogue {
    fn stations(&self) -> Result<Vec<Station>> {
        Ok(self.stations.clone())
    }

    fn series(&self, station_id: &str) -> Result<String> {
        let path = self.smet_dir.join(format!("{station_id}.smet"));
        std::fs::read_to_string(&path).map_err(|e| MeteoError::Smet {
            station_id: station_id.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

/// Catalogue held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalogue {
    stations: Vec<Station>,
    series: HashMap<String, String>,
}

impl InMemoryCatalogue {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations,
            series: HashMap::new(),
        }
    }

    /// Attach the SMET text of a station.
    pub fn with_series(mut self, station_id: impl Into<String>, smet: impl Into<String>) -> Self {
        self.series.insert(station_id.into(), smet.into());
        self
    }
}

impl StationCatalogue for InMemoryCatalogue {
    fn stations(&self) -> Result<Vec<Station>> {
        Ok(self.stations.clone())
    }

    fn series(&self, station_id: &str) -> Result<String> {
        self.series.get(station_id).cloned().ok_or_else(|| MeteoError::Smet {
            station_id: station_id.to_string(),
            reason: "no series in catalogue".to_string(),
        })
    }
}
