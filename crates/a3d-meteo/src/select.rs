//! Station selection.

use crate::catalogue::StationCatalogue;
use crate::dates::DateRange;
use crate::smet::{validate_smet, SmetHeader};
use crate::station::Station;
use crate::{MeteoError, Result};
use a3d_metrics::metric_defs;
use a3d_spatial::{Bounds, Crs};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Selection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRules {
    /// Maximum horizontal distance from the region centroid, in metres.
    pub radius_m: f64,
    /// Allowed elevation outside the DEM range, in metres.
    pub elevation_tolerance_m: f64,
    /// Score penalty per metre of elevation outside the DEM range.
    pub elevation_weight: f64,
}

impl Default for SelectionRules {
    fn default() -> Self {
        Self {
            radius_m: 10_000.0,
            elevation_tolerance_m: 500.0,
            elevation_weight: 1.0,
        }
    }
}

/// A station that passed selection, with its ranking terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedStation {
    pub station: Station,
    /// Distance to the region centroid, metres.
    pub distance_m: f64,
    /// Elevation outside the DEM range, metres (0 when inside).
    pub elevation_excess_m: f64,
    /// `distance_m + elevation_weight * elevation_excess_m`.
    pub score: f64,
}

/// Select the stations relevant for a region.
///
/// A station qualifies when it lies within `rules.radius_m` of the centroid of
/// `extent` (in `crs`), its elevation is within the DEM range widened by the
/// tolerance, and its data covers `dates`. Results are sorted by score, ties
/// by station id. There is no count cap, so widening the radius never drops a
/// station.
pub fn select(
    extent: &Bounds,
    crs: Crs,
    elevation_range: Option<(f64, f64)>,
    dates: &DateRange,
    catalogue: &dyn StationCatalogue,
    rules: &SelectionRules,
) -> Result<Vec<SelectedStation>> {
    let stations = catalogue.stations()?;
    let considered = stations.len();
    let (min_elev, max_elev) = elevation_range.ok_or_else(|| MeteoError::InsufficientStations {
        considered,
        reason: "the elevation grid has no valid cell".to_string(),
    })?;
    let centroid = extent.center();

    let mut selected = Vec::new();
    for station in stations {
        let distance_m = station.project(crs)?.distance(&centroid);
        if distance_m >= rules.radius_m {
            continue;
        }
        let elevation_excess_m = if station.elevation < min_elev {
            min_elev - station.elevation
        } else if station.elevation > max_elev {
            station.elevation - max_elev
        } else {
            0.0
        };
        if elevation_excess_m > rules.elevation_tolerance_m {
            debug!(station = %station.id, elevation = station.elevation, "Station outside elevation band");
            continue;
        }
        if !station.available.covers(dates) {
            debug!(station = %station.id, available = %station.available, "Station does not cover the period");
            continue;
        }
        selected.push(SelectedStation {
            score: distance_m + rules.elevation_weight * elevation_excess_m,
            station,
            distance_m,
            elevation_excess_m,
        });
    }

    selected.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.station.id.cmp(&b.station.id)));
    metrics::gauge!(metric_defs::STATIONS_SELECTED.name).set(selected.len() as f64);

    if selected.is_empty() {
        return Err(MeteoError::InsufficientStations {
            considered,
            reason: format!(
                "none within {} m of the region centre, {:.0}-{:.0} m (+/- {} m) and covering {}",
                rules.radius_m, min_elev, max_elev, rules.elevation_tolerance_m, dates
            ),
        });
    }
    info!(
        stations = selected.len(),
        ids = ?selected.iter().map(|s| s.station.id.as_str()).collect::<Vec<_>>(),
        "Selected meteo stations"
    );
    Ok(selected)
}

/// A validated SMET series.
#[derive(Debug, Clone)]
pub struct MeteoSeries {
    pub station_id: String,
    pub header: SmetHeader,
    pub text: String,
}

impl MeteoSeries {
    /// File name inside the meteo directory.
    pub fn file_name(&self) -> String {
        format!("{}.smet", self.station_id)
    }
}

/// Fetch and validate the series of every selected station.
pub fn fetch_series(catalogue: &dyn StationCatalogue, stations: &[SelectedStation]) -> Result<Vec<MeteoSeries>> {
    stations
        .iter()
        .map(|s| {
            let id = &s.station.id;
            let text = catalogue.series(id)?;
            let header = validate_smet(&text, id)?;
            Ok(MeteoSeries {
                station_id: id.clone(),
                header,
                text,
            })
        })
        .collect()
}
