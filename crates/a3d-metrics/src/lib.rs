//! Metric declarations for the A3D input preparation pipeline.
//!
//! Every metric emitted by the workspace is declared here as a structured
//! [`Metric`] constant, so names are never typed twice and exporters can be
//! given descriptions and units up front.
//!
//! # Example
//!
//! ```rust
//! use a3d_metrics::{metric_defs, RunLabels};
//!
//! let labels = RunLabels::new("davos_2024").with_stage("acquiring");
//! metrics::histogram!(metric_defs::STAGE_DURATION.name, &labels.to_labels()).record(1.5);
//! metrics::counter!(metric_defs::CACHE_HITS.name, "source" => "swissalti3d").increment(1);
//! ```
//!
//! Without an installed recorder these calls are no-ops.

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use a3d_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const TILES: Metric = Metric::counter("a3d.dem.tiles_fetched")
///     .with_description("Elevation tiles fetched from a source")
///     .with_unit(Unit::Count)
///     .with_labels(&["source"]);
///
/// assert_eq!(TILES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "a3d.cache.hits").
    pub name: &'static str,
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions of the pipeline.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Grid Cache
    // ========================================================================

    /// Cache lookups served from disk with a valid checksum.
    pub const CACHE_HITS: Metric = Metric::counter("a3d.cache.hits")
        .with_description("Grid cache lookups served from disk")
        .with_unit(Unit::Count)
        .with_labels(&["source"]);

    /// Cache lookups that required computing the grid.
    pub const CACHE_MISSES: Metric = Metric::counter("a3d.cache.misses")
        .with_description("Grid cache lookups that required a computation")
        .with_unit(Unit::Count)
        .with_labels(&["source"]);

    /// Entries removed because of a checksum mismatch or a newer source version.
    ///
    /// Labels: source, reason (`checksum` | `stale_version` | `clear`)
    pub const CACHE_EVICTIONS: Metric = Metric::counter("a3d.cache.evictions")
        .with_description("Grid cache entries removed")
        .with_unit(Unit::Count)
        .with_labels(&["source", "reason"]);

    /// Callers that waited for another thread computing the same key.
    pub const CACHE_JOINED: Metric = Metric::counter("a3d.cache.joined_in_flight")
        .with_description("Lookups that joined an in-flight computation")
        .with_unit(Unit::Count)
        .with_labels(&["source"]);

    // ========================================================================
    // Elevation Acquisition
    // ========================================================================

    pub const TILES_FETCHED: Metric = Metric::counter("a3d.dem.tiles_fetched")
        .with_description("Elevation tiles fetched from a tile source")
        .with_unit(Unit::Count)
        .with_labels(&["source"]);

    /// Transient fetch failures that were retried.
    pub const FETCH_RETRIES: Metric = Metric::counter("a3d.dem.fetch_retries")
        .with_description("Tile fetch attempts retried after a transient failure")
        .with_unit(Unit::Count)
        .with_labels(&["source"]);

    pub const BYTES_DOWNLOADED: Metric = Metric::counter("a3d.dem.bytes_downloaded")
        .with_description("Bytes of tile data downloaded")
        .with_unit(Unit::Bytes)
        .with_labels(&["source"]);

    /// Cells left at no-data under the best-effort coverage policy.
    pub const UNCOVERED_CELLS: Metric = Metric::counter("a3d.dem.uncovered_cells")
        .with_description("Grid cells without elevation data")
        .with_unit(Unit::Count)
        .with_labels(&["source"]);

    // ========================================================================
    // Station Selection
    // ========================================================================

    pub const STATIONS_SELECTED: Metric = Metric::gauge("a3d.meteo.stations_selected")
        .with_description("Stations selected for the last run")
        .with_unit(Unit::Count)
        .with_labels(&["simulation"]);

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Wall-clock time spent in each pipeline stage.
    pub const STAGE_DURATION: Metric = Metric::histogram("a3d.pipeline.stage_duration_s")
        .with_description("Wall-clock duration of a pipeline stage")
        .with_unit(Unit::Seconds)
        .with_labels(&["simulation", "stage"]);

    pub const RUNS_COMPLETED: Metric = Metric::counter("a3d.pipeline.runs_completed")
        .with_description("Pipeline runs that produced a package")
        .with_unit(Unit::Count);

    /// Labels: stage (the stage in which the run failed or was cancelled)
    pub const RUNS_FAILED: Metric = Metric::counter("a3d.pipeline.runs_failed")
        .with_description("Pipeline runs that failed or were cancelled")
        .with_unit(Unit::Count)
        .with_labels(&["stage"]);

    /// Wall-clock time of downstream model invocations.
    pub const MODEL_DURATION: Metric = Metric::histogram("a3d.model.run_duration_s")
        .with_description("Wall-clock duration of external model runs")
        .with_unit(Unit::Seconds)
        .with_labels(&["binary"]);

    /// All metrics, for [`describe_metrics`](super::describe_metrics).
    pub const ALL: &[&Metric] = &[
        // Cache
        &CACHE_HITS,
        &CACHE_MISSES,
        &CACHE_EVICTIONS,
        &CACHE_JOINED,
        // Elevation
        &TILES_FETCHED,
        &FETCH_RETRIES,
        &BYTES_DOWNLOADED,
        &UNCOVERED_CELLS,
        // Meteo
        &STATIONS_SELECTED,
        // Pipeline
        &STAGE_DURATION,
        &RUNS_COMPLETED,
        &RUNS_FAILED,
        &MODEL_DURATION,
    ];
}

/// Labels identifying one pipeline run.
#[derive(Debug, Clone)]
pub struct RunLabels {
    /// Simulation name of the request.
    pub simulation: String,
    /// Current stage, if the metric is stage-scoped.
    pub stage: Option<String>,
}

impl RunLabels {
    pub fn new(simulation: impl Into<String>) -> Self {
        Self {
            simulation: simulation.into(),
            stage: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Converts the labels to the `metrics` crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![("simulation", self.simulation.clone())];
        if let Some(stage) = &self.stage {
            labels.push(("stage", stage.clone()));
        }
        labels
    }
}

/// Describes all metrics of the pipeline.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
