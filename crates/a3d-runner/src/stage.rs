//! Pipeline stages, their errors and timing.

use a3d_dem::{CancellationToken, DemError};
use a3d_landcover::LandCoverError;
use a3d_meteo::MeteoError;
use a3d_metrics::{metric_defs, RunLabels};
use a3d_package::PackageError;
use a3d_spatial::RegionError;
use a3d_templates::TemplateError;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

/// Stages of a run, in order. A run never returns to an earlier stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolving,
    Acquiring,
    Deriving,
    Selecting,
    Rendering,
    Packaging,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolving => "resolving",
            Stage::Acquiring => "acquiring",
            Stage::Deriving => "deriving",
            Stage::Selecting => "selecting",
            Stage::Rendering => "rendering",
            Stage::Packaging => "packaging",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the component that owns a stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Dem(#[from] DemError),

    #[error(transparent)]
    LandCover(#[from] LandCoverError),

    #[error(transparent)]
    Meteo(#[from] MeteoError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Package(#[from] PackageError),

    /// The request conflicts with another request of the same batch.
    #[error("{0}")]
    Conflict(String),
}

/// Error of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {source}")]
    Failed {
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("Run cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Failed { stage, .. } | PipelineError::Cancelled { stage } => *stage,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}

/// Error mapper for `map_err`: wraps a component error as a failure of `stage`.
pub(crate) fn failed<E: Into<StageError>>(stage: Stage) -> impl FnOnce(E) -> PipelineError {
    move |e| {
        let source = e.into();
        if matches!(source, StageError::Dem(DemError::Cancelled)) {
            return PipelineError::Cancelled { stage };
        }
        PipelineError::Failed { stage, source }
    }
}

/// Time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub seconds: f64,
}

/// Tracks stage transitions of one run.
///
/// Entering a stage checks for cancellation and that the stage comes after
/// the current one.
pub(crate) struct Progress<'a> {
    simulation: String,
    cancel: &'a CancellationToken,
    current: Option<Stage>,
    timings: Vec<StageTiming>,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(simulation: &str, cancel: &'a CancellationToken) -> Self {
        Self {
            simulation: simulation.to_string(),
            cancel,
            current: None,
            timings: Vec::new(),
        }
    }

    /// Enter `stage`, returning its start time.
    pub(crate) fn begin(&mut self, stage: Stage) -> Result<Instant, PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        debug_assert!(self.current.map_or(true, |c| c < stage), "stage {stage} re-entered");
        info!(simulation = %self.simulation, stage = %stage, "Entering stage");
        self.current = Some(stage);
        Ok(Instant::now())
    }

    /// Record the duration of `stage`.
    pub(crate) fn end(&mut self, stage: Stage, elapsed: Duration) {
        let labels = RunLabels::new(&self.simulation).with_stage(stage.as_str());
        metrics::histogram!(metric_defs::STAGE_DURATION.name, &labels.to_labels()).record(elapsed.as_secs_f64());
        self.timings.push(StageTiming {
            stage,
            seconds: elapsed.as_secs_f64(),
        });
    }

    pub(crate) fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }
}
