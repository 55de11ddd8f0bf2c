//! # a3d-runner
//!
//! Orchestration of the A3D input preparation pipeline and the `a3dshell`
//! command line.
//!
//! A [`Pipeline`] borrows the process-wide services (grid cache, template
//! engine, packager, elevation source, station catalogue) and turns a
//! [`SimulationRequest`] into a simulation package, moving through the
//! [`Stage`]s in order. Any failure ends the run with
//! [`PipelineError::Failed`] naming the stage; a cancelled run ends with
//! [`PipelineError::Cancelled`] at the next stage boundary or tile fetch.
//!
//! [`ModelRunner`] optionally runs Alpine3D on the finished package with a
//! wall-clock limit.

mod external;
mod pipeline;
mod request;
mod settings;
mod stage;

pub use external::{ExternalError, ModelOutcome, ModelRunner, MODEL_LOG};
pub use pipeline::{
    resolve_request, Pipeline, ResolvedPoi, ResolvedRequest, RunReport, CONFIG_TEMPLATES, DEM_FILE,
    LANDUSE_FILE, POI_FILE,
};
pub use request::{LandCoverChoice, Masking, Mode, PoiSpec, RequestError, RoiSpec, SimulationRequest};
pub use settings::{
    DemSettings, LandCoverSettings, MeteoSettings, ModelSettings, Overrides, PathSettings, Settings,
    SettingsError, DEFAULT_SETTINGS_FILE,
};
pub use stage::{PipelineError, Stage, StageError, StageTiming};
