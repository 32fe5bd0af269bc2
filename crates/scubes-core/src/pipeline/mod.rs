pub mod config;
mod orchestrator;
pub mod types;

pub use config::PipelineConfig;
pub use orchestrator::{
    acquire_stamps, build_mask, calibrate_target, run_pipeline, run_pipeline_reported, run_target,
    ObjectReport, Services,
};
pub use types::{NoOpReporter, PipelineStage, ProgressReporter};
