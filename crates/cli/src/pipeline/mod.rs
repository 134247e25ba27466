//! Pipeline orchestration module.

mod orchestrator;
mod source;
mod stats;

pub use orchestrator::{EventSource, Pipeline, PipelineConfig};
pub use stats::PipelineStats;
