//! Capture pipeline.
//!
//! `PipelineDescription` renders the GStreamer launch string for the camera graph.
//! `PipelineRunner` executes it (or a synthetic `stub://` source) and forwards each
//! frame from the inference branch to a callback.

mod description;
mod runner;

pub use description::PipelineDescription;
pub use runner::{
    PipelineRunner, PipelineSource, PipelineStats, SyntheticSettings, SYNTHETIC_PREFIX,
};
