//! edge-classify
//!
//! Streams camera frames through a GStreamer capture graph and classifies each
//! frame from the inference branch with a quantized image classifier.
//!
//! # Architecture
//!
//! Control flow is a single blocking chain:
//!
//! 1. **Orchestrator** (`app`): validates paths, loads the classifier, builds the
//!    pipeline source.
//! 2. **Pipeline Runner** (`pipeline`): runs the graph until end-of-stream or error
//!    and hands each frame to a callback.
//! 3. **Inference Wrapper** (`inference`): copies the frame into the input tensor,
//!    invokes the engine and returns the top label with its confidence.
//!
//! Exactly one frame is in flight at a time. Errors propagate as `anyhow::Result`
//! to the binary, which is the only place that decides to exit.
//!
//! # Module Structure
//!
//! - `config`: layered configuration (file, environment, defaults)
//! - `pipeline`: launch description, runner, synthetic `stub://` source
//! - `inference`: engines, label loading, output decoding
//! - `app`: the end-to-end flow used by the `classify` binary

pub mod app;
pub mod config;
pub mod inference;
pub mod pipeline;

pub use app::{AppOptions, RunSummary};
pub use config::{ClassifyConfig, PipelineSettings};
pub use inference::{
    BackendKind, Classification, InferenceEngine, InferenceWrapper, ModelOptions, OutputTensor,
    QuantParams, StubEngine, TensorType,
};
pub use pipeline::{PipelineDescription, PipelineRunner, PipelineSource, PipelineStats};
