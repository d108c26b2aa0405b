//! Model loading and per-frame classification.
//!
//! `InferenceWrapper` owns the loaded engine and the label list. Each call copies
//! one frame into the input tensor, runs the model synchronously and decodes the
//! arg-max of the first output tensor into a `Classification`.

mod backends;
mod engine;
mod labels;
mod tensor;
mod wrapper;

pub use backends::StubEngine;
#[cfg(feature = "backend-tract")]
pub use backends::TractEngine;
pub use engine::{BackendKind, InferenceEngine};
pub use labels::read_labels;
pub use tensor::{OutputTensor, QuantParams, TensorType, TopClass};
pub use wrapper::{Classification, InferenceWrapper, ModelOptions};
