use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use super::tensor::OutputTensor;

/// Tensor runtime that executes a loaded model.
///
/// One engine owns one model and its execution context. Calls are synchronous and
/// never re-entered: the pipeline delivers one frame at a time.
pub trait InferenceEngine: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Number of bytes the input tensor expects for one frame.
    ///
    /// `None` when the engine accepts any length.
    fn input_len(&self) -> Option<usize>;

    /// Copy `input` into the input tensor, run the model and return the first output.
    ///
    /// Implementations must not retain `input` beyond the call.
    fn invoke(&mut self, input: &[u8]) -> Result<OutputTensor>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Engine implementations selectable from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// tract runtime (TensorFlow Lite and ONNX models).
    Tract,
    /// Fixed-output engine driven by a JSON model fixture.
    Stub,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tract => "tract",
            Self::Stub => "stub",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tract" => Ok(Self::Tract),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!("unknown inference backend '{}'", other)),
        }
    }
}
