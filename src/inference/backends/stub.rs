use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::inference::engine::InferenceEngine;
use crate::inference::tensor::{OutputTensor, QuantParams, TensorType};

/// Stub engine for testing and pipeline bring-up.
///
/// The "model" is a JSON fixture describing the expected input length and a fixed
/// output tensor:
///
/// ```json
/// {
///   "input_len": 150528,
///   "output": { "type": "uint8", "zero_point": 0, "scale": 0.01, "values": [10, 200, 5] }
/// }
/// ```
pub struct StubEngine {
    input_len: Option<usize>,
    output: OutputTensor,
    invocations: u64,
}

#[derive(Debug, Deserialize)]
struct StubModelFile {
    input_len: Option<usize>,
    output: StubOutputFile,
}

#[derive(Debug, Deserialize)]
struct StubOutputFile {
    name: Option<String>,
    #[serde(rename = "type")]
    tensor_type: String,
    zero_point: Option<i32>,
    scale: Option<f32>,
    values: Vec<f64>,
}

impl StubEngine {
    /// Build an engine that always returns `output`.
    pub fn new(input_len: Option<usize>, output: OutputTensor) -> Self {
        Self {
            input_len,
            output,
            invocations: 0,
        }
    }

    /// Load a JSON model fixture from disk.
    pub fn from_model_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stub model {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid stub model {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: StubModelFile = serde_json::from_str(raw)?;
        let tensor_type = TensorType::from_name(&file.output.tensor_type);
        let data = encode_values(&tensor_type, &file.output.values)?;
        let quantization = match (file.output.zero_point, file.output.scale) {
            (None, None) => None,
            (zero_point, scale) => Some(QuantParams {
                zero_point: zero_point.unwrap_or(0),
                scale: scale.unwrap_or(1.0),
            }),
        };
        Ok(Self::new(
            file.input_len,
            OutputTensor {
                name: file.output.name.unwrap_or_else(|| "output".to_string()),
                tensor_type,
                quantization,
                data,
            },
        ))
    }

    /// Number of completed `invoke` calls.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

fn encode_values(tensor_type: &TensorType, values: &[f64]) -> Result<Vec<u8>> {
    let bytes: Vec<u8> = match tensor_type {
        TensorType::UInt8 => values.iter().map(|v| *v as u8).collect(),
        TensorType::Int8 => values.iter().map(|v| *v as i8 as u8).collect(),
        TensorType::Int16 => values
            .iter()
            .flat_map(|v| (*v as i16).to_ne_bytes())
            .collect(),
        TensorType::Int32 => values
            .iter()
            .flat_map(|v| (*v as i32).to_ne_bytes())
            .collect(),
        TensorType::Int64 => values
            .iter()
            .flat_map(|v| (*v as i64).to_ne_bytes())
            .collect(),
        TensorType::Float32 => values
            .iter()
            .flat_map(|v| (*v as f32).to_ne_bytes())
            .collect(),
        TensorType::Other(name) => {
            return Err(anyhow!("cannot encode values for tensor type '{}'", name))
        }
    };
    Ok(bytes)
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_len(&self) -> Option<usize> {
        self.input_len
    }

    fn invoke(&mut self, input: &[u8]) -> Result<OutputTensor> {
        if let Some(expected) = self.input_len {
            if input.len() != expected {
                return Err(anyhow!(
                    "expected {} input bytes, received {}",
                    expected,
                    input.len()
                ));
            }
        }
        self.invocations += 1;
        Ok(self.output.clone())
    }
}
