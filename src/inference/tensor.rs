use std::fmt;

use anyhow::{anyhow, Result};

/// Element type of a runtime output tensor.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TensorType {
    UInt8,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Other(String),
}

impl TensorType {
    /// Parse the lowercase type name used by model fixtures.
    pub fn from_name(name: &str) -> Self {
        match name {
            "uint8" => Self::UInt8,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "float32" => Self::Float32,
            other => Self::Other(other.to_string()),
        }
    }

    /// Size in bytes of one element, when known.
    pub fn element_size(&self) -> Option<usize> {
        match self {
            Self::UInt8 | Self::Int8 => Some(1),
            Self::Int16 => Some(2),
            Self::Int32 | Self::Float32 => Some(4),
            Self::Int64 => Some(8),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UInt8 => f.write_str("uint8"),
            Self::Int8 => f.write_str("int8"),
            Self::Int16 => f.write_str("int16"),
            Self::Int32 => f.write_str("int32"),
            Self::Int64 => f.write_str("int64"),
            Self::Float32 => f.write_str("float32"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Affine quantization parameters: `real = (raw - zero_point) * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantParams {
    pub zero_point: i32,
    pub scale: f32,
}

impl Default for QuantParams {
    fn default() -> Self {
        Self {
            zero_point: 0,
            scale: 1.0,
        }
    }
}

/// Raw output of one inference call.
///
/// `data` holds the tensor contents in native byte order.
#[derive(Clone, Debug)]
pub struct OutputTensor {
    pub name: String,
    pub tensor_type: TensorType,
    pub quantization: Option<QuantParams>,
    pub data: Vec<u8>,
}

/// Index of the best class and its rescaled score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TopClass {
    pub index: usize,
    pub confidence: f32,
}

impl OutputTensor {
    /// Number of elements, derived from the element size rather than the byte count.
    pub fn element_count(&self) -> Option<usize> {
        self.tensor_type
            .element_size()
            .map(|size| self.data.len() / size)
    }

    /// Find the arg-max element and convert it to a confidence.
    ///
    /// Only `uint8` (quantized) and `float32` outputs are supported. Ties resolve to
    /// the first maximal element; NaN scores never win.
    pub fn top_class(&self) -> Result<TopClass> {
        match self.tensor_type {
            TensorType::UInt8 => {
                let (index, raw) = self
                    .data
                    .iter()
                    .copied()
                    .enumerate()
                    .fold(None, |best: Option<(usize, u8)>, (i, v)| match best {
                        Some((_, b)) if b >= v => best,
                        _ => Some((i, v)),
                    })
                    .ok_or_else(|| anyhow!("output tensor {} is empty", self.name))?;
                let q = self.quantization.unwrap_or_default();
                Ok(TopClass {
                    index,
                    confidence: (raw as i32 - q.zero_point) as f32 * q.scale,
                })
            }
            TensorType::Float32 => {
                if self.data.len() % 4 != 0 {
                    return Err(anyhow!(
                        "float32 output tensor {} has {} bytes, not a multiple of 4",
                        self.name,
                        self.data.len()
                    ));
                }
                let (index, value) = self
                    .data
                    .chunks_exact(4)
                    .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .enumerate()
                    .filter(|(_, v)| !v.is_nan())
                    .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
                        Some((_, b)) if b >= v => best,
                        _ => Some((i, v)),
                    })
                    .ok_or_else(|| anyhow!("output tensor {} has no finite scores", self.name))?;
                Ok(TopClass {
                    index,
                    confidence: value,
                })
            }
            ref other => Err(anyhow!(
                "tensor {} has unsupported output type: {}",
                self.name,
                other
            )),
        }
    }
}
