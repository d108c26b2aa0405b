#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::infer::Factoid;

use crate::inference::engine::InferenceEngine;
use crate::inference::tensor::{OutputTensor, QuantParams, TensorType};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ModelFormat {
    Tflite,
    Onnx,
}

impl ModelFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("tflite") => Ok(Self::Tflite),
            Some("onnx") => Ok(Self::Onnx),
            _ => Err(anyhow!(
                "cannot infer model format of {} (expected .tflite or .onnx)",
                path.display()
            )),
        }
    }
}

/// Pixel layout of a float input tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FloatLayout {
    Nhwc,
    Nchw,
}

/// tract-based engine for TensorFlow Lite and ONNX classifiers.
///
/// The runnable plan is the execution context. It is built once, runs on the CPU
/// and is never shared.
pub struct TractEngine {
    plan: Plan,
    input_type: DatumType,
    input_shape: Vec<usize>,
    float_layout: Option<FloatLayout>,
    output_name: String,
}

impl TractEngine {
    /// Load a model and prepare it for inference.
    ///
    /// `width`/`height` fill in the input shape when the model leaves it symbolic.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (w, h) = (width as usize, height as usize);
        let model = match ModelFormat::from_path(model_path)? {
            ModelFormat::Tflite => {
                let mut model = tract_tflite::tflite()
                    .model_for_path(model_path)
                    .with_context(|| {
                        format!("failed to load TFLite model from {}", model_path.display())
                    })?;
                let fact = model.input_fact(0).context("model has no input")?.clone();
                if fact.shape.as_concrete().is_none() {
                    model
                        .set_input_fact(0, TypedFact::dt_shape(fact.datum_type, [1, h, w, 3]))
                        .context("failed to set input fact")?;
                }
                model
                    .into_optimized()
                    .context("failed to optimize TFLite model")?
            }
            ModelFormat::Onnx => {
                let mut model = tract_onnx::onnx()
                    .model_for_path(model_path)
                    .with_context(|| {
                        format!("failed to load ONNX model from {}", model_path.display())
                    })?;
                let fact = model.input_fact(0).context("model has no input")?.clone();
                if fact.shape.as_concrete_finite()?.is_none() {
                    let datum_type = fact.datum_type.concretize().unwrap_or(f32::datum_type());
                    let shape = fallback_input_shape(datum_type, w, h);
                    model
                        .set_input_fact(0, InferenceFact::dt_shape(datum_type, shape))
                        .context("failed to set input fact")?;
                }
                model
                    .into_optimized()
                    .context("failed to optimize ONNX model")?
            }
        };
        let plan = model
            .into_runnable()
            .context("failed to build runnable model")?;

        let fact = plan.model().input_fact(0).context("model has no input")?;
        let input_type = fact.datum_type;
        let input_shape = fact
            .shape
            .as_concrete()
            .ok_or_else(|| anyhow!("model input shape is not concrete"))?
            .to_vec();
        let float_layout = match input_type.unquantized() {
            DatumType::U8 => None,
            DatumType::F32 => Some(float_layout(&input_shape)?),
            other => return Err(anyhow!("unsupported model input type {:?}", other)),
        };

        let outlet = *plan
            .model()
            .output_outlets()?
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let output_name = plan.model().node(outlet.node).name.clone();

        log::info!(
            "tract engine ready: input {:?} {:?}, output {}",
            input_type,
            input_shape,
            output_name
        );

        Ok(Self {
            plan,
            input_type,
            input_shape,
            float_layout,
            output_name,
        })
    }

    fn build_input(&self, pixels: &[u8]) -> Result<Tensor> {
        let Some(layout) = self.float_layout else {
            return byte_input(&self.input_shape, self.input_type, pixels);
        };

        let (h, w) = match layout {
            FloatLayout::Nhwc => (self.input_shape[1], self.input_shape[2]),
            FloatLayout::Nchw => (self.input_shape[2], self.input_shape[3]),
        };
        let input = match layout {
            FloatLayout::Nhwc => {
                tract_ndarray::Array4::from_shape_fn((1, h, w, 3), |(_, y, x, channel)| {
                    pixels[(y * w + x) * 3 + channel] as f32 / 255.0
                })
            }
            FloatLayout::Nchw => {
                tract_ndarray::Array4::from_shape_fn((1, 3, h, w), |(_, channel, y, x)| {
                    pixels[(y * w + x) * 3 + channel] as f32 / 255.0
                })
            }
        };
        Ok(input.into_tensor())
    }

    fn read_output(&self, tensor: Tensor) -> Result<OutputTensor> {
        output_from_tensor(&self.output_name, tensor)
    }
}

/// Copy a packed frame into a u8 or quantized-u8 input tensor.
fn byte_input(shape: &[usize], datum_type: DatumType, pixels: &[u8]) -> Result<Tensor> {
    let mut tensor = Tensor::from_shape::<u8>(shape, pixels)
        .context("failed to copy frame into input tensor")?;
    if datum_type != DatumType::U8 {
        // SAFETY: quantized u8 shares the u8 storage layout.
        unsafe { tensor.set_datum_type(datum_type) };
    }
    Ok(tensor)
}

/// Input shape used when an ONNX model leaves its own open: byte models take
/// NHWC frames, float models NCHW.
fn fallback_input_shape(datum_type: DatumType, w: usize, h: usize) -> TVec<usize> {
    if datum_type.unquantized() == DatumType::U8 {
        tvec!(1, h, w, 3)
    } else {
        tvec!(1, 3, h, w)
    }
}

fn output_from_tensor(name: &str, tensor: Tensor) -> Result<OutputTensor> {
    let dt = tensor.datum_type();
    let quantization = dt.is_quantized().then(|| {
        let (zero_point, scale) = dt.zp_scale();
        QuantParams { zero_point, scale }
    });
    let (tensor_type, data) = match dt.unquantized() {
        DatumType::U8 => (TensorType::UInt8, tensor.as_slice::<u8>()?.to_vec()),
        DatumType::F32 => (
            TensorType::Float32,
            tensor
                .as_slice::<f32>()?
                .iter()
                .flat_map(|v| v.to_ne_bytes())
                .collect(),
        ),
        DatumType::I8 => (TensorType::Int8, Vec::new()),
        DatumType::I16 => (TensorType::Int16, Vec::new()),
        DatumType::I32 => (TensorType::Int32, Vec::new()),
        DatumType::I64 => (TensorType::Int64, Vec::new()),
        other => (
            TensorType::Other(format!("{:?}", other).to_lowercase()),
            Vec::new(),
        ),
    };
    Ok(OutputTensor {
        name: name.to_string(),
        tensor_type,
        quantization,
        data,
    })
}

fn float_layout(shape: &[usize]) -> Result<FloatLayout> {
    match shape {
        [1, _, _, 3] => Ok(FloatLayout::Nhwc),
        [1, 3, _, _] => Ok(FloatLayout::Nchw),
        _ => Err(anyhow!(
            "unsupported float input shape {:?} (expected 1xHxWx3 or 1x3xHxW)",
            shape
        )),
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_len(&self) -> Option<usize> {
        Some(self.input_shape.iter().product())
    }

    fn invoke(&mut self, input: &[u8]) -> Result<OutputTensor> {
        let expected: usize = self.input_shape.iter().product();
        if input.len() != expected {
            return Err(anyhow!(
                "expected {} input bytes, received {}",
                expected,
                input.len()
            ));
        }
        let tensor = self.build_input(input)?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .context("inference failed")?;
        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        self.read_output(output.into_tensor())
    }

    /// Run one zero-filled frame so the first camera frame does not pay for
    /// lazy allocations.
    fn warm_up(&mut self) -> Result<()> {
        let zeros = vec![0u8; self.input_shape.iter().product()];
        self.invoke(&zeros).context("warm-up inference failed")?;
        log::debug!("tract engine warmed up");
        Ok(())
    }
}
