use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};

use super::backends::StubEngine;
use super::engine::{BackendKind, InferenceEngine};
use super::labels::read_labels;

/// Options for loading a model.
#[derive(Clone, Debug)]
pub struct ModelOptions {
    pub backend: BackendKind,
    /// Input width used when the model leaves its input shape open.
    pub input_width: u32,
    /// Input height used when the model leaves its input shape open.
    pub input_height: u32,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Tract,
            input_width: 224,
            input_height: 224,
        }
    }
}

/// Top-1 classification of one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
}

/// Loaded model state: an engine plus the label list it indexes into.
pub struct InferenceWrapper {
    engine: Box<dyn InferenceEngine>,
    labels: Vec<String>,
}

impl InferenceWrapper {
    /// Load the model with the configured backend, then read the label file.
    pub fn new<M: AsRef<Path>, L: AsRef<Path>>(
        model_path: M,
        label_path: L,
        options: &ModelOptions,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        log::debug!(
            "loading model {} with {} backend",
            model_path.display(),
            options.backend
        );
        let engine = load_engine(model_path, options)?;
        Self::prepare(engine, label_path.as_ref())
    }

    /// Warm the engine up, then attach the labels read from `label_path`.
    fn prepare(mut engine: Box<dyn InferenceEngine>, label_path: &Path) -> Result<Self> {
        engine.warm_up()?;
        let labels = read_labels(label_path)?;
        Self::with_engine(engine, labels)
    }

    /// Wrap an already loaded engine.
    pub fn with_engine(engine: Box<dyn InferenceEngine>, labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("label list is empty"));
        }
        log::debug!(
            "inference wrapper ready: engine={}, {} labels",
            engine.name(),
            labels.len()
        );
        Ok(Self { engine, labels })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Bytes expected per frame, if the engine fixes it.
    pub fn input_len(&self) -> Option<usize> {
        self.engine.input_len()
    }

    /// Classify one frame.
    ///
    /// `pixels` must hold exactly one input tensor's worth of bytes. The call blocks
    /// until the engine finishes.
    pub fn run_inference(&mut self, pixels: &[u8]) -> Result<Classification> {
        log::trace!("running inference on {} bytes", pixels.len());
        let started = Instant::now();
        let output = self.engine.invoke(pixels)?;
        let top = output.top_class()?;
        let label = self.labels.get(top.index).ok_or_else(|| {
            anyhow!(
                "output class {} has no label ({} labels loaded)",
                top.index,
                self.labels.len()
            )
        })?;
        log::trace!("inference took {:?}", started.elapsed());
        log::debug!(
            "inference result: {} with confidence {}",
            label,
            top.confidence
        );
        Ok(Classification {
            index: top.index,
            label: label.clone(),
            confidence: top.confidence,
        })
    }
}

fn load_engine(model_path: &Path, options: &ModelOptions) -> Result<Box<dyn InferenceEngine>> {
    match options.backend {
        BackendKind::Stub => Ok(Box::new(StubEngine::from_model_file(model_path)?)),
        BackendKind::Tract => {
            #[cfg(feature = "backend-tract")]
            {
                Ok(Box::new(super::backends::TractEngine::new(
                    model_path,
                    options.input_width,
                    options.input_height,
                )?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                anyhow::bail!("the tract backend requires the backend-tract feature")
            }
        }
    }
}
