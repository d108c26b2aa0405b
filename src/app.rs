//! Orchestration: validate inputs, load the classifier, run the capture pipeline
//! and report one classification per frame.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::{ClassifyConfig, PipelineSettings};
use crate::inference::{Classification, InferenceWrapper, ModelOptions};
use crate::pipeline::{PipelineRunner, PipelineSource, PipelineStats, SYNTHETIC_PREFIX};

/// Paths supplied on the command line.
#[derive(Clone, Debug)]
pub struct AppOptions {
    pub model: PathBuf,
    pub labels: PathBuf,
    /// Overrides the configured camera device.
    pub device: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_classified: u64,
    pub pipeline: PipelineStats,
}

/// Fail unless `path` exists on disk.
pub fn check_file(path: &Path) -> Result<()> {
    log::debug!("checking file {}", path.display());
    if !path.exists() {
        return Err(anyhow!("{} does not exist", path.display()));
    }
    Ok(())
}

/// Check every referenced path before anything is built.
///
/// `stub://` devices are not files and are skipped.
pub fn validate(options: &AppOptions, settings: &PipelineSettings) -> Result<()> {
    check_file(&options.model)?;
    check_file(&options.labels)?;
    if let Some(device) = settings.device.as_deref() {
        if !device.starts_with(SYNTHETIC_PREFIX) {
            check_file(Path::new(device))?;
        }
    }
    Ok(())
}

/// Effective pipeline settings: configuration with the CLI device applied.
pub fn pipeline_settings(options: &AppOptions, config: &ClassifyConfig) -> PipelineSettings {
    let mut settings = config.pipeline.clone();
    if let Some(device) = &options.device {
        settings.device = Some(device.clone());
    }
    settings
}

/// Run the classifier, printing `<label> <confidence>` for every frame.
pub fn run(options: &AppOptions, config: &ClassifyConfig) -> Result<RunSummary> {
    run_with(options, config, |result| {
        println!("{} {:.4}", result.label, result.confidence);
    })
}

/// Run the classifier and hand every result to `on_result`.
pub fn run_with<R>(options: &AppOptions, config: &ClassifyConfig, mut on_result: R) -> Result<RunSummary>
where
    R: FnMut(&Classification) + Send + 'static,
{
    let settings = pipeline_settings(options, config);
    validate(options, &settings)?;

    let source = PipelineSource::from_settings(&settings)?;

    let model_options = ModelOptions {
        backend: config.backend,
        input_width: settings.inference_width,
        input_height: settings.inference_height,
    };
    let mut inferencer = InferenceWrapper::new(&options.model, &options.labels, &model_options)?;

    let frame_len = settings.inference_width as usize * settings.inference_height as usize * 3;
    if let Some(expected) = inferencer.input_len() {
        if expected != frame_len {
            log::warn!(
                "model expects {} input bytes but the pipeline produces {}x{} RGB frames ({} bytes)",
                expected,
                settings.inference_width,
                settings.inference_height,
                frame_len
            );
        }
    }

    let classified = Arc::new(AtomicU64::new(0));
    let counter = classified.clone();
    log::info!("starting pipeline");
    let pipeline = PipelineRunner::new(source).run(move |pixels| {
        if pixels.is_empty() {
            log::error!("invalid pixel data: empty frame, skipping");
            return Ok(());
        }
        let result = inferencer.run_inference(pixels)?;
        counter.fetch_add(1, Ordering::Relaxed);
        on_result(&result);
        Ok(())
    })?;

    let summary = RunSummary {
        frames_classified: classified.load(Ordering::Relaxed),
        pipeline,
    };
    log::info!(
        "pipeline finished: {} frames classified, {} warnings",
        summary.frames_classified,
        summary.pipeline.warnings
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::BackendKind;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents).expect("write temp file");
        file
    }

    fn stub_config(frames: u64) -> ClassifyConfig {
        let mut cfg = ClassifyConfig {
            backend: BackendKind::Stub,
            ..ClassifyConfig::default()
        };
        cfg.pipeline.device = Some("stub://test".to_string());
        cfg.pipeline.synthetic_frames = frames;
        cfg
    }

    #[test]
    fn missing_files_fail_before_pipeline() {
        let labels = write_temp(b"cat\n");
        let options = AppOptions {
            model: PathBuf::from("/nonexistent/model.tflite"),
            labels: labels.path().to_path_buf(),
            device: None,
        };
        let err = run_with(&options, &stub_config(1), |_| {}).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/model.tflite does not exist"));
    }

    #[test]
    fn missing_device_is_rejected() {
        let model = write_temp(b"{}");
        let labels = write_temp(b"cat\n");
        let options = AppOptions {
            model: model.path().to_path_buf(),
            labels: labels.path().to_path_buf(),
            device: Some("/nonexistent/video9".to_string()),
        };
        let settings = pipeline_settings(&options, &ClassifyConfig::default());
        assert!(validate(&options, &settings).is_err());
    }

    #[test]
    fn cli_device_overrides_config() {
        let options = AppOptions {
            model: PathBuf::from("m"),
            labels: PathBuf::from("l"),
            device: Some("/dev/video3".to_string()),
        };
        let settings = pipeline_settings(&options, &stub_config(1));
        assert_eq!(settings.device.as_deref(), Some("/dev/video3"));
    }

    #[test]
    fn classifies_every_synthetic_frame() -> Result<()> {
        let model = write_temp(
            br#"{"input_len": 150528, "output": {"type": "uint8", "zero_point": 0, "scale": 0.01, "values": [10, 200, 5]}}"#,
        );
        let labels = write_temp(b"cat\ndog\nbird\n");
        let options = AppOptions {
            model: model.path().to_path_buf(),
            labels: labels.path().to_path_buf(),
            device: None,
        };
        let (tx, rx) = std::sync::mpsc::channel();
        let summary = run_with(&options, &stub_config(4), move |result| {
            let _ = tx.send(result.clone());
        })?;
        assert_eq!(summary.frames_classified, 4);
        assert_eq!(summary.pipeline.frames_delivered, 4);

        let results: Vec<Classification> = rx.try_iter().collect();
        assert_eq!(results.len(), 4);
        for result in results {
            assert_eq!(result.label, "dog");
            assert_eq!(result.confidence, 2.0);
        }
        Ok(())
    }

    #[test]
    fn empty_frames_are_skipped() -> Result<()> {
        let model = write_temp(
            br#"{"input_len": 150528, "output": {"type": "uint8", "values": [10, 200, 5]}}"#,
        );
        let labels = write_temp(b"cat\ndog\nbird\n");
        let options = AppOptions {
            model: model.path().to_path_buf(),
            labels: labels.path().to_path_buf(),
            device: None,
        };
        let mut config = stub_config(3);
        config.pipeline.inference_width = 0;

        let summary = run_with(&options, &config, |_| {})?;
        assert_eq!(summary.pipeline.frames_delivered, 3);
        assert_eq!(summary.frames_classified, 0);
        Ok(())
    }

    #[test]
    fn unsupported_output_stops_the_run() {
        let model = write_temp(br#"{"output": {"type": "int16", "values": [1, 2]}}"#);
        let labels = write_temp(b"cat\ndog\n");
        let options = AppOptions {
            model: model.path().to_path_buf(),
            labels: labels.path().to_path_buf(),
            device: None,
        };
        let err = run_with(&options, &stub_config(3), |_| {}).unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported output type"));
    }
}
