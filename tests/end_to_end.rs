//! Frame-to-label flow through the public API: synthetic source, stub engine,
//! label file on disk.

use std::io::Write;
use std::sync::mpsc;

use anyhow::Result;
use tempfile::NamedTempFile;

use edge_classify::pipeline::SyntheticSettings;
use edge_classify::{
    BackendKind, Classification, InferenceWrapper, ModelOptions, OutputTensor, PipelineRunner,
    PipelineSource, QuantParams, StubEngine, TensorType,
};

fn write_temp(contents: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents)?;
    Ok(file)
}

fn source(frames: u64) -> PipelineSource {
    PipelineSource::Synthetic(SyntheticSettings {
        name: "e2e".to_string(),
        width: 224,
        height: 224,
        frames,
    })
}

#[test]
fn quantized_scores_map_to_dog() -> Result<()> {
    let model = write_temp(
        br#"{"input_len": 150528, "output": {"type": "uint8", "zero_point": 0, "scale": 0.01, "values": [10, 200, 5]}}"#,
    )?;
    let labels = write_temp(b"cat\ndog\nbird\n")?;
    let options = ModelOptions {
        backend: BackendKind::Stub,
        ..ModelOptions::default()
    };
    let mut wrapper = InferenceWrapper::new(model.path(), labels.path(), &options)?;

    let (tx, rx) = mpsc::channel();
    let stats = PipelineRunner::new(source(3)).run(move |pixels| {
        tx.send(wrapper.run_inference(pixels)?)?;
        Ok(())
    })?;

    assert_eq!(stats.frames_delivered, 3);
    let results: Vec<Classification> = rx.try_iter().collect();
    assert_eq!(results.len(), 3);
    for result in results {
        assert_eq!(result.index, 1);
        assert_eq!(result.label, "dog");
        assert_eq!(result.confidence, 2.0);
    }
    Ok(())
}

#[test]
fn zero_point_offsets_confidence() -> Result<()> {
    let engine = StubEngine::new(
        Some(224 * 224 * 3),
        OutputTensor {
            name: "MobilenetV2/Predictions/Softmax".to_string(),
            tensor_type: TensorType::UInt8,
            quantization: Some(QuantParams {
                zero_point: 128,
                scale: 0.0078125,
            }),
            data: vec![0, 130, 255, 7],
        },
    );
    let labels = ["background", "tabby", "tiger cat", "lynx"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut wrapper = InferenceWrapper::with_engine(Box::new(engine), labels)?;

    let (tx, rx) = mpsc::channel();
    PipelineRunner::new(source(1)).run(move |pixels| {
        tx.send(wrapper.run_inference(pixels)?)?;
        Ok(())
    })?;

    let result = rx.try_recv()?;
    assert_eq!(result.label, "tiger cat");
    assert_eq!(result.confidence, (255 - 128) as f32 * 0.0078125);
    Ok(())
}

#[test]
fn frame_size_mismatch_stops_the_pipeline() -> Result<()> {
    let engine = StubEngine::new(
        Some(300 * 300 * 3),
        OutputTensor {
            name: "scores".to_string(),
            tensor_type: TensorType::Float32,
            quantization: None,
            data: 1.0f32.to_ne_bytes().to_vec(),
        },
    );
    let mut wrapper = InferenceWrapper::with_engine(Box::new(engine), vec!["only".to_string()])?;
    let result = PipelineRunner::new(source(2)).run(move |pixels| {
        wrapper.run_inference(pixels)?;
        Ok(())
    });
    assert!(result.is_err());
    Ok(())
}
