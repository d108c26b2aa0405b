//! Command-line behaviour of the `classify` binary.
//!
//! Runs use the stub backend and the synthetic `stub://` source, so no camera,
//! model runtime or GStreamer installation is needed.

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

const QUANTIZED_MODEL: &[u8] = br#"{
    "input_len": 150528,
    "output": { "type": "uint8", "zero_point": 0, "scale": 0.01, "values": [10, 200, 5] }
}"#;

fn write_temp(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents).expect("write temp file");
    file
}

fn classify(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_classify"));
    for key in [
        "CLASSIFY_CONFIG",
        "CLASSIFY_LOG_LEVEL",
        "CLASSIFY_BACKEND",
        "CLASSIFY_DEVICE",
        "CLASSIFY_DISPLAY",
        "CLASSIFY_SYNTHETIC_FRAMES",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd.args(args).envs(env.iter().copied());
    cmd.output().expect("run classify")
}

#[test]
fn missing_arguments_print_usage() {
    let out = classify(&[], &[]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Usage"), "stderr: {}", stderr);
}

#[test]
fn unknown_flags_print_usage() {
    let model = write_temp(QUANTIZED_MODEL);
    let labels = write_temp(b"cat\ndog\nbird\n");
    let out = classify(
        &[
            "--model",
            model.path().to_str().unwrap(),
            "--labels",
            labels.path().to_str().unwrap(),
            "--threads",
            "4",
        ],
        &[],
    );
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage"));
}

#[test]
fn missing_model_file_fails_before_pipeline() {
    let labels = write_temp(b"cat\ndog\nbird\n");
    let out = classify(
        &[
            "--model",
            "/nonexistent/model.tflite",
            "--labels",
            labels.path().to_str().unwrap(),
            "--device",
            "stub://camera",
        ],
        &[("CLASSIFY_BACKEND", "stub")],
    );
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("/nonexistent/model.tflite does not exist"), "stderr: {}", stderr);
    assert!(!stderr.contains("synthetic source"));
    assert!(out.stdout.is_empty());
}

#[test]
fn classifies_synthetic_frames() {
    let model = write_temp(QUANTIZED_MODEL);
    let labels = write_temp(b"cat\ndog\nbird\n");
    let out = classify(
        &[
            "--model",
            model.path().to_str().unwrap(),
            "--labels",
            labels.path().to_str().unwrap(),
            "--device",
            "stub://camera",
        ],
        &[("CLASSIFY_BACKEND", "stub"), ("CLASSIFY_SYNTHETIC_FRAMES", "2")],
    );
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["dog 2.0000", "dog 2.0000"]);
}

#[test]
fn unsupported_output_type_exits_with_failure() {
    let model = write_temp(br#"{"output": {"type": "int16", "values": [3, 1, 2]}}"#);
    let labels = write_temp(b"cat\ndog\nbird\n");
    let out = classify(
        &[
            "--model",
            model.path().to_str().unwrap(),
            "--labels",
            labels.path().to_str().unwrap(),
            "--device",
            "stub://camera",
        ],
        &[("CLASSIFY_BACKEND", "stub")],
    );
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unsupported output type: int16"));
}
