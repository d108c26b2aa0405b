//! classify - camera frame classifier
//!
//! Runs the capture pipeline and prints the top label and confidence of every
//! frame that reaches the inference branch.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use edge_classify::{app, AppOptions, ClassifyConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Classify camera frames with a quantized image classifier"
)]
struct Args {
    /// Path to the model file (.tflite or .onnx; JSON fixture for the stub backend).
    #[arg(long)]
    model: PathBuf,

    /// Path to the label file, one class name per line.
    #[arg(long)]
    labels: PathBuf,

    /// Camera device node (e.g. /dev/video1), or stub://<name> for synthetic frames.
    #[arg(long)]
    device: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ClassifyConfig::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    log::info!("starting classifier");
    let options = AppOptions {
        model: args.model,
        labels: args.labels,
        device: args.device,
    };
    app::run(&options, &config)?;
    log::info!("exiting");
    Ok(())
}
