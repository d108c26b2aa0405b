use anyhow::{anyhow, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::path::Path;

use crate::inference::BackendKind;

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;
const DEFAULT_BACKEND: BackendKind = BackendKind::Tract;
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_FRAMERATE: u32 = 30;
const DEFAULT_INFERENCE_WIDTH: u32 = 224;
const DEFAULT_INFERENCE_HEIGHT: u32 = 224;
const DEFAULT_DISPLAY_SINK: &str = "ximagesink";
const DEFAULT_SINK_NAME: &str = "appsink";
const DEFAULT_SYNTHETIC_FRAMES: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct ClassifyConfigFile {
    log_level: Option<String>,
    backend: Option<String>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    device: Option<String>,
    capture_width: Option<u32>,
    capture_height: Option<u32>,
    framerate: Option<u32>,
    inference_width: Option<u32>,
    inference_height: Option<u32>,
    display: Option<bool>,
    display_sink: Option<String>,
    sink_name: Option<String>,
    synthetic_frames: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    pub log_level: LevelFilter,
    pub backend: BackendKind,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Camera device node; `stub://...` selects the synthetic source.
    pub device: Option<String>,
    pub capture_width: u32,
    pub capture_height: u32,
    pub framerate: u32,
    pub inference_width: u32,
    pub inference_height: u32,
    pub display: bool,
    pub display_sink: String,
    pub sink_name: String,
    /// Frames produced by the synthetic source before end-of-stream.
    pub synthetic_frames: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            device: None,
            capture_width: DEFAULT_CAPTURE_WIDTH,
            capture_height: DEFAULT_CAPTURE_HEIGHT,
            framerate: DEFAULT_FRAMERATE,
            inference_width: DEFAULT_INFERENCE_WIDTH,
            inference_height: DEFAULT_INFERENCE_HEIGHT,
            display: true,
            display_sink: DEFAULT_DISPLAY_SINK.to_string(),
            sink_name: DEFAULT_SINK_NAME.to_string(),
            synthetic_frames: DEFAULT_SYNTHETIC_FRAMES,
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL,
            backend: DEFAULT_BACKEND,
            pipeline: PipelineSettings::default(),
        }
    }
}

impl ClassifyConfig {
    /// Load from the file named by `CLASSIFY_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CLASSIFY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClassifyConfigFile) -> Result<Self> {
        let log_level = match file.log_level.as_deref() {
            Some(level) => parse_log_level(level)?,
            None => DEFAULT_LOG_LEVEL,
        };
        let backend = match file.backend.as_deref() {
            Some(backend) => backend.parse()?,
            None => DEFAULT_BACKEND,
        };
        let p = file.pipeline.unwrap_or_default();
        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            device: p.device.filter(|d| !d.trim().is_empty()),
            capture_width: p.capture_width.unwrap_or(defaults.capture_width),
            capture_height: p.capture_height.unwrap_or(defaults.capture_height),
            framerate: p.framerate.unwrap_or(defaults.framerate),
            inference_width: p.inference_width.unwrap_or(defaults.inference_width),
            inference_height: p.inference_height.unwrap_or(defaults.inference_height),
            display: p.display.unwrap_or(defaults.display),
            display_sink: p.display_sink.unwrap_or(defaults.display_sink),
            sink_name: p.sink_name.unwrap_or(defaults.sink_name),
            synthetic_frames: p.synthetic_frames.unwrap_or(defaults.synthetic_frames),
        };
        Ok(Self {
            log_level,
            backend,
            pipeline,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(level) = std::env::var("CLASSIFY_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.log_level = parse_log_level(&level)?;
            }
        }
        if let Ok(backend) = std::env::var("CLASSIFY_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend.parse()?;
            }
        }
        if let Ok(device) = std::env::var("CLASSIFY_DEVICE") {
            if !device.trim().is_empty() {
                self.pipeline.device = Some(device);
            }
        }
        if let Ok(display) = std::env::var("CLASSIFY_DISPLAY") {
            self.pipeline.display = parse_bool(&display)
                .ok_or_else(|| anyhow!("CLASSIFY_DISPLAY must be true or false"))?;
        }
        if let Ok(frames) = std::env::var("CLASSIFY_SYNTHETIC_FRAMES") {
            self.pipeline.synthetic_frames = frames.trim().parse().map_err(|_| {
                anyhow!("CLASSIFY_SYNTHETIC_FRAMES must be an integer number of frames")
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.inference_width == 0 || p.inference_height == 0 {
            return Err(anyhow!("inference size must be greater than zero"));
        }
        if p.capture_width == 0 || p.capture_height == 0 {
            return Err(anyhow!("capture size must be greater than zero"));
        }
        if p.framerate == 0 {
            return Err(anyhow!("framerate must be greater than zero"));
        }
        if p.sink_name.trim().is_empty() {
            return Err(anyhow!("sink_name must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClassifyConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: ClassifyConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_log_level(value: &str) -> Result<LevelFilter> {
    value
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| anyhow!("unknown log level '{}'", value.trim()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
