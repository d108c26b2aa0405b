use std::fmt;

use anyhow::{anyhow, Result};

use crate::config::PipelineSettings;

/// Single-slot queue that drops the newest buffer when the consumer falls behind.
const LEAKY_QUEUE: &str = "queue max-size-buffers=1 leaky=downstream";

/// GStreamer launch description for the capture graph.
///
/// ```text
/// v4l2src ! jpeg caps ! jpegdec ! videoconvert ! BGRx ! queue ! tee name=t
///   t. ! queue ! <display sink>
///   t. ! queue ! videoscale ! WxH ! videoconvert ! RGB ! appsink name=<sink>
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDescription {
    text: String,
    sink_name: String,
}

impl PipelineDescription {
    /// Render the capture graph for `settings`.
    pub fn build(settings: &PipelineSettings) -> Result<Self> {
        validate(settings)?;

        let source = match settings.device.as_deref() {
            Some(device) => format!("v4l2src device={}", device),
            None => "v4l2src".to_string(),
        };
        let capture = format!(
            "{} ! image/jpeg,framerate={}/1,width={},height={} ! jpegdec ! videoconvert ! \
             video/x-raw,format=BGRx ! {}",
            source,
            settings.framerate,
            settings.capture_width,
            settings.capture_height,
            LEAKY_QUEUE
        );
        let inference = format!(
            "videoscale ! video/x-raw,width={},height={} ! videoconvert ! \
             video/x-raw,format=RGB ! appsink name={}",
            settings.inference_width, settings.inference_height, settings.sink_name
        );

        let text = if settings.display {
            format!(
                "{capture} ! tee name=t t. ! {q} ! {display} t. ! {q} ! {inference}",
                capture = capture,
                q = LEAKY_QUEUE,
                display = settings.display_sink,
                inference = inference
            )
        } else {
            format!("{} ! {}", capture, inference)
        };

        Ok(Self {
            text,
            sink_name: settings.sink_name.clone(),
        })
    }

    /// Wrap a hand-written description. The graph must contain an appsink named `sink_name`.
    pub fn from_raw(text: impl Into<String>, sink_name: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sink_name: sink_name.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Name of the appsink that delivers frames for inference.
    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }
}

impl fmt::Display for PipelineDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn validate(settings: &PipelineSettings) -> Result<()> {
    for (name, value) in [
        ("capture_width", settings.capture_width),
        ("capture_height", settings.capture_height),
        ("framerate", settings.framerate),
        ("inference_width", settings.inference_width),
        ("inference_height", settings.inference_height),
    ] {
        if value == 0 {
            return Err(anyhow!("pipeline {} must be greater than zero", name));
        }
    }
    if let Some(device) = settings.device.as_deref() {
        check_token("device", device)?;
    }
    check_token("sink_name", &settings.sink_name)?;
    if settings.display {
        check_token("display_sink", &settings.display_sink)?;
    }
    Ok(())
}

/// Values are spliced into the launch string, so they must stay a single token.
fn check_token(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(anyhow!("pipeline {} must not be empty", name));
    }
    if value.chars().any(|c| c.is_whitespace() || c == '!') {
        return Err(anyhow!(
            "pipeline {} '{}' must not contain whitespace or '!'",
            name,
            value
        ));
    }
    Ok(())
}
