//! Pipeline runner.
//!
//! `PipelineRunner` drives a capture graph until end-of-stream or error and hands
//! every frame that reaches the inference sink to a caller-supplied closure.
//!
//! The runner is responsible for:
//! - Building the graph from its launch description
//! - Locating the named appsink and registering the frame callback
//! - Logging stage warnings and stopping on stage errors
//! - Returning the graph to the Null state on every exit path
//!
//! The frame slice passed to the callback is only valid during the call. The
//! buffer is unmapped as soon as the callback returns, whatever its outcome.

use std::borrow::Cow;

use anyhow::{anyhow, Result};

use super::description::PipelineDescription;
use crate::config::PipelineSettings;

/// Device prefix that selects the synthetic source.
pub const SYNTHETIC_PREFIX: &str = "stub://";

/// Where frames come from.
#[derive(Clone, Debug)]
pub enum PipelineSource {
    /// A GStreamer graph built from a launch description.
    Gstreamer(PipelineDescription),
    /// Generated RGB frames delivered on the calling thread.
    Synthetic(SyntheticSettings),
}

impl PipelineSource {
    /// Pick the source for `settings`: `stub://` devices are synthetic, anything
    /// else gets a capture graph.
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self> {
        let synthetic = settings
            .device
            .as_deref()
            .and_then(|device| device.strip_prefix(SYNTHETIC_PREFIX));
        match synthetic {
            Some(name) => Ok(Self::Synthetic(SyntheticSettings {
                name: name.to_string(),
                width: settings.inference_width,
                height: settings.inference_height,
                frames: settings.synthetic_frames,
            })),
            None => Ok(Self::Gstreamer(PipelineDescription::build(settings)?)),
        }
    }
}

/// Configuration for the synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticSettings {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frames: u64,
}

/// Counters collected over one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_delivered: u64,
    pub warnings: u64,
}

pub struct PipelineRunner {
    source: PipelineSource,
}

impl PipelineRunner {
    pub fn new(source: PipelineSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &PipelineSource {
        &self.source
    }

    /// Run until end-of-stream, a stage error, or a callback error.
    ///
    /// Blocks the calling thread. `on_frame` is invoked once per frame, never
    /// concurrently. A callback error stops the pipeline and is returned.
    pub fn run<F>(self, on_frame: F) -> Result<PipelineStats>
    where
        F: FnMut(&[u8]) -> Result<()> + Send + 'static,
    {
        match self.source {
            PipelineSource::Synthetic(settings) => run_synthetic(&settings, on_frame),
            PipelineSource::Gstreamer(description) => {
                #[cfg(feature = "pipeline-gstreamer")]
                {
                    gst::run(&description, on_frame)
                }
                #[cfg(not(feature = "pipeline-gstreamer"))]
                {
                    let _ = (description, on_frame);
                    anyhow::bail!("the capture pipeline requires the pipeline-gstreamer feature")
                }
            }
        }
    }
}

/// Drop row padding so the frame is tightly packed.
///
/// Returns the input unchanged when rows are already contiguous.
#[cfg_attr(not(feature = "pipeline-gstreamer"), allow(dead_code))]
pub(crate) fn pack_rows(
    data: &[u8],
    row_bytes: usize,
    stride: usize,
    height: usize,
) -> Result<Cow<'_, [u8]>> {
    if stride == row_bytes {
        return Ok(Cow::Borrowed(data));
    }
    if stride < row_bytes {
        return Err(anyhow!(
            "row stride {} is smaller than row size {}",
            stride,
            row_bytes
        ));
    }
    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .ok_or_else(|| anyhow!("frame row {} is out of bounds", row))?,
        );
    }
    Ok(Cow::Owned(pixels))
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

fn run_synthetic<F>(settings: &SyntheticSettings, mut on_frame: F) -> Result<PipelineStats>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    log::info!(
        "synthetic source '{}': {} frames of {}x{} RGB",
        settings.name,
        settings.frames,
        settings.width,
        settings.height
    );
    let len = (settings.width as usize)
        .checked_mul(settings.height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("synthetic frame dimensions overflow"))?;

    let mut pixels = vec![0u8; len];
    let mut stats = PipelineStats::default();
    for frame in 0..settings.frames {
        fill_synthetic(&mut pixels, frame);
        on_frame(&pixels).map_err(|e| e.context("frame callback failed"))?;
        stats.frames_delivered += 1;
    }
    log::info!("synthetic source '{}': end of stream", settings.name);
    Ok(stats)
}

fn fill_synthetic(pixels: &mut [u8], frame: u64) {
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = ((i as u64 + frame) % 256) as u8;
    }
}

// ----------------------------------------------------------------------------
// GStreamer capture graph
// ----------------------------------------------------------------------------

#[cfg(feature = "pipeline-gstreamer")]
mod gst {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Context, Result};
    use gstreamer::glib;
    use gstreamer::prelude::*;

    use super::{pack_rows, PipelineStats};
    use crate::pipeline::PipelineDescription;

    #[derive(Default)]
    struct RunState {
        frames: AtomicU64,
        warnings: AtomicU64,
        failure: Mutex<Option<anyhow::Error>>,
    }

    impl RunState {
        /// Keep the first failure; later ones are usually consequences of it.
        fn fail(&self, err: anyhow::Error) {
            if let Ok(mut slot) = self.failure.lock() {
                if slot.is_none() {
                    *slot = Some(err);
                }
            }
        }

        fn take_failure(&self) -> Option<anyhow::Error> {
            self.failure.lock().ok().and_then(|mut slot| slot.take())
        }
    }

    pub(super) fn run<F>(description: &PipelineDescription, on_frame: F) -> Result<PipelineStats>
    where
        F: FnMut(&[u8]) -> Result<()> + Send + 'static,
    {
        gstreamer::init().context("initialize gstreamer")?;
        let main_loop = glib::MainLoop::new(None, false);

        log::debug!("parsing pipeline: {}", description);
        let pipeline = gstreamer::parse::launch(description.as_str())
            .context("build capture pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("capture description is not a pipeline"))?;

        let appsink = pipeline
            .by_name(description.sink_name())
            .with_context(|| format!("appsink '{}' missing from pipeline", description.sink_name()))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("element '{}' is not an appsink", description.sink_name()))?;

        let state = Arc::new(RunState::default());

        let mut on_frame = on_frame;
        let sample_state = state.clone();
        let sample_loop = main_loop.clone();
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    match deliver_sample(&sample, &mut on_frame) {
                        Ok(()) => {
                            sample_state.frames.fetch_add(1, Ordering::Relaxed);
                            Ok(gstreamer::FlowSuccess::Ok)
                        }
                        Err(err) => {
                            log::error!("frame callback failed: {:#}", err);
                            sample_state.fail(err.context("frame callback failed"));
                            sample_loop.quit();
                            Err(gstreamer::FlowError::Error)
                        }
                    }
                })
                .build(),
        );

        let bus = pipeline.bus().context("pipeline has no bus")?;
        let bus_state = state.clone();
        let bus_loop = main_loop.clone();
        let _bus_watch = bus
            .add_watch(move |_, message| {
                use gstreamer::MessageView;
                match message.view() {
                    MessageView::Eos(..) => {
                        log::info!("end of stream");
                        bus_loop.quit();
                    }
                    MessageView::Error(_) => {
                        if let Some(err) = stage_error(message) {
                            log::error!("{:#}", err);
                            bus_state.fail(err);
                        }
                        bus_loop.quit();
                    }
                    MessageView::Warning(warning) => {
                        log::warn!(
                            "pipeline warning from {:?}: {}",
                            warning.src().map(|s| s.path_string()),
                            warning.error()
                        );
                        bus_state.warnings.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => log::debug!("bus message: {:?}", message.type_()),
                }
                glib::ControlFlow::Continue
            })
            .context("add bus watch")?;

        let weak = pipeline.downgrade();
        if let Err(err) = ctrlc::set_handler(move || {
            if let Some(pipeline) = weak.upgrade() {
                log::info!("interrupt received, sending end-of-stream");
                if !pipeline.send_event(gstreamer::event::Eos::new()) {
                    log::warn!("pipeline did not accept end-of-stream");
                }
            }
        }) {
            log::warn!("failed to install Ctrl-C handler: {}", err);
        }

        let started = pipeline
            .set_state(gstreamer::State::Playing)
            .context("set pipeline to Playing");
        // A stage that fails while starting posts its error before the main loop
        // runs; collect it before Null flushes the bus.
        let start_error = match started {
            Ok(_) => {
                log::info!("pipeline running");
                main_loop.run();
                None
            }
            Err(err) => Some(
                bus.pop_filtered(&[gstreamer::MessageType::Error])
                    .and_then(|message| stage_error(&message))
                    .map(|stage| stage.context(format!("{:#}", err)))
                    .unwrap_or(err),
            ),
        };

        log::debug!("tearing down pipeline");
        appsink.set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        if let Err(err) = pipeline.set_state(gstreamer::State::Null) {
            log::warn!("failed to set pipeline to Null: {}", err);
        }

        if let Some(err) = start_error {
            return Err(err);
        }
        if let Some(err) = state.take_failure() {
            return Err(err);
        }
        Ok(PipelineStats {
            frames_delivered: state.frames.load(Ordering::Relaxed),
            warnings: state.warnings.load(Ordering::Relaxed),
        })
    }

    fn stage_error(message: &gstreamer::Message) -> Option<anyhow::Error> {
        match message.view() {
            gstreamer::MessageView::Error(err) => Some(anyhow!(
                "pipeline error from {:?}: {} ({:?})",
                err.src().map(|s| s.path_string()),
                err.error(),
                err.debug()
            )),
            _ => None,
        }
    }

    fn deliver_sample<F>(sample: &gstreamer::Sample, on_frame: &mut F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let buffer = sample.buffer().context("sample missing buffer")?;
        let map = buffer.map_readable().context("map frame buffer")?;
        let data = map.as_slice();

        let info = sample
            .caps()
            .and_then(|caps| gstreamer_video::VideoInfo::from_caps(caps).ok());
        match info {
            Some(info) if info.format() == gstreamer_video::VideoFormat::Rgb => {
                let row_bytes = info.width() as usize * 3;
                let stride = info.stride()[0] as usize;
                let pixels = pack_rows(data, row_bytes, stride, info.height() as usize)?;
                on_frame(&pixels)
            }
            _ => on_frame(data),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
