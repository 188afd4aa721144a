//! One render tick: inputs + layout → composed canvas.

use super::config::{RendererConfig, validate_canvas};
use super::draw::{draw_border, fill_rect, fit_rect};
use super::layout::{Color, Layout, NormRect};
use crate::buffer::Ownership;
use crate::clock::Timestamp;
use crate::converters::{CpuConverter, CpuResampler, PixelConverter, Resampler};
use crate::error::{Error, Result};
use crate::format::{MediaFormat, VideoFormat};
use crate::observability::RenderMetrics;
use crate::sample::{PixelRect, Sample, copy_planes};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Output of one tick.
#[derive(Debug, Clone)]
pub struct ComposedFrame {
    /// The canvas.
    pub sample: Sample,
    /// Newest timestamp among viewports that drew live input, or the tick
    /// time when none did.
    pub timestamp: Timestamp,
    /// Viewports that drew live input.
    pub live_viewports: usize,
}

struct InputSlot {
    name: String,
    format: Option<VideoFormat>,
    latest: Option<(Sample, Timestamp)>,
    /// Whether a tick has drawn `latest`.
    consumed: bool,
}

struct CompositorState {
    canvas_format: VideoFormat,
    layout: Option<Arc<Layout>>,
    background: Color,
    /// Background image as given, and stretched to the canvas.
    background_source: Option<Sample>,
    background_image: Option<Sample>,
    /// Placeholder as given, and converted to the canvas format.
    no_signal_source: Option<Sample>,
    no_signal_image: Option<Sample>,
    inputs: Vec<InputSlot>,
    /// Last composed canvas, reused once downstream released it.
    canvas: Option<Sample>,
}

/// What a viewport draws, captured under the lock.
enum Content {
    Live(Sample, Timestamp),
    Placeholder,
    Decoration,
}

/// Inputs, layout and images of a renderer, and the tick itself.
///
/// Every setter may be called from any thread at any time; changes take
/// effect at the next [`compose`](Self::compose). Pixel work happens with
/// the lock released.
///
/// # Example
///
/// ```rust
/// use framelink::clock::Timestamp;
/// use framelink::format::PixelFormat;
/// use framelink::renderer::{Compositor, Layout, RendererConfig};
/// use framelink::sample::Sample;
///
/// let config = RendererConfig::default().with_size(640, 480);
/// let compositor = Compositor::new(&config)?;
/// let cam = compositor.add_input("cam");
/// compositor.set_layout(Layout::side_by_side(1));
///
/// let now = Timestamp::now();
/// compositor.set_input_sample(cam, Sample::new_video(PixelFormat::I420, 320, 240)?, now)?;
/// let frame = compositor.compose(now)?.expect("layout is set");
/// assert_eq!(frame.sample.width(), 640);
/// # Ok::<(), framelink::Error>(())
/// ```
pub struct Compositor {
    stale_after: Duration,
    border_width: u32,
    converter: Arc<dyn PixelConverter>,
    resampler: Arc<dyn Resampler>,
    metrics: RenderMetrics,
    state: Mutex<CompositorState>,
    /// Held across the image and canvas setters so each stores images
    /// derived from the canvas and sources it read.
    images: Mutex<()>,
    /// Called after a new sample or layout was stored.
    on_change: OnceLock<Box<dyn Fn() + Send + Sync>>,
}

impl Compositor {
    /// Create a compositor with the CPU converter and resampler.
    pub fn new(config: &RendererConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stale_after: config.stale_after,
            border_width: config.border_width,
            converter: Arc::new(CpuConverter::default()),
            resampler: Arc::new(CpuResampler::default()),
            metrics: RenderMetrics::new(),
            state: Mutex::new(CompositorState {
                canvas_format: config.canvas_format(),
                layout: None,
                background: config.background,
                background_source: None,
                background_image: None,
                no_signal_source: None,
                no_signal_image: None,
                inputs: Vec::new(),
                canvas: None,
            }),
            images: Mutex::new(()),
            on_change: OnceLock::new(),
        })
    }

    /// Use another pixel converter.
    pub fn with_converter(mut self, converter: Arc<dyn PixelConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Use another resampler.
    pub fn with_resampler(mut self, resampler: Arc<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    fn lock(&self) -> MutexGuard<'_, CompositorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the hook run whenever new input data or a layout arrives.
    /// Only the first call has an effect.
    pub(crate) fn set_change_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        let _ = self.on_change.set(Box::new(hook));
    }

    fn changed(&self) {
        if let Some(hook) = self.on_change.get() {
            hook();
        }
    }

    // ------------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------------

    /// Register an input and return its index.
    pub fn add_input(&self, name: &str) -> usize {
        let mut state = self.lock();
        state.inputs.push(InputSlot {
            name: name.to_string(),
            format: None,
            latest: None,
            consumed: true,
        });
        state.inputs.len() - 1
    }

    /// Index of the input called `name`, registering it first if needed.
    pub fn input_or_add(&self, name: &str) -> usize {
        let mut state = self.lock();
        if let Some(index) = state.inputs.iter().position(|slot| slot.name == name) {
            return index;
        }
        state.inputs.push(InputSlot {
            name: name.to_string(),
            format: None,
            latest: None,
            consumed: true,
        });
        state.inputs.len() - 1
    }

    /// Index of the input called `name`.
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.lock().inputs.iter().position(|slot| slot.name == name)
    }

    /// Number of registered inputs.
    pub fn input_count(&self) -> usize {
        self.lock().inputs.len()
    }

    /// Announce the format of the samples `index` will receive.
    pub fn set_input_format(&self, index: usize, format: &MediaFormat) -> Result<()> {
        let video = *format.as_video().ok_or_else(|| {
            Error::UnsupportedFormat(format!("renderer input needs video, got {}", format))
        })?;
        let mut state = self.lock();
        let slot = slot_mut(&mut state, index)?;
        if slot.format != Some(video) {
            debug!(input = %slot.name, format = %video, "Input format set");
        }
        slot.format = Some(video);
        Ok(())
    }

    /// Replace the latest sample of input `index`.
    ///
    /// The sample must match the format announced by
    /// [`set_input_format`](Self::set_input_format), if any.
    pub fn set_input_sample(&self, index: usize, sample: Sample, timestamp: Timestamp) -> Result<()> {
        let video = *sample.video_format().ok_or_else(|| {
            Error::UnsupportedFormat(format!("renderer input needs video, got {}", sample.format()))
        })?;
        let superseded = {
            let mut state = self.lock();
            let slot = slot_mut(&mut state, index)?;
            if let Some(declared) = slot.format.filter(|declared| *declared != video) {
                return Err(Error::InvalidArgument(format!(
                    "input {} expects {}, got {}",
                    slot.name, declared, video
                )));
            }
            let superseded = slot.latest.is_some() && !slot.consumed;
            // Old sample is dropped after the lock is released.
            let old = slot.latest.replace((sample, timestamp));
            slot.consumed = false;
            drop(state);
            drop(old);
            superseded
        };
        if superseded {
            self.metrics.record_input_skipped();
        }
        self.changed();
        Ok(())
    }

    /// Forget the latest sample of input `index`.
    pub fn clear_input(&self, index: usize) -> Result<()> {
        let old = {
            let mut state = self.lock();
            let slot = slot_mut(&mut state, index)?;
            slot.consumed = true;
            slot.latest.take()
        };
        drop(old);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Replace the layout.
    pub fn set_layout(&self, layout: Layout) {
        let mut state = self.lock();
        if let Some(max) = layout.max_input().filter(|max| *max >= state.inputs.len()) {
            // Inputs can be added later; until then the viewport shows no signal.
            debug!(max_input = max, inputs = state.inputs.len(), "Layout references unknown inputs");
        }
        state.layout = Some(Arc::new(layout));
        drop(state);
        self.changed();
    }

    /// Remove the layout; ticks produce nothing until a new one is set.
    pub fn clear_layout(&self) {
        self.lock().layout = None;
    }

    /// Set the background fill color.
    pub fn set_background_color(&self, color: Color) {
        self.lock().background = color;
    }

    /// Set (or clear) the background image. It is stretched to the canvas
    /// once, here, and redrawn unchanged every tick.
    pub fn set_background_image(&self, image: Option<Sample>) -> Result<()> {
        let _images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        let canvas = self.lock().canvas_format;
        let stretched = image.as_ref().map(|img| self.stretch(img, &canvas)).transpose()?;
        let mut state = self.lock();
        state.background_source = image;
        state.background_image = stretched;
        Ok(())
    }

    /// Set (or clear) the image shown for inputs without a live sample.
    pub fn set_no_signal_image(&self, image: Option<Sample>) -> Result<()> {
        let _images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        let canvas = self.lock().canvas_format;
        let converted = image.as_ref().map(|img| self.to_canvas(img, &canvas)).transpose()?;
        let mut state = self.lock();
        state.no_signal_source = image;
        state.no_signal_image = converted;
        Ok(())
    }

    /// Change the canvas format or size.
    pub fn set_canvas(&self, canvas: VideoFormat) -> Result<()> {
        validate_canvas(&canvas)?;
        let _images = self.images.lock().unwrap_or_else(PoisonError::into_inner);
        let (background, no_signal) = {
            let state = self.lock();
            (state.background_source.clone(), state.no_signal_source.clone())
        };
        let background = background.as_ref().map(|img| self.stretch(img, &canvas)).transpose()?;
        let no_signal = no_signal.as_ref().map(|img| self.to_canvas(img, &canvas)).transpose()?;

        let mut state = self.lock();
        state.canvas_format = canvas;
        state.background_image = background;
        state.no_signal_image = no_signal;
        state.canvas = None;
        Ok(())
    }

    /// Current canvas format.
    pub fn canvas_format(&self) -> VideoFormat {
        self.lock().canvas_format
    }

    fn to_canvas(&self, image: &Sample, canvas: &VideoFormat) -> Result<Sample> {
        let video = image
            .video_format()
            .ok_or_else(|| Error::UnsupportedFormat("image must be video".into()))?;
        if video.pixel == canvas.pixel {
            Ok(image.dup())
        } else {
            image.convert(canvas.pixel, self.converter.as_ref())
        }
    }

    fn stretch(&self, image: &Sample, canvas: &VideoFormat) -> Result<Sample> {
        let converted = self.to_canvas(image, canvas)?;
        let mut out = Sample::new_video(canvas.pixel, canvas.width, canvas.height)?;
        self.resampler.resample(
            &converted,
            PixelRect::full(converted.width(), converted.height()),
            &mut out,
            PixelRect::full(canvas.width, canvas.height),
        )?;
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Compose one frame for tick time `now`.
    ///
    /// Returns `None` without a layout. Inputs whose timestamp is further
    /// than `stale_after` from `now` are dropped and shown as no signal.
    pub fn compose(&self, now: Timestamp) -> Result<Option<ComposedFrame>> {
        let Some(snapshot) = self.snapshot(now) else {
            return Ok(None);
        };
        let canvas_format = snapshot.canvas_format;
        let align = canvas_format.pixel.origin_alignment();

        let mut canvas = match snapshot.previous {
            Some(previous)
                if previous.video_format() == Some(&canvas_format)
                    && previous.ownership() == Ownership::Owned =>
            {
                previous
            }
            _ => Sample::new_video(canvas_format.pixel, canvas_format.width, canvas_format.height)?,
        };

        match &snapshot.background_image {
            Some(image) if image.format() == canvas.format() => copy_planes(image, &mut canvas)?,
            _ => fill_rect(
                &mut canvas,
                PixelRect::full(canvas_format.width, canvas_format.height),
                snapshot.background,
            )?,
        }

        let mut timestamp: Option<Timestamp> = None;
        let mut live_viewports = 0;
        for (viewport, content) in snapshot.layout.viewports.iter().zip(snapshot.contents) {
            let area = viewport.dst.to_pixels(canvas_format.width, canvas_format.height, align);
            if area.is_empty() {
                continue;
            }

            let drawn = match content {
                Content::Live(sample, ts) => {
                    match self.draw_source(&mut canvas, &sample, viewport.src, area, align) {
                        Ok(rect) => {
                            live_viewports += 1;
                            timestamp = Some(timestamp.map_or(ts, |t| t.max(ts)));
                            rect
                        }
                        Err(e) => {
                            warn!(input = ?viewport.input, error = %e, "Failed to draw input");
                            self.draw_placeholder(&mut canvas, snapshot.no_signal.as_ref(), area, align)?
                        }
                    }
                }
                Content::Placeholder => {
                    self.draw_placeholder(&mut canvas, snapshot.no_signal.as_ref(), area, align)?
                }
                Content::Decoration => area,
            };

            if let Some(color) = viewport.border {
                draw_border(&mut canvas, drawn, self.border_width, align, color)?;
            }
        }

        let frame = ComposedFrame {
            sample: canvas.dup(),
            timestamp: timestamp.unwrap_or(now),
            live_viewports,
        };
        trace!(timestamp = %frame.timestamp, live = live_viewports, "Composed frame");

        let mut state = self.lock();
        if state.canvas_format == canvas_format {
            state.canvas = Some(canvas);
        }
        Ok(Some(frame))
    }

    /// Capture what this tick needs and retire stale inputs.
    fn snapshot(&self, now: Timestamp) -> Option<Snapshot> {
        let mut retired = Vec::new();
        let mut state = self.lock();
        let layout = Arc::clone(state.layout.as_ref()?);

        for slot in state.inputs.iter_mut() {
            let stale = matches!(&slot.latest, Some((_, ts)) if ts.abs_diff(now) > self.stale_after);
            if !stale {
                continue;
            }
            if let Some((sample, ts)) = slot.latest.take() {
                debug!(input = %slot.name, timestamp = %ts, now = %now, "Input stale, showing no signal");
                retired.push(sample);
            }
        }

        let contents = layout
            .viewports
            .iter()
            .map(|viewport| match viewport.input {
                None => Content::Decoration,
                Some(index) => match state.inputs.get_mut(index) {
                    Some(InputSlot {
                        latest: Some((sample, ts)),
                        consumed,
                        ..
                    }) => {
                        *consumed = true;
                        Content::Live(sample.dup(), *ts)
                    }
                    _ => Content::Placeholder,
                },
            })
            .collect();

        let snapshot = Snapshot {
            canvas_format: state.canvas_format,
            background: state.background,
            background_image: state.background_image.clone(),
            no_signal: state.no_signal_image.clone(),
            previous: state.canvas.take(),
            layout,
            contents,
        };
        drop(state);
        drop(retired);
        Some(snapshot)
    }

    fn draw_source(
        &self,
        canvas: &mut Sample,
        source: &Sample,
        src: NormRect,
        area: PixelRect,
        align: (u32, u32),
    ) -> Result<PixelRect> {
        let canvas_format = *canvas
            .video_format()
            .ok_or_else(|| Error::UnsupportedFormat("canvas must be video".into()))?;
        let source = self.to_canvas(source, &canvas_format)?;
        let src_rect = src.to_pixels(source.width(), source.height(), align);
        let target = fit_rect(src_rect.width, src_rect.height, area, align);
        if target.is_empty() || src_rect.is_empty() {
            return Ok(area);
        }
        self.resampler.resample(&source, src_rect, canvas, target)?;
        Ok(target)
    }

    fn draw_placeholder(
        &self,
        canvas: &mut Sample,
        image: Option<&Sample>,
        area: PixelRect,
        align: (u32, u32),
    ) -> Result<PixelRect> {
        if let Some(image) = image {
            let target = fit_rect(image.width(), image.height(), area, align);
            if !target.is_empty() {
                self.resampler.resample(
                    image,
                    PixelRect::full(image.width(), image.height()),
                    canvas,
                    target,
                )?;
                return Ok(target);
            }
        }
        fill_rect(canvas, area, Color::NO_SIGNAL)?;
        Ok(area)
    }
}

struct Snapshot {
    canvas_format: VideoFormat,
    background: Color,
    background_image: Option<Sample>,
    no_signal: Option<Sample>,
    previous: Option<Sample>,
    layout: Arc<Layout>,
    contents: Vec<Content>,
}

fn slot_mut(state: &mut CompositorState, index: usize) -> Result<&mut InputSlot> {
    let count = state.inputs.len();
    state
        .inputs
        .get_mut(index)
        .ok_or_else(|| Error::InvalidArgument(format!("input {} out of range ({} inputs)", index, count)))
}
