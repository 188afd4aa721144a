//! The renderer's tick thread.

use super::compositor::{ComposedFrame, Compositor};
use super::config::RendererConfig;
use crate::clock::Timestamp;
use crate::error::Result;
use crate::format::VideoFormat;
use crate::observability::{RenderMetrics, span_renderer};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receiver of composed frames, called on the tick thread.
///
/// Closures `FnMut(ComposedFrame)` implement this trait directly.
pub trait RenderSink: Send + 'static {
    /// The canvas format or size differs from the last announced one.
    fn on_format(&mut self, format: &VideoFormat) {
        let _ = format;
    }

    /// One composed frame per tick.
    fn on_frame(&mut self, frame: ComposedFrame);
}

impl<F> RenderSink for F
where
    F: FnMut(ComposedFrame) + Send + 'static,
{
    fn on_frame(&mut self, frame: ComposedFrame) {
        self(frame)
    }
}

#[derive(Default)]
struct RunState {
    stop: bool,
    /// New input data or a layout arrived since the last tick started.
    changed: bool,
}

#[derive(Default)]
struct RunFlag {
    state: Mutex<RunState>,
    wakeup: Condvar,
}

impl RunFlag {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stopped(&self) -> bool {
        self.lock().stop
    }

    fn stop(&self) {
        self.lock().stop = true;
        self.wakeup.notify_all();
    }

    fn notify_change(&self) {
        self.lock().changed = true;
        self.wakeup.notify_all();
    }

    /// Forget changes seen so far; called as a tick starts.
    fn begin_tick(&self) {
        self.lock().changed = false;
    }

    /// Sleep for `timeout` unless stopped first, or, with `wake_on_change`,
    /// until new data arrives. Returns whether stopped.
    fn wait(&self, timeout: Duration, wake_on_change: bool) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .wakeup
            .wait_timeout_while(guard, timeout, |state| {
                !state.stop && !(wake_on_change && state.changed)
            })
            .unwrap_or_else(PoisonError::into_inner);
        guard.stop
    }
}

/// A compositor driven by its own clock.
///
/// The tick thread composes every refresh interval. While no viewport draws
/// live input, a new sample or layout starts the next tick right away.
///
/// # Example
///
/// ```rust,no_run
/// use framelink::renderer::{ComposedFrame, Layout, Renderer, RendererConfig};
///
/// let mut renderer = Renderer::start(RendererConfig::default(), |frame: ComposedFrame| {
///     println!("tick at {}", frame.timestamp);
/// })?;
/// let cam = renderer.compositor().add_input("cam");
/// renderer.compositor().set_layout(Layout::side_by_side(1));
/// // feed `cam` with set_input_sample ...
/// renderer.stop();
/// # Ok::<(), framelink::Error>(())
/// ```
pub struct Renderer {
    compositor: Arc<Compositor>,
    run: Arc<RunFlag>,
    thread: Option<JoinHandle<()>>,
}

impl Renderer {
    /// Create a compositor from `config` and start ticking.
    pub fn start(config: RendererConfig, sink: impl RenderSink) -> Result<Self> {
        let compositor = Compositor::new(&config)?;
        Self::with_compositor(compositor, config.refresh_interval, sink)
    }

    /// Start ticking an existing compositor every `refresh_interval`.
    pub fn with_compositor(
        compositor: Compositor,
        refresh_interval: Duration,
        sink: impl RenderSink,
    ) -> Result<Self> {
        let compositor = Arc::new(compositor);
        let run = Arc::new(RunFlag::default());
        let weak = Arc::downgrade(&run);
        compositor.set_change_hook(move || {
            if let Some(run) = weak.upgrade() {
                run.notify_change();
            }
        });

        let worker = TickLoop {
            compositor: Arc::clone(&compositor),
            run: Arc::clone(&run),
            refresh_interval,
            metrics: RenderMetrics::new(),
            announced: None,
        };
        let thread = std::thread::Builder::new()
            .name("framelink-renderer".to_string())
            .spawn(move || worker.run(sink))?;

        Ok(Self {
            compositor,
            run,
            thread: Some(thread),
        })
    }

    /// Inputs, layout and images.
    pub fn compositor(&self) -> &Arc<Compositor> {
        &self.compositor
    }

    /// Stop ticking and join the thread. A tick in progress finishes but its
    /// frame is discarded. Idempotent.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.run.stop();
        if thread.join().is_err() {
            warn!("Renderer thread panicked");
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct TickLoop {
    compositor: Arc<Compositor>,
    run: Arc<RunFlag>,
    refresh_interval: Duration,
    metrics: RenderMetrics,
    announced: Option<VideoFormat>,
}

impl TickLoop {
    fn run(mut self, mut sink: impl RenderSink) {
        let canvas = self.compositor.canvas_format();
        let _span = span_renderer(canvas.width, canvas.height).entered();
        info!(interval = ?self.refresh_interval, "Renderer started");

        while !self.run.is_stopped() {
            let started = Instant::now();
            self.run.begin_tick();
            // New data cuts the wait short only after a tick without live input.
            let idle = match self.compositor.compose(Timestamp::now()) {
                Ok(Some(frame)) => {
                    let idle = frame.live_viewports == 0;
                    self.deliver(&mut sink, frame);
                    idle
                }
                Ok(None) => true,
                Err(e) => {
                    warn!(error = %e, "Tick failed, frame skipped");
                    false
                }
            };
            let elapsed = started.elapsed();
            self.metrics.record_tick(elapsed, self.refresh_interval);

            if elapsed < self.refresh_interval {
                if self.run.wait(self.refresh_interval - elapsed, idle) {
                    break;
                }
            } else {
                debug!(elapsed = ?elapsed, "Tick overran the refresh interval");
            }
        }
        info!("Renderer stopped");
    }

    fn deliver(&mut self, sink: &mut impl RenderSink, frame: ComposedFrame) {
        if self.run.is_stopped() {
            return;
        }
        let format = frame.sample.video_format().copied();
        if let Some(format) = format.filter(|f| self.announced != Some(*f)) {
            debug!(format = %format, "Canvas format announced");
            sink.on_format(&format);
            self.announced = Some(format);
        }
        sink.on_frame(frame);
    }
}
