//! Feeding renderer inputs from a transport client.

use super::compositor::Compositor;
use crate::clock::Timestamp;
use crate::format::MediaFormat;
use crate::sample::Sample;
use crate::transport::FrameSink;
use std::sync::Arc;
use tracing::warn;

/// A [`FrameSink`] that writes every frame into one compositor input.
///
/// # Example
///
/// ```rust,no_run
/// use framelink::renderer::{Compositor, RendererConfig, RendererInput};
/// use framelink::transport::{Client, TransportConfig};
/// use std::sync::Arc;
///
/// let compositor = Arc::new(Compositor::new(&RendererConfig::default())?);
/// let input = RendererInput::new(Arc::clone(&compositor), "camera0");
/// let client = Client::start("camera0", TransportConfig::default(), input)?;
/// # Ok::<(), framelink::Error>(())
/// ```
pub struct RendererInput {
    compositor: Arc<Compositor>,
    index: usize,
}

impl RendererInput {
    /// Bind to the input called `name`, registering it if needed.
    pub fn new(compositor: Arc<Compositor>, name: &str) -> Self {
        let index = compositor.input_or_add(name);
        Self { compositor, index }
    }

    /// Bind to an existing input index.
    pub fn with_index(compositor: Arc<Compositor>, index: usize) -> Self {
        Self { compositor, index }
    }

    /// The bound input index.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl FrameSink for RendererInput {
    fn on_format(&mut self, format: &MediaFormat) {
        if let Err(e) = self.compositor.set_input_format(self.index, format) {
            warn!(input = self.index, error = %e, "Rejected input format");
        }
    }

    fn on_frame(&mut self, sample: Sample, timestamp: Timestamp) {
        if let Err(e) = self.compositor.set_input_sample(self.index, sample, timestamp) {
            warn!(input = self.index, error = %e, "Rejected input frame");
        }
    }
}
