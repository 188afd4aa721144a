//! Compositing renderer.
//!
//! Merges any number of independently clocked inputs into one canvas on a
//! fixed refresh interval. Each input keeps only its latest sample; each
//! tick draws the background, then every [`Viewport`] of the current
//! [`Layout`] in order:
//!
//! 1. resolve the bound input, or the no-signal image if it has no fresh
//!    sample
//! 2. fit the source rectangle into the destination rectangle keeping its
//!    aspect ratio
//! 3. resample into place and draw the optional border
//!
//! [`Compositor`] holds the state and performs single ticks;
//! [`Renderer`] drives one from its own thread. [`RendererInput`] lets a
//! transport [`Client`](crate::transport::Client) feed an input directly.

mod compositor;
mod config;
mod draw;
mod input;
mod layout;
mod tick;

pub use compositor::{ComposedFrame, Compositor};
pub use config::{CANVAS_FORMATS, RendererConfig};
pub use input::RendererInput;
pub use layout::{Color, Layout, NormRect, Viewport};
pub use tick::{RenderSink, Renderer};
