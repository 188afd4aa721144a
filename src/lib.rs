//! # Framelink
//!
//! Zero-copy video frame sharing between threads and processes, with a
//! compositing renderer.
//!
//! - **Frame model**: [`Buffer`](buffer::Buffer) and [`Sample`](sample::Sample)
//!   share storage by reference; duplication and regions of interest never
//!   copy pixels
//! - **Shared-memory arena**: a named POSIX shared-memory heap whose blocks are
//!   addressed by process-independent handles
//! - **Local transport**: a [`Provider`](transport::Provider) publishes the
//!   latest frame of a stream; [`Client`](transport::Client)s in other
//!   processes read it straight from the arena
//! - **Renderer**: composes many inputs into one canvas on a fixed clock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framelink::prelude::*;
//!
//! // Producer process
//! let provider = Provider::start("camera0", TransportConfig::default())?;
//! let frame = provider.alloc_sample(MediaFormat::video(PixelFormat::I420, 1280, 720))?;
//! provider.process(&frame, Timestamp::now())?;
//!
//! // Consumer process
//! let client = Client::start("camera0", TransportConfig::default(), |frame: Sample, ts: Timestamp| {
//!     println!("{} at {}", frame.format(), ts);
//! })?;
//! # Ok::<(), framelink::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod clock;
pub mod converters;
pub mod defaults;
pub mod error;
pub mod format;
pub mod memory;
pub mod observability;
pub mod renderer;
pub mod sample;
pub mod transport;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{Buffer, Ownership};
    pub use crate::clock::Timestamp;
    pub use crate::error::{Error, Result};
    pub use crate::format::{MediaFormat, PixelFormat, SampleFormat};
    pub use crate::memory::{Arena, MemorySegment, MemoryType};
    pub use crate::renderer::{Color, Compositor, Layout, Renderer, RendererConfig, Viewport};
    pub use crate::sample::{PixelRect, Sample};
    pub use crate::transport::{Client, FrameSink, Provider, TransportConfig};
}

pub use error::{Error, Result};
