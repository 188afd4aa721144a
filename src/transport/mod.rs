//! Local frame transport between processes.
//!
//! A [`Provider`] publishes the latest frame of a named stream; any number
//! of [`Client`]s in other processes receive it without copying pixel
//! data. Each stream has two rendezvous points derived from its name:
//!
//! - the shared-memory arena `/framelink.<name>`, mapped read-only by clients
//! - the control socket `<socket_dir>/framelink-<name>.sock`
//!
//! Clients pull: every REQUEST is answered with one descriptor for a frame
//! newer than the last one that client received, possibly after waiting
//! for the producer. Intermediate frames are skipped, so a slow consumer
//! never holds back the producer or other consumers. A frame stays
//! allocated in the arena while the producer or any client holds it.
//!
//! See [`protocol`] for the wire format.

mod client;
mod config;
pub mod protocol;
mod provider;

pub use client::{Client, ClientStats};
pub use config::TransportConfig;
pub use provider::{Provider, ProviderStats};

use crate::clock::Timestamp;
use crate::format::MediaFormat;
use crate::sample::Sample;

/// Receiver of frames delivered by a [`Client`].
///
/// Called on the client's I/O thread. Returning from
/// [`on_frame`](Self::on_frame) issues the next request, so slow sinks
/// receive fewer frames rather than a backlog.
///
/// Closures `FnMut(Sample, Timestamp)` implement this trait directly.
pub trait FrameSink: Send + 'static {
    /// The format of the following frames differs from the previous frame.
    fn on_format(&mut self, format: &MediaFormat) {
        let _ = format;
    }

    /// A new frame arrived.
    fn on_frame(&mut self, sample: Sample, timestamp: Timestamp);
}

impl<F> FrameSink for F
where
    F: FnMut(Sample, Timestamp) + Send + 'static,
{
    fn on_frame(&mut self, sample: Sample, timestamp: Timestamp) {
        self(sample, timestamp)
    }
}
