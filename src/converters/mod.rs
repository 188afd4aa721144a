//! Pixel-format conversion and resampling.
//!
//! Both are collaborator seams: the frame model and the renderer only talk
//! to the [`PixelConverter`] and [`Resampler`] traits, and the CPU
//! implementations here are the defaults. Swap in hardware or SIMD kernels
//! by implementing the traits.
//!
//! - [`CpuConverter`]: any supported video format to any other (YUV ↔ RGB
//!   through fixed-point [`ColorMatrix`] math)
//! - [`CpuResampler`]: rectangle-to-rectangle scaling within one format
//!   (nearest neighbor or bilinear)
//!
//! # Example
//!
//! ```rust
//! use framelink::converters::{CpuConverter, PixelConverter};
//! use framelink::format::PixelFormat;
//! use framelink::sample::Sample;
//!
//! let yuv = Sample::new_video(PixelFormat::I420, 64, 32)?;
//! let mut rgb = Sample::new_video(PixelFormat::Bgra, 64, 32)?;
//! CpuConverter::default().convert(&yuv, &mut rgb)?;
//! # Ok::<(), framelink::error::Error>(())
//! ```

mod colorspace;
mod scale;

pub use colorspace::{ColorMatrix, CpuConverter};
pub use scale::{CpuResampler, ScaleAlgorithm};

use crate::error::Result;
use crate::sample::{PixelRect, Sample};

/// Converts a frame into another pixel format at the same size.
///
/// Reads N source planes with their strides and writes the M planes of
/// `dst`'s declared format. Implementations have no side effects beyond
/// writing `dst`.
pub trait PixelConverter: Send + Sync {
    /// Convert `src` into `dst`.
    ///
    /// `dst` must be writable and have the same dimensions as `src`.
    fn convert(&self, src: &Sample, dst: &mut Sample) -> Result<()>;
}

/// Scales a rectangle of one frame into a rectangle of another frame of
/// the same pixel format.
pub trait Resampler: Send + Sync {
    /// Scale `src_rect` of `src` into `dst_rect` of `dst`.
    ///
    /// Pixels of `dst` outside `dst_rect` are left untouched.
    fn resample(
        &self,
        src: &Sample,
        src_rect: PixelRect,
        dst: &mut Sample,
        dst_rect: PixelRect,
    ) -> Result<()>;
}
