//! Rectangle scaling (resolution conversion).
//!
//! Every plane is treated as a grid of elements (one luma byte, one chroma
//! byte, one interleaved UV pair, one packed pixel) and scaled
//! independently, so planar, semi-planar and packed RGB formats share one
//! kernel. Packed 4:2:2 mixes two pixels per element and is rejected.

use super::Resampler;
use crate::error::{Error, Result};
use crate::format::PlaneInfo;
use crate::sample::{PixelRect, Sample};

/// Scaling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleAlgorithm {
    /// Nearest neighbor - fastest, deterministic, pixelated results.
    #[default]
    NearestNeighbor,
    /// Bilinear interpolation - good quality/speed balance.
    Bilinear,
}

/// A rectangle in plane elements.
#[derive(Debug, Clone, Copy)]
struct ElemRect {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

impl ElemRect {
    fn of(rect: PixelRect, info: &PlaneInfo) -> Self {
        let x = rect.x as usize / info.unit_width;
        let y = rect.y as usize / info.unit_height;
        let right = (rect.x + rect.width) as usize;
        let bottom = (rect.y + rect.height) as usize;
        Self {
            x,
            y,
            w: right.div_ceil(info.unit_width) - x,
            h: bottom.div_ceil(info.unit_height) - y,
        }
    }
}

/// CPU implementation of [`Resampler`].
///
/// # Example
///
/// ```rust
/// use framelink::converters::{CpuResampler, Resampler, ScaleAlgorithm};
/// use framelink::format::PixelFormat;
/// use framelink::sample::{PixelRect, Sample};
///
/// let src = Sample::new_video(PixelFormat::Bgra, 320, 240)?;
/// let mut dst = Sample::new_video(PixelFormat::Bgra, 640, 480)?;
/// CpuResampler::new()
///     .with_algorithm(ScaleAlgorithm::Bilinear)
///     .resample(&src, PixelRect::full(320, 240), &mut dst, PixelRect::new(0, 0, 320, 180))?;
/// # Ok::<(), framelink::error::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuResampler {
    algorithm: ScaleAlgorithm,
}

impl CpuResampler {
    /// Create a nearest-neighbor resampler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scaling algorithm.
    pub fn with_algorithm(mut self, algorithm: ScaleAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// The configured algorithm.
    pub fn algorithm(&self) -> ScaleAlgorithm {
        self.algorithm
    }

    fn scale_plane(
        &self,
        src: &Sample,
        dst: &mut Sample,
        plane: usize,
        s: ElemRect,
        d: ElemRect,
        bpe: usize,
    ) -> Result<()> {
        let row_err = |y: usize| {
            Error::InvalidArgument(format!("plane {} row {} is not accessible", plane, y))
        };

        match self.algorithm {
            ScaleAlgorithm::NearestNeighbor => {
                for out_y in 0..d.h {
                    let in_y = s.y + (out_y * s.h / d.h).min(s.h - 1);
                    let input = src.row(plane, in_y).ok_or_else(|| row_err(in_y))?;
                    let output = dst.row_mut(plane, d.y + out_y).ok_or_else(|| row_err(d.y + out_y))?;

                    for out_x in 0..d.w {
                        let in_x = s.x + (out_x * s.w / d.w).min(s.w - 1);
                        let src_offset = in_x * bpe;
                        let dst_offset = (d.x + out_x) * bpe;
                        output[dst_offset..dst_offset + bpe]
                            .copy_from_slice(&input[src_offset..src_offset + bpe]);
                    }
                }
            }
            ScaleAlgorithm::Bilinear => {
                let x_ratio = (s.w as f32 - 1.0).max(0.0) / (d.w as f32 - 1.0).max(1.0);
                let y_ratio = (s.h as f32 - 1.0).max(0.0) / (d.h as f32 - 1.0).max(1.0);

                for out_y in 0..d.h {
                    let src_y = out_y as f32 * y_ratio;
                    let y0 = (src_y.floor() as usize).min(s.h - 1);
                    let y1 = (y0 + 1).min(s.h - 1);
                    let y_frac = src_y - y0 as f32;
                    let top = src.row(plane, s.y + y0).ok_or_else(|| row_err(s.y + y0))?;
                    let bottom = src.row(plane, s.y + y1).ok_or_else(|| row_err(s.y + y1))?;
                    let output = dst.row_mut(plane, d.y + out_y).ok_or_else(|| row_err(d.y + out_y))?;

                    for out_x in 0..d.w {
                        let src_x = out_x as f32 * x_ratio;
                        let x0 = (src_x.floor() as usize).min(s.w - 1);
                        let x1 = (x0 + 1).min(s.w - 1);
                        let x_frac = src_x - x0 as f32;

                        for c in 0..bpe {
                            let p00 = top[(s.x + x0) * bpe + c] as f32;
                            let p10 = top[(s.x + x1) * bpe + c] as f32;
                            let p01 = bottom[(s.x + x0) * bpe + c] as f32;
                            let p11 = bottom[(s.x + x1) * bpe + c] as f32;

                            let upper = p00 + x_frac * (p10 - p00);
                            let lower = p01 + x_frac * (p11 - p01);
                            let value = upper + y_frac * (lower - upper);

                            output[(d.x + out_x) * bpe + c] = value.round().clamp(0.0, 255.0) as u8;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Resampler for CpuResampler {
    fn resample(
        &self,
        src: &Sample,
        src_rect: PixelRect,
        dst: &mut Sample,
        dst_rect: PixelRect,
    ) -> Result<()> {
        let (Some(&from), Some(&to)) = (src.video_format(), dst.video_format()) else {
            return Err(Error::UnsupportedFormat("resampling needs video samples".into()));
        };
        if from.pixel != to.pixel {
            return Err(Error::InvalidArgument(format!(
                "resampler needs equal formats, got {} and {}",
                from.pixel, to.pixel
            )));
        }
        if matches!(from.pixel.plane_info(0), Some(info) if info.unit_width > 1) {
            return Err(Error::UnsupportedFormat(format!(
                "cannot resample packed 4:2:2 {}; convert first",
                from.pixel
            )));
        }
        if src_rect.is_empty() || dst_rect.is_empty() {
            return Ok(());
        }
        if !src_rect.fits_within(from.width, from.height) || !dst_rect.fits_within(to.width, to.height) {
            return Err(Error::InvalidArgument(format!(
                "resample rectangles {} / {} exceed {}x{} / {}x{}",
                src_rect, dst_rect, from.width, from.height, to.width, to.height
            )));
        }
        let (ax, ay) = from.pixel.origin_alignment();
        for rect in [src_rect, dst_rect] {
            if rect.x % ax != 0 || rect.y % ay != 0 {
                return Err(Error::InvalidArgument(format!(
                    "rectangle {} is not aligned to {}x{} for {}",
                    rect, ax, ay, from.pixel
                )));
            }
        }
        dst.data_mut()?;

        for plane in 0..from.pixel.plane_count() {
            let Some(info) = from.pixel.plane_info(plane) else {
                continue;
            };
            let s = ElemRect::of(src_rect, &info);
            let d = ElemRect::of(dst_rect, &info);
            self.scale_plane(src, dst, plane, s, d, info.unit_bytes)?;
        }
        Ok(())
    }
}
