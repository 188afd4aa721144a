//! Pixel format conversion (colorspace conversion).
//!
//! Pure Rust YUV ↔ RGB conversion with full-range BT.601 / BT.709
//! matrices in 10-bit fixed point. Formats other than I420 are converted
//! through an I420 intermediate unless a direct path exists (RGB swizzles,
//! I420 as source or target).

use super::PixelConverter;
use crate::error::{Error, Result};
use crate::format::{PixelFormat, VideoFormat};
use crate::sample::{copy_planes, Sample};

/// Color matrix for YUV ↔ RGB conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMatrix {
    /// BT.601 (SD video, most common)
    #[default]
    Bt601,
    /// BT.709 (HD video)
    Bt709,
}

impl ColorMatrix {
    /// Convert one YUV triple to RGB.
    #[inline]
    pub fn yuv_to_rgb(self, y: u8, u: u8, v: u8) -> (u8, u8, u8) {
        let y = y as i32;
        let u = u as i32 - 128;
        let v = v as i32 - 128;

        // Coefficients scaled by 1024.
        let (r, g, b) = match self {
            ColorMatrix::Bt601 => (
                y + ((1436 * v) >> 10),
                y - ((352 * u + 731 * v) >> 10),
                y + ((1815 * u) >> 10),
            ),
            ColorMatrix::Bt709 => (
                y + ((1613 * v) >> 10),
                y - ((192 * u + 479 * v) >> 10),
                y + ((1900 * u) >> 10),
            ),
        };

        (
            r.clamp(0, 255) as u8,
            g.clamp(0, 255) as u8,
            b.clamp(0, 255) as u8,
        )
    }

    /// Convert one RGB triple to YUV.
    #[inline]
    pub fn rgb_to_yuv(self, r: u8, g: u8, b: u8) -> (u8, u8, u8) {
        let r = r as i32;
        let g = g as i32;
        let b = b as i32;

        let (y, u, v) = match self {
            ColorMatrix::Bt601 => (
                (306 * r + 601 * g + 117 * b) >> 10,
                ((-173 * r - 339 * g + 512 * b) >> 10) + 128,
                ((512 * r - 429 * g - 83 * b) >> 10) + 128,
            ),
            ColorMatrix::Bt709 => (
                (218 * r + 732 * g + 74 * b) >> 10,
                ((-117 * r - 395 * g + 512 * b) >> 10) + 128,
                ((512 * r - 465 * g - 47 * b) >> 10) + 128,
            ),
        };

        (
            y.clamp(0, 255) as u8,
            u.clamp(0, 255) as u8,
            v.clamp(0, 255) as u8,
        )
    }
}

/// Byte positions of R, G, B (and alpha) inside a packed RGB pixel.
#[derive(Debug, Clone, Copy)]
struct RgbLayout {
    r: usize,
    g: usize,
    b: usize,
    bpp: usize,
}

impl RgbLayout {
    fn of(format: PixelFormat) -> Option<Self> {
        let (r, g, b, bpp) = match format {
            PixelFormat::Rgb24 => (0, 1, 2, 3),
            PixelFormat::Bgr24 => (2, 1, 0, 3),
            PixelFormat::Rgba => (0, 1, 2, 4),
            PixelFormat::Bgra => (2, 1, 0, 4),
            _ => return None,
        };
        Some(Self { r, g, b, bpp })
    }

    #[inline]
    fn read(&self, row: &[u8], x: usize) -> (u8, u8, u8) {
        let px = &row[x * self.bpp..];
        (px[self.r], px[self.g], px[self.b])
    }

    #[inline]
    fn write(&self, row: &mut [u8], x: usize, (r, g, b): (u8, u8, u8), alpha: u8) {
        let px = &mut row[x * self.bpp..];
        px[self.r] = r;
        px[self.g] = g;
        px[self.b] = b;
        if self.bpp == 4 {
            px[3] = alpha;
        }
    }
}

/// Byte positions inside a packed 4:2:2 macro-pixel: (Y0, U, Y1, V).
fn yuv422_layout(format: PixelFormat) -> Option<(usize, usize, usize, usize)> {
    match format {
        PixelFormat::Yuy2 => Some((0, 1, 2, 3)),
        PixelFormat::Uyvy => Some((1, 0, 3, 2)),
        _ => None,
    }
}

fn missing_row(plane: usize, y: usize) -> Error {
    Error::InvalidArgument(format!("plane {} row {} is not accessible", plane, y))
}

/// CPU implementation of [`PixelConverter`].
///
/// # Example
///
/// ```rust
/// use framelink::converters::{ColorMatrix, CpuConverter};
/// use framelink::format::PixelFormat;
/// use framelink::sample::Sample;
///
/// let converter = CpuConverter::default().with_color_matrix(ColorMatrix::Bt709);
/// let rgb = Sample::new_video(PixelFormat::Rgb24, 16, 16)?;
/// let nv12 = rgb.convert(PixelFormat::Nv12, &converter)?;
/// assert_eq!(nv12.plane_count(), 2);
/// # Ok::<(), framelink::error::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuConverter {
    matrix: ColorMatrix,
}

impl CpuConverter {
    /// Create a converter with the BT.601 matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the color matrix for YUV conversions.
    pub fn with_color_matrix(mut self, matrix: ColorMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// The configured color matrix.
    pub fn color_matrix(&self) -> ColorMatrix {
        self.matrix
    }

    // -------------------------------------------------------------------------
    // Direct paths
    // -------------------------------------------------------------------------

    fn rgb_to_rgb(&self, src: &Sample, dst: &mut Sample, v: &VideoFormat, to: PixelFormat) -> Result<()> {
        let (Some(sl), Some(dl)) = (RgbLayout::of(v.pixel), RgbLayout::of(to)) else {
            return Err(Error::UnsupportedFormat(format!("{} -> {}", v.pixel, to)));
        };
        let w = v.width as usize;
        for y in 0..v.height as usize {
            let src_row = src.row(0, y).ok_or_else(|| missing_row(0, y))?;
            let dst_row = dst.row_mut(0, y).ok_or_else(|| missing_row(0, y))?;
            for x in 0..w {
                let alpha = if sl.bpp == 4 { src_row[x * 4 + 3] } else { 255 };
                dl.write(dst_row, x, sl.read(src_row, x), alpha);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Anything -> I420
    // -------------------------------------------------------------------------

    fn to_i420(&self, src: &Sample, dst: &mut Sample, v: &VideoFormat) -> Result<()> {
        let w = v.width as usize;
        let h = v.height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        let mut u_row = vec![0u8; cw];
        let mut v_row = vec![0u8; cw];

        match v.pixel {
            PixelFormat::I420 => return copy_planes(src, dst),
            PixelFormat::Nv12 => {
                self.copy_luma(src, dst, h)?;
                for cy in 0..ch {
                    let uv = src.row(1, cy).ok_or_else(|| missing_row(1, cy))?;
                    for i in 0..cw {
                        u_row[i] = uv[2 * i];
                        v_row[i] = uv[2 * i + 1];
                    }
                    self.write_chroma(dst, cy, &u_row, &v_row)?;
                }
            }
            PixelFormat::Gray8 => {
                self.copy_luma(src, dst, h)?;
                u_row.fill(128);
                v_row.fill(128);
                for cy in 0..ch {
                    self.write_chroma(dst, cy, &u_row, &v_row)?;
                }
            }
            PixelFormat::Yuy2 | PixelFormat::Uyvy => {
                let (y0, uo, y1, vo) = yuv422_layout(v.pixel)
                    .ok_or_else(|| Error::UnsupportedFormat(v.pixel.to_string()))?;
                for y in 0..h {
                    let packed = src.row(0, y).ok_or_else(|| missing_row(0, y))?;
                    let luma = dst.row_mut(0, y).ok_or_else(|| missing_row(0, y))?;
                    for (x, out) in luma.iter_mut().enumerate().take(w) {
                        let at = (x / 2) * 4 + if x % 2 == 0 { y0 } else { y1 };
                        *out = packed[at];
                    }
                }
                for cy in 0..ch {
                    let top = src.row(0, 2 * cy).ok_or_else(|| missing_row(0, 2 * cy))?;
                    let bottom_y = (2 * cy + 1).min(h - 1);
                    let bottom = src.row(0, bottom_y).ok_or_else(|| missing_row(0, bottom_y))?;
                    for i in 0..cw {
                        u_row[i] = ((top[i * 4 + uo] as u16 + bottom[i * 4 + uo] as u16 + 1) / 2) as u8;
                        v_row[i] = ((top[i * 4 + vo] as u16 + bottom[i * 4 + vo] as u16 + 1) / 2) as u8;
                    }
                    self.write_chroma(dst, cy, &u_row, &v_row)?;
                }
            }
            rgb => {
                let layout = RgbLayout::of(rgb)
                    .ok_or_else(|| Error::UnsupportedFormat(rgb.to_string()))?;
                // First pass: compute Y for all pixels
                for y in 0..h {
                    let src_row = src.row(0, y).ok_or_else(|| missing_row(0, y))?;
                    let luma = dst.row_mut(0, y).ok_or_else(|| missing_row(0, y))?;
                    for (x, out) in luma.iter_mut().enumerate().take(w) {
                        let (r, g, b) = layout.read(src_row, x);
                        *out = self.matrix.rgb_to_yuv(r, g, b).0;
                    }
                }
                // Second pass: average U/V values in 2x2 blocks
                for cy in 0..ch {
                    let rows = [2 * cy, (2 * cy + 1).min(h - 1)];
                    for i in 0..cw {
                        let cols = [2 * i, (2 * i + 1).min(w - 1)];
                        let mut u_sum = 0u32;
                        let mut v_sum = 0u32;
                        for &ry in &rows {
                            let src_row = src.row(0, ry).ok_or_else(|| missing_row(0, ry))?;
                            for &cx in &cols {
                                let (r, g, b) = layout.read(src_row, cx);
                                let (_, u, v) = self.matrix.rgb_to_yuv(r, g, b);
                                u_sum += u as u32;
                                v_sum += v as u32;
                            }
                        }
                        u_row[i] = (u_sum / 4) as u8;
                        v_row[i] = (v_sum / 4) as u8;
                    }
                    self.write_chroma(dst, cy, &u_row, &v_row)?;
                }
            }
        }
        Ok(())
    }

    fn copy_luma(&self, src: &Sample, dst: &mut Sample, h: usize) -> Result<()> {
        for y in 0..h {
            let from = src.row(0, y).ok_or_else(|| missing_row(0, y))?;
            let to = dst.row_mut(0, y).ok_or_else(|| missing_row(0, y))?;
            to.copy_from_slice(from);
        }
        Ok(())
    }

    fn write_chroma(&self, dst: &mut Sample, cy: usize, u: &[u8], v: &[u8]) -> Result<()> {
        dst.row_mut(1, cy)
            .ok_or_else(|| missing_row(1, cy))?
            .copy_from_slice(u);
        dst.row_mut(2, cy)
            .ok_or_else(|| missing_row(2, cy))?
            .copy_from_slice(v);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // I420 -> anything
    // -------------------------------------------------------------------------

    fn from_i420(&self, src: &Sample, dst: &mut Sample, to: PixelFormat) -> Result<()> {
        let w = src.width() as usize;
        let h = src.height() as usize;
        let cw = w.div_ceil(2);

        match to {
            PixelFormat::I420 => return copy_planes(src, dst),
            PixelFormat::Gray8 => self.copy_luma(src, dst, h)?,
            PixelFormat::Nv12 => {
                self.copy_luma(src, dst, h)?;
                for cy in 0..h.div_ceil(2) {
                    let u = src.row(1, cy).ok_or_else(|| missing_row(1, cy))?;
                    let v = src.row(2, cy).ok_or_else(|| missing_row(2, cy))?;
                    let uv = dst.row_mut(1, cy).ok_or_else(|| missing_row(1, cy))?;
                    for i in 0..cw {
                        uv[2 * i] = u[i];
                        uv[2 * i + 1] = v[i];
                    }
                }
            }
            PixelFormat::Yuy2 | PixelFormat::Uyvy => {
                let (y0, uo, y1, vo) =
                    yuv422_layout(to).ok_or_else(|| Error::UnsupportedFormat(to.to_string()))?;
                for y in 0..h {
                    let luma = src.row(0, y).ok_or_else(|| missing_row(0, y))?;
                    let u = src.row(1, y / 2).ok_or_else(|| missing_row(1, y / 2))?;
                    let v = src.row(2, y / 2).ok_or_else(|| missing_row(2, y / 2))?;
                    let packed = dst.row_mut(0, y).ok_or_else(|| missing_row(0, y))?;
                    for i in 0..cw {
                        packed[i * 4 + y0] = luma[2 * i];
                        packed[i * 4 + y1] = luma[(2 * i + 1).min(w - 1)];
                        packed[i * 4 + uo] = u[i];
                        packed[i * 4 + vo] = v[i];
                    }
                }
            }
            rgb => {
                let layout =
                    RgbLayout::of(rgb).ok_or_else(|| Error::UnsupportedFormat(rgb.to_string()))?;
                for y in 0..h {
                    let luma = src.row(0, y).ok_or_else(|| missing_row(0, y))?;
                    let u = src.row(1, y / 2).ok_or_else(|| missing_row(1, y / 2))?;
                    let v = src.row(2, y / 2).ok_or_else(|| missing_row(2, y / 2))?;
                    let out = dst.row_mut(0, y).ok_or_else(|| missing_row(0, y))?;
                    for x in 0..w {
                        let rgb = self.matrix.yuv_to_rgb(luma[x], u[x / 2], v[x / 2]);
                        layout.write(out, x, rgb, 255);
                    }
                }
            }
        }
        Ok(())
    }
}

impl PixelConverter for CpuConverter {
    fn convert(&self, src: &Sample, dst: &mut Sample) -> Result<()> {
        let (Some(&from), Some(&to)) = (src.video_format(), dst.video_format()) else {
            return Err(Error::UnsupportedFormat(
                "pixel conversion needs video samples".into(),
            ));
        };
        if (from.width, from.height) != (to.width, to.height) {
            return Err(Error::InvalidArgument(format!(
                "conversion cannot resize ({}x{} -> {}x{})",
                from.width, from.height, to.width, to.height
            )));
        }
        dst.data_mut()?;

        match (from.pixel, to.pixel) {
            (a, b) if a == b => copy_planes(src, dst),
            (a, b) if a.is_rgb() && b.is_rgb() => self.rgb_to_rgb(src, dst, &from, b),
            (_, PixelFormat::I420) => self.to_i420(src, dst, &from),
            (PixelFormat::I420, b) => self.from_i420(src, dst, b),
            (_, b) => {
                let mut pivot = Sample::new_video(PixelFormat::I420, from.width, from.height)?;
                self.to_i420(src, &mut pivot, &from)?;
                self.from_i420(&pivot, dst, b)
            }
        }
    }
}
