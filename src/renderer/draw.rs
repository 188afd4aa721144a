//! Canvas drawing primitives.

use super::layout::Color;
use crate::error::{Error, Result};
use crate::format::PixelFormat;
use crate::sample::{PixelRect, Sample};

/// Fill `rect` of a BGRA, RGBA or I420 canvas with `color`.
pub(crate) fn fill_rect(canvas: &mut Sample, rect: PixelRect, color: Color) -> Result<()> {
    let video = *canvas
        .video_format()
        .ok_or_else(|| Error::UnsupportedFormat("cannot draw on audio".into()))?;
    if rect.is_empty() {
        return Ok(());
    }
    if !rect.fits_within(video.width, video.height) {
        return Err(Error::InvalidArgument(format!(
            "fill {} outside {}x{} canvas",
            rect, video.width, video.height
        )));
    }

    let x0 = rect.x as usize;
    let x1 = (rect.x + rect.width) as usize;
    let y0 = rect.y as usize;
    let y1 = (rect.y + rect.height) as usize;

    match video.pixel {
        PixelFormat::Bgra | PixelFormat::Rgba => {
            let pixel = color.to_packed(video.pixel).unwrap_or([0, 0, 0, 255]);
            for y in y0..y1 {
                let row = canvas.row_mut(0, y).ok_or_else(|| row_error(0, y))?;
                for px in row[x0 * 4..x1 * 4].chunks_exact_mut(4) {
                    px.copy_from_slice(&pixel);
                }
            }
        }
        PixelFormat::I420 => {
            let (luma, cb, cr) = color.to_yuv();
            for y in y0..y1 {
                let row = canvas.row_mut(0, y).ok_or_else(|| row_error(0, y))?;
                row[x0..x1].fill(luma);
            }
            let (cx0, cx1) = (x0 / 2, x1.div_ceil(2));
            for cy in y0 / 2..y1.div_ceil(2) {
                for (plane, value) in [(1, cb), (2, cr)] {
                    let row = canvas.row_mut(plane, cy).ok_or_else(|| row_error(plane, cy))?;
                    row[cx0..cx1].fill(value);
                }
            }
        }
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "cannot draw on a {} canvas",
                other
            )));
        }
    }
    Ok(())
}

/// Outline `rect` with a `width`-pixel border drawn inside it.
pub(crate) fn draw_border(
    canvas: &mut Sample,
    rect: PixelRect,
    width: u32,
    align: (u32, u32),
    color: Color,
) -> Result<()> {
    if width == 0 || rect.is_empty() {
        return Ok(());
    }
    let bw = width.div_ceil(align.0) * align.0;
    let bh = width.div_ceil(align.1) * align.1;
    if rect.width <= bw * 2 || rect.height <= bh * 2 {
        return fill_rect(canvas, rect, color);
    }
    let right = rect.x + rect.width - bw;
    let bottom = rect.y + rect.height - bh;
    fill_rect(canvas, PixelRect::new(rect.x, rect.y, rect.width, bh), color)?;
    fill_rect(canvas, PixelRect::new(rect.x, bottom, rect.width, bh), color)?;
    fill_rect(canvas, PixelRect::new(rect.x, rect.y, bw, rect.height), color)?;
    fill_rect(canvas, PixelRect::new(right, rect.y, bw, rect.height), color)
}

/// Largest rectangle with the aspect ratio of `src_w` x `src_h` that fits
/// in `area`, centered, with origin and size multiples of `align`.
pub(crate) fn fit_rect(src_w: u32, src_h: u32, area: PixelRect, align: (u32, u32)) -> PixelRect {
    if src_w == 0 || src_h == 0 || area.is_empty() {
        return PixelRect::new(area.x, area.y, 0, 0);
    }
    let (sw, sh) = (src_w as u64, src_h as u64);
    let (aw, ah) = (area.width as u64, area.height as u64);
    // Shrink whichever axis overflows.
    let (w, h) = if sw * ah > sh * aw {
        (aw, aw * sh / sw)
    } else {
        (ah * sw / sh, ah)
    };
    let (ax, ay) = (align.0.max(1), align.1.max(1));
    let w = (w as u32) / ax * ax;
    let h = (h as u32) / ay * ay;
    let x = (area.x + (area.width - w) / 2) / ax * ax;
    let y = (area.y + (area.height - h) / 2) / ay * ay;
    PixelRect::new(x.max(area.x), y.max(area.y), w, h)
}

fn row_error(plane: usize, y: usize) -> Error {
    Error::InvalidArgument(format!("canvas plane {} row {} is not writable", plane, y))
}
