//! Layout description: where each input lands on the canvas.

use crate::converters::ColorMatrix;
use crate::format::PixelFormat;
use crate::sample::PixelRect;

/// An opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

impl Color {
    /// Black.
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    /// White.
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    /// Fill used for viewports without signal and without a placeholder image.
    pub const NO_SIGNAL: Color = Color::rgb(32, 32, 32);

    /// Create a color from its components.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Full-range BT.601 `(y, u, v)` of this color.
    pub fn to_yuv(self) -> (u8, u8, u8) {
        ColorMatrix::Bt601.rgb_to_yuv(self.r, self.g, self.b)
    }

    /// Bytes of one pixel in a packed RGB `format`, or `None` for formats
    /// that are not packed RGB.
    pub fn to_packed(self, format: PixelFormat) -> Option<[u8; 4]> {
        match format {
            PixelFormat::Bgra => Some([self.b, self.g, self.r, 255]),
            PixelFormat::Rgba => Some([self.r, self.g, self.b, 255]),
            PixelFormat::Bgr24 => Some([self.b, self.g, self.r, 0]),
            PixelFormat::Rgb24 => Some([self.r, self.g, self.b, 0]),
            _ => None,
        }
    }
}

/// A rectangle in normalized coordinates (0..1 of some frame).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormRect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub w: f32,
    /// Height.
    pub h: f32,
}

impl NormRect {
    /// The whole frame.
    pub const FULL: NormRect = NormRect::new(0.0, 0.0, 1.0, 1.0);

    /// Create a rectangle.
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Map onto a `width` x `height` frame, clamped to the frame, with the
    /// origin and far edges rounded down to multiples of `align`.
    pub fn to_pixels(&self, width: u32, height: u32, align: (u32, u32)) -> PixelRect {
        let span = |start: f32, len: f32, total: u32, step: u32| {
            let clamp = |v: f32| (v * total as f32).round().clamp(0.0, total as f32) as u32;
            let step = step.max(1);
            let lo = clamp(start) / step * step;
            let hi = clamp(start + len) / step * step;
            (lo, hi.saturating_sub(lo))
        };
        let (x, w) = span(self.x, self.w, width, align.0);
        let (y, h) = span(self.y, self.h, height, align.1);
        PixelRect::new(x, y, w, h)
    }
}

/// One destination/source rectangle pair of a layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    /// Target area on the canvas.
    pub dst: NormRect,
    /// Area of the input to show.
    pub src: NormRect,
    /// Bound input, or `None` for a decorative region.
    pub input: Option<usize>,
    /// Border drawn around the final destination rectangle.
    pub border: Option<Color>,
}

impl Viewport {
    /// Show all of `input` in `dst`.
    pub fn new(input: usize, dst: NormRect) -> Self {
        Self {
            dst,
            src: NormRect::FULL,
            input: Some(input),
            border: None,
        }
    }

    /// A region without input; only its border is drawn.
    pub fn decoration(dst: NormRect, border: Color) -> Self {
        Self {
            dst,
            src: NormRect::FULL,
            input: None,
            border: Some(border),
        }
    }

    /// Show only `src` of the input.
    pub fn with_source(mut self, src: NormRect) -> Self {
        self.src = src;
        self
    }

    /// Draw a border.
    pub fn with_border(mut self, color: Color) -> Self {
        self.border = Some(color);
        self
    }
}

/// Viewports, drawn in order (later ones on top).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    /// The viewports.
    pub viewports: Vec<Viewport>,
}

impl Layout {
    /// Create a layout from viewports.
    pub fn new(viewports: Vec<Viewport>) -> Self {
        Self { viewports }
    }

    /// Inputs `0..n` in equal columns, left to right.
    pub fn side_by_side(n: usize) -> Self {
        Self::grid(n, 1)
    }

    /// Inputs `0..cols*rows` in a grid, row-major.
    pub fn grid(cols: usize, rows: usize) -> Self {
        if cols == 0 || rows == 0 {
            return Self::default();
        }
        let w = 1.0 / cols as f32;
        let h = 1.0 / rows as f32;
        let viewports = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (row, col)))
            .map(|(row, col)| {
                Viewport::new(
                    row * cols + col,
                    NormRect::new(col as f32 * w, row as f32 * h, w, h),
                )
            })
            .collect();
        Self { viewports }
    }

    /// Add a border to every viewport.
    pub fn with_borders(mut self, color: Color) -> Self {
        for viewport in &mut self.viewports {
            viewport.border = Some(color);
        }
        self
    }

    /// Highest input index referenced, if any.
    pub fn max_input(&self) -> Option<usize> {
        self.viewports.iter().filter_map(|v| v.input).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_packing() {
        let c = Color::rgb(1, 2, 3);
        assert_eq!(c.to_packed(PixelFormat::Bgra), Some([3, 2, 1, 255]));
        assert_eq!(c.to_packed(PixelFormat::Rgba), Some([1, 2, 3, 255]));
        assert_eq!(c.to_packed(PixelFormat::I420), None);
        assert_eq!(Color::BLACK.to_yuv(), (0, 128, 128));
    }

    #[test]
    fn test_side_by_side() {
        let layout = Layout::side_by_side(2);
        assert_eq!(layout.viewports.len(), 2);
        assert_eq!(layout.viewports[1].input, Some(1));
        assert_eq!(
            layout.viewports[1].dst.to_pixels(640, 480, (1, 1)),
            PixelRect::new(320, 0, 320, 480)
        );
        assert_eq!(layout.max_input(), Some(1));
    }

    #[test]
    fn test_grid_order_is_row_major() {
        let layout = Layout::grid(2, 2);
        let rects: Vec<_> = layout
            .viewports
            .iter()
            .map(|v| v.dst.to_pixels(100, 100, (1, 1)))
            .collect();
        assert_eq!(rects[1], PixelRect::new(50, 0, 50, 50));
        assert_eq!(rects[2], PixelRect::new(0, 50, 50, 50));
        assert!(Layout::grid(0, 3).viewports.is_empty());
    }

    #[test]
    fn test_to_pixels_aligns_and_clamps() {
        let rect = NormRect::new(0.01, 0.01, 0.5, 2.0).to_pixels(101, 101, (2, 2));
        assert_eq!(rect.x % 2, 0);
        assert_eq!(rect.y % 2, 0);
        assert!(rect.x + rect.width <= 101);
        assert!(rect.y + rect.height <= 101);
        assert_eq!(NormRect::new(0.9, 0.0, 0.0, 1.0).to_pixels(10, 10, (1, 1)).width, 0);
    }
}
