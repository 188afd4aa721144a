//! Media format descriptors and plane geometry.
//!
//! A [`MediaFormat`] fully determines how many planes a sample has and how
//! each plane's rows are shaped. Nothing in the crate assumes a fixed plane
//! count: every consumer asks the format.
//!
//! | Tag | Planes | Plane layout |
//! |-----|--------|--------------|
//! | `I420` | 3 | Y full, U and V at half width and half height |
//! | `Nv12` | 2 | Y full, interleaved UV at half height |
//! | `Yuy2` / `Uyvy` | 1 | packed 4:2:2, 4 bytes per 2 pixels |
//! | `Rgb24` / `Bgr24` | 1 | 3 bytes per pixel |
//! | `Rgba` / `Bgra` | 1 | 4 bytes per pixel |
//! | `Gray8` | 1 | 1 byte per pixel |
//! | `S16` / `F32` | 1 | interleaved samples |
//! | `S16Planar` / `F32Planar` | 1 per channel (max 4) | one channel per plane |

use crate::error::{Error, Result};
use smallvec::SmallVec;
use std::fmt;

/// Maximum number of planes a sample can have.
pub const MAX_PLANES: usize = 4;

/// Alignment of plane strides and plane offsets in canonical layouts.
pub const STRIDE_ALIGN: usize = 16;

/// Extra bytes reserved after the last plane of a canonical layout.
///
/// SIMD kernels downstream read past the last pixel in whole vectors.
pub const TRAILING_PADDING: usize = 64;

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// One plane of a sample: where it starts and how far apart its rows are.
///
/// `offset` is relative to the start of the sample's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Plane {
    /// Byte offset of the plane's first row.
    pub offset: usize,
    /// Distance in bytes between the starts of consecutive rows.
    pub stride: usize,
}

impl Plane {
    /// Create a plane descriptor.
    pub const fn new(offset: usize, stride: usize) -> Self {
        Self { offset, stride }
    }
}

/// Plane descriptors of one sample.
pub type Planes = SmallVec<[Plane; MAX_PLANES]>;

/// Horizontal/vertical geometry of one plane relative to the luma grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    /// Bytes in one addressable unit of the plane.
    pub unit_bytes: usize,
    /// Luma pixels covered horizontally by one unit.
    pub unit_width: usize,
    /// Luma rows covered by one plane row.
    pub unit_height: usize,
}

impl PlaneInfo {
    const fn new(unit_bytes: usize, unit_width: usize, unit_height: usize) -> Self {
        Self {
            unit_bytes,
            unit_width,
            unit_height,
        }
    }

    /// Bytes needed for one row covering `width` luma pixels.
    #[inline]
    pub fn row_bytes(&self, width: u32) -> usize {
        (width as usize).div_ceil(self.unit_width) * self.unit_bytes
    }

    /// Rows needed to cover `height` luma rows.
    #[inline]
    pub fn rows(&self, height: u32) -> usize {
        (height as usize).div_ceil(self.unit_height)
    }
}

/// Pixel layout tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0 (Y, U, V planes).
    I420,
    /// Semi-planar YUV 4:2:0 (Y plane, interleaved UV plane).
    Nv12,
    /// Packed YUV 4:2:2, byte order Y0 U Y1 V.
    Yuy2,
    /// Packed YUV 4:2:2, byte order U Y0 V Y1.
    Uyvy,
    /// Packed RGB, 3 bytes per pixel.
    Rgb24,
    /// Packed BGR, 3 bytes per pixel.
    Bgr24,
    /// Packed RGBA, 4 bytes per pixel.
    Rgba,
    /// Packed BGRA, 4 bytes per pixel.
    Bgra,
    /// Grayscale, 1 byte per pixel.
    Gray8,
}

impl PixelFormat {
    /// All pixel formats, in wire-code order.
    pub const ALL: [PixelFormat; 9] = [
        PixelFormat::I420,
        PixelFormat::Nv12,
        PixelFormat::Yuy2,
        PixelFormat::Uyvy,
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Rgba,
        PixelFormat::Bgra,
        PixelFormat::Gray8,
    ];

    /// Number of planes for this format.
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::I420 => 3,
            PixelFormat::Nv12 => 2,
            _ => 1,
        }
    }

    /// Geometry of plane `index`, or `None` past the last plane.
    pub fn plane_info(self, index: usize) -> Option<PlaneInfo> {
        let info = match (self, index) {
            (PixelFormat::I420, 0) | (PixelFormat::Nv12, 0) => PlaneInfo::new(1, 1, 1),
            (PixelFormat::I420, 1 | 2) => PlaneInfo::new(1, 2, 2),
            (PixelFormat::Nv12, 1) => PlaneInfo::new(2, 2, 2),
            (PixelFormat::Yuy2 | PixelFormat::Uyvy, 0) => PlaneInfo::new(4, 2, 1),
            (PixelFormat::Rgb24 | PixelFormat::Bgr24, 0) => PlaneInfo::new(3, 1, 1),
            (PixelFormat::Rgba | PixelFormat::Bgra, 0) => PlaneInfo::new(4, 1, 1),
            (PixelFormat::Gray8, 0) => PlaneInfo::new(1, 1, 1),
            _ => return None,
        };
        Some(info)
    }

    /// Whether the format stores components in separate planes.
    pub fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    /// Whether several components share one plane (packed YUV or RGB).
    pub fn is_packed(self) -> bool {
        matches!(self, PixelFormat::Yuy2 | PixelFormat::Uyvy) || self.is_rgb()
    }

    /// Whether this is a YUV format.
    pub fn is_yuv(self) -> bool {
        matches!(
            self,
            PixelFormat::I420 | PixelFormat::Nv12 | PixelFormat::Yuy2 | PixelFormat::Uyvy
        )
    }

    /// Whether this is a packed RGB format.
    pub fn is_rgb(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Rgba | PixelFormat::Bgra
        )
    }

    /// Horizontal and vertical alignment required of rectangle origins so
    /// that every plane starts on a whole unit.
    pub fn origin_alignment(self) -> (u32, u32) {
        let mut ax = 1;
        let mut ay = 1;
        for info in (0..self.plane_count()).filter_map(|i| self.plane_info(i)) {
            ax = ax.max(info.unit_width as u32);
            ay = ay.max(info.unit_height as u32);
        }
        (ax, ay)
    }

    /// Stable wire code.
    pub fn code(self) -> u32 {
        match self {
            PixelFormat::I420 => 0x01,
            PixelFormat::Nv12 => 0x02,
            PixelFormat::Yuy2 => 0x03,
            PixelFormat::Uyvy => 0x04,
            PixelFormat::Rgb24 => 0x05,
            PixelFormat::Bgr24 => 0x06,
            PixelFormat::Rgba => 0x07,
            PixelFormat::Bgra => 0x08,
            PixelFormat::Gray8 => 0x09,
        }
    }

    /// Look up a pixel format by wire code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.code() == code)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::I420 => "I420",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Yuy2 => "YUY2",
            PixelFormat::Uyvy => "UYVY",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Gray8 => "GRAY8",
        };
        f.write_str(name)
    }
}

/// Audio sample layout tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit, channels interleaved.
    S16,
    /// 32-bit float, channels interleaved.
    F32,
    /// Signed 16-bit, one plane per channel.
    S16Planar,
    /// 32-bit float, one plane per channel.
    F32Planar,
}

impl SampleFormat {
    /// All sample formats, in wire-code order.
    pub const ALL: [SampleFormat; 4] = [
        SampleFormat::S16,
        SampleFormat::F32,
        SampleFormat::S16Planar,
        SampleFormat::F32Planar,
    ];

    /// Bytes per single-channel sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 | SampleFormat::S16Planar => 2,
            SampleFormat::F32 | SampleFormat::F32Planar => 4,
        }
    }

    /// Whether each channel lives in its own plane.
    pub fn is_planar(self) -> bool {
        matches!(self, SampleFormat::S16Planar | SampleFormat::F32Planar)
    }

    /// Stable wire code.
    pub fn code(self) -> u32 {
        match self {
            SampleFormat::S16 => 0x101,
            SampleFormat::F32 => 0x102,
            SampleFormat::S16Planar => 0x103,
            SampleFormat::F32Planar => 0x104,
        }
    }

    /// Look up a sample format by wire code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.code() == code)
    }
}

/// Video frame descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    /// Pixel layout.
    pub pixel: PixelFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl VideoFormat {
    /// Create a video descriptor.
    pub const fn new(pixel: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            pixel,
            width,
            height,
        }
    }

    /// Same pixel layout, different size.
    pub const fn with_size(self, width: u32, height: u32) -> Self {
        Self::new(self.pixel, width, height)
    }
}

/// Audio block descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Sample layout.
    pub sample: SampleFormat,
    /// Samples per channel in the block.
    pub samples: u32,
    /// Channel count.
    pub channels: u32,
    /// Sample rate in Hz.
    pub rate: u32,
}

impl AudioFormat {
    /// Create an audio descriptor.
    pub const fn new(sample: SampleFormat, samples: u32, channels: u32, rate: u32) -> Self {
        Self {
            sample,
            samples,
            channels,
            rate,
        }
    }
}

/// Format descriptor of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    /// Video frame.
    Video(VideoFormat),
    /// Audio block.
    Audio(AudioFormat),
}

/// Largest sample rate representable in the packed audio wire field.
const MAX_WIRE_RATE: u32 = (1 << 24) - 1;

impl MediaFormat {
    /// Shorthand for a video format.
    pub const fn video(pixel: PixelFormat, width: u32, height: u32) -> Self {
        MediaFormat::Video(VideoFormat::new(pixel, width, height))
    }

    /// Shorthand for an audio format.
    pub const fn audio(sample: SampleFormat, samples: u32, channels: u32, rate: u32) -> Self {
        MediaFormat::Audio(AudioFormat::new(sample, samples, channels, rate))
    }

    /// The video descriptor, if this is video.
    pub fn as_video(&self) -> Option<&VideoFormat> {
        match self {
            MediaFormat::Video(v) => Some(v),
            MediaFormat::Audio(_) => None,
        }
    }

    /// The audio descriptor, if this is audio.
    pub fn as_audio(&self) -> Option<&AudioFormat> {
        match self {
            MediaFormat::Audio(a) => Some(a),
            MediaFormat::Video(_) => None,
        }
    }

    /// Check that the descriptor is internally consistent.
    pub fn validate(&self) -> Result<()> {
        match self {
            MediaFormat::Video(v) => {
                if v.width == 0 || v.height == 0 {
                    return Err(Error::InvalidArgument(format!(
                        "video dimensions must be non-zero, got {}x{}",
                        v.width, v.height
                    )));
                }
            }
            MediaFormat::Audio(a) => {
                if a.samples == 0 || a.channels == 0 {
                    return Err(Error::InvalidArgument(format!(
                        "audio block must have samples and channels, got {}x{}",
                        a.samples, a.channels
                    )));
                }
                if a.sample.is_planar() && a.channels as usize > MAX_PLANES {
                    return Err(Error::UnsupportedFormat(format!(
                        "planar audio supports at most {} channels, got {}",
                        MAX_PLANES, a.channels
                    )));
                }
                if a.channels > 0xff || a.rate > MAX_WIRE_RATE {
                    return Err(Error::UnsupportedFormat(format!(
                        "audio {} ch @ {} Hz does not fit the descriptor",
                        a.channels, a.rate
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of planes a sample of this format has.
    pub fn plane_count(&self) -> usize {
        match self {
            MediaFormat::Video(v) => v.pixel.plane_count(),
            MediaFormat::Audio(a) if a.sample.is_planar() => a.channels as usize,
            MediaFormat::Audio(_) => 1,
        }
    }

    /// Bytes of meaningful data in one row of plane `index`.
    pub fn row_bytes(&self, index: usize) -> usize {
        match self {
            MediaFormat::Video(v) => v
                .pixel
                .plane_info(index)
                .map_or(0, |info| info.row_bytes(v.width)),
            MediaFormat::Audio(a) => {
                let per_channel = a.samples as usize * a.sample.bytes_per_sample();
                if a.sample.is_planar() {
                    per_channel
                } else {
                    per_channel * a.channels as usize
                }
            }
        }
    }

    /// Number of rows in plane `index`.
    pub fn plane_rows(&self, index: usize) -> usize {
        match self {
            MediaFormat::Video(v) => v
                .pixel
                .plane_info(index)
                .map_or(0, |info| info.rows(v.height)),
            MediaFormat::Audio(_) => 1,
        }
    }

    /// Allocate-ready layout: plane descriptors and total byte size.
    ///
    /// Strides are rounded up to [`STRIDE_ALIGN`], subsampled heights are
    /// rounded up to whole chroma rows, and [`TRAILING_PADDING`] bytes are
    /// reserved after the last plane.
    pub fn canonical_layout(&self) -> Result<(Planes, usize)> {
        self.validate()?;
        let mut planes = Planes::new();
        let mut offset = 0usize;
        for index in 0..self.plane_count() {
            let stride = align_up(self.row_bytes(index), STRIDE_ALIGN);
            planes.push(Plane::new(offset, stride));
            offset = stride
                .checked_mul(self.plane_rows(index))
                .and_then(|size| size.checked_add(offset))
                .ok_or_else(|| Error::InvalidArgument(format!("{} is too large", self)))?;
        }
        let len = offset
            .checked_add(TRAILING_PADDING)
            .ok_or_else(|| Error::InvalidArgument(format!("{} is too large", self)))?;
        Ok((planes, len))
    }

    /// Smallest buffer length that holds every row of `planes`.
    ///
    /// Returns an error when the plane list does not match the format or a
    /// stride is shorter than a row.
    pub fn required_len(&self, planes: &[Plane]) -> Result<usize> {
        if planes.len() != self.plane_count() {
            return Err(Error::InvalidArgument(format!(
                "format expects {} planes, got {}",
                self.plane_count(),
                planes.len()
            )));
        }
        let mut end = 0usize;
        for (index, plane) in planes.iter().enumerate() {
            let row_bytes = self.row_bytes(index);
            let rows = self.plane_rows(index);
            if rows > 1 && plane.stride < row_bytes {
                return Err(Error::InvalidArgument(format!(
                    "plane {} stride {} is shorter than its {} byte rows",
                    index, plane.stride, row_bytes
                )));
            }
            let plane_end = plane
                .stride
                .checked_mul(rows.saturating_sub(1))
                .and_then(|v| v.checked_add(plane.offset))
                .and_then(|v| v.checked_add(row_bytes))
                .ok_or_else(|| Error::InvalidArgument("plane extent overflows".into()))?;
            end = end.max(plane_end);
        }
        Ok(end)
    }

    /// Wire code of the format tag.
    pub fn code(&self) -> u32 {
        match self {
            MediaFormat::Video(v) => v.pixel.code(),
            MediaFormat::Audio(a) => a.sample.code(),
        }
    }

    /// The two wire dimension fields.
    ///
    /// Video: `(width, height)`. Audio: `(samples, rate << 8 | channels)`.
    pub fn wire_dims(&self) -> (u32, u32) {
        match self {
            MediaFormat::Video(v) => (v.width, v.height),
            MediaFormat::Audio(a) => (a.samples, (a.rate << 8) | (a.channels & 0xff)),
        }
    }

    /// Rebuild a format from its wire code and dimension fields.
    pub fn from_wire(code: u32, dim1: u32, dim2: u32) -> Result<Self> {
        if let Some(pixel) = PixelFormat::from_code(code) {
            return Ok(MediaFormat::video(pixel, dim1, dim2));
        }
        if let Some(sample) = SampleFormat::from_code(code) {
            return Ok(MediaFormat::audio(sample, dim1, dim2 & 0xff, dim2 >> 8));
        }
        Err(Error::Protocol(format!("unknown format code {:#x}", code)))
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}x{}", self.pixel, self.width, self.height)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFormat::Video(v) => write!(f, "{}", v),
            MediaFormat::Audio(a) => write!(
                f,
                "{:?} {} samples x {} ch @ {} Hz",
                a.sample, a.samples, a.channels, a.rate
            ),
        }
    }
}
