//! Samples: buffers with a format descriptor and strided planes.
//!
//! A [`Sample`] is a [`Buffer`] plus a [`MediaFormat`] and one plane
//! descriptor per plane the format defines. Plane offsets are relative to the
//! start of the buffer, so a sample never holds a bare pointer: every view
//! (duplicate, region of interest, mapped remote frame) keeps its storage
//! alive through the buffer's reference count.
//!
//! # Example
//!
//! ```rust
//! use framelink::format::PixelFormat;
//! use framelink::sample::{PixelRect, Sample};
//!
//! let mut frame = Sample::new_video(PixelFormat::Gray8, 64, 48).unwrap();
//! frame.row_mut(0, 10).unwrap()[20] = 200;
//!
//! let roi = frame.roi(PixelRect::new(16, 8, 32, 32)).unwrap();
//! assert_eq!(roi.row(0, 2).unwrap()[4], 200);
//! ```

use crate::buffer::{Buffer, Ownership};
use crate::converters::{CpuConverter, PixelConverter};
use crate::error::{Error, Result};
use crate::format::{MediaFormat, PixelFormat, Plane, Planes, SampleFormat, VideoFormat};
use std::fmt;

/// Rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PixelRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Create a rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering `width` x `height`.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle lies inside a `width` x `height` area.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Marker carried by region-of-interest views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiInfo {
    /// The view rectangle, relative to the immediate parent.
    pub rect: PixelRect,
    /// Parent width at construction.
    pub parent_width: u32,
    /// Parent height at construction.
    pub parent_height: u32,
}

/// A buffer plus format descriptor and 1-4 strided planes.
#[derive(Clone)]
pub struct Sample {
    buffer: Buffer,
    format: MediaFormat,
    planes: Planes,
    roi: Option<RoiInfo>,
}

impl Sample {
    /// Allocate zeroed owned storage in the canonical layout of `format`.
    pub fn new(format: MediaFormat) -> Result<Self> {
        let (planes, size) = format.canonical_layout()?;
        Ok(Self {
            buffer: Buffer::alloc(size)?,
            format,
            planes,
            roi: None,
        })
    }

    /// Allocate a video frame.
    pub fn new_video(pixel: PixelFormat, width: u32, height: u32) -> Result<Self> {
        Self::new(MediaFormat::video(pixel, width, height))
    }

    /// Allocate an audio block.
    pub fn new_audio(
        sample: SampleFormat,
        samples: u32,
        channels: u32,
        rate: u32,
    ) -> Result<Self> {
        Self::new(MediaFormat::audio(sample, samples, channels, rate))
    }

    /// Wrap existing memory with caller-supplied planes.
    ///
    /// Fails with [`Error::InvalidArgument`] when the plane list does not
    /// match the format or a plane's rows run past the buffer.
    pub fn from_buffer(buffer: Buffer, format: MediaFormat, planes: &[Plane]) -> Result<Self> {
        format.validate()?;
        let required = format.required_len(planes)?;
        if required > buffer.len() {
            return Err(Error::InvalidArgument(format!(
                "{} needs {} bytes with the given planes, buffer has {}",
                format,
                required,
                buffer.len()
            )));
        }
        Ok(Self {
            buffer,
            format,
            planes: planes.iter().copied().collect(),
            roi: None,
        })
    }

    /// Wrap existing memory laid out canonically for `format`.
    pub fn with_canonical_layout(buffer: Buffer, format: MediaFormat) -> Result<Self> {
        let (planes, _) = format.canonical_layout()?;
        Self::from_buffer(buffer, format, &planes)
    }

    /// The format descriptor.
    #[inline]
    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    /// Video descriptor, if this is a video frame.
    #[inline]
    pub fn video_format(&self) -> Option<&VideoFormat> {
        self.format.as_video()
    }

    /// Frame width (0 for audio).
    pub fn width(&self) -> u32 {
        self.video_format().map_or(0, |v| v.width)
    }

    /// Frame height (0 for audio).
    pub fn height(&self) -> u32 {
        self.video_format().map_or(0, |v| v.height)
    }

    /// Plane descriptors, one per plane of the format.
    #[inline]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Number of planes.
    #[inline]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// The underlying buffer.
    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Region-of-interest marker, if this sample is a view.
    pub fn roi_info(&self) -> Option<&RoiInfo> {
        self.roi.as_ref()
    }

    /// Another handle to the same storage. O(1).
    #[inline]
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Ownership mode of the underlying storage.
    pub fn ownership(&self) -> Ownership {
        self.buffer.ownership()
    }

    /// Bytes spanned by plane `index`, from its first to its last row.
    fn plane_extent(&self, index: usize) -> Option<(usize, usize)> {
        let plane = self.planes.get(index)?;
        let rows = self.format.plane_rows(index);
        let len = plane.stride * rows.saturating_sub(1) + self.format.row_bytes(index);
        Some((plane.offset, len))
    }

    /// Bytes of plane `index`, first row to end of last row.
    pub fn plane_data(&self, index: usize) -> Option<&[u8]> {
        let (offset, len) = self.plane_extent(index)?;
        self.buffer.as_bytes().get(offset..offset + len)
    }

    /// Mutable bytes of plane `index`; `None` if storage is shared or read-only.
    pub fn plane_data_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let (offset, len) = self.plane_extent(index)?;
        self.buffer.as_mut_bytes()?.get_mut(offset..offset + len)
    }

    /// Meaningful bytes of row `y` of plane `plane`.
    pub fn row(&self, plane: usize, y: usize) -> Option<&[u8]> {
        if y >= self.format.plane_rows(plane) {
            return None;
        }
        let start = self.planes.get(plane)?.offset + y * self.planes[plane].stride;
        self.buffer
            .as_bytes()
            .get(start..start + self.format.row_bytes(plane))
    }

    /// Mutable row access; `None` if out of range or not writable.
    pub fn row_mut(&mut self, plane: usize, y: usize) -> Option<&mut [u8]> {
        if y >= self.format.plane_rows(plane) {
            return None;
        }
        let start = self.planes.get(plane)?.offset + y * self.planes[plane].stride;
        let len = self.format.row_bytes(plane);
        self.buffer.as_mut_bytes()?.get_mut(start..start + len)
    }

    /// The whole buffer, mutably.
    ///
    /// Fails with [`Error::InvalidArgument`] if the storage is shared with
    /// another holder or read-only.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let ownership = self.buffer.ownership();
        self.buffer.as_mut_bytes().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "sample storage is not writable ({:?}, {:?})",
                ownership,
                self.format
            ))
        })
    }

    /// A view of `rect` that shares this sample's storage.
    ///
    /// The rectangle must be non-empty, lie inside this sample and start on
    /// a whole chroma unit for subsampled formats. Audio has no ROI.
    pub fn roi(&self, rect: PixelRect) -> Result<Sample> {
        let video = self.video_format().ok_or_else(|| {
            Error::UnsupportedFormat("region of interest on an audio sample".into())
        })?;
        if rect.is_empty() {
            return Err(Error::InvalidArgument(format!("empty ROI {}", rect)));
        }
        if !rect.fits_within(video.width, video.height) {
            return Err(Error::InvalidArgument(format!(
                "ROI {} outside {}x{} frame",
                rect, video.width, video.height
            )));
        }
        let (align_x, align_y) = video.pixel.origin_alignment();
        if rect.x % align_x != 0 || rect.y % align_y != 0 {
            return Err(Error::InvalidArgument(format!(
                "ROI origin {},{} must be a multiple of {}x{} for {}",
                rect.x, rect.y, align_x, align_y, video.pixel
            )));
        }

        let mut planes = self.planes.clone();
        for (index, plane) in planes.iter_mut().enumerate() {
            let Some(info) = video.pixel.plane_info(index) else {
                continue;
            };
            plane.offset += (rect.y as usize / info.unit_height) * plane.stride
                + (rect.x as usize / info.unit_width) * info.unit_bytes;
        }

        Ok(Sample {
            buffer: self.buffer.dup(),
            format: MediaFormat::Video(video.with_size(rect.width, rect.height)),
            planes,
            roi: Some(RoiInfo {
                rect,
                parent_width: video.width,
                parent_height: video.height,
            }),
        })
    }

    /// Copy into fresh owned storage with the default CPU converter.
    pub fn deep_copy(&self) -> Result<Sample> {
        self.deep_copy_with(&CpuConverter::default())
    }

    /// Copy into fresh owned storage.
    ///
    /// Planar formats keep their format; packed video is normalized to I420.
    pub fn deep_copy_with(&self, converter: &dyn PixelConverter) -> Result<Sample> {
        match self.format {
            MediaFormat::Video(v) if v.pixel.is_packed() => {
                self.convert(PixelFormat::I420, converter)
            }
            _ => {
                let mut copy = Sample::new(self.format)?;
                copy_planes(self, &mut copy)?;
                Ok(copy)
            }
        }
    }

    /// Convert into a newly allocated frame of pixel format `target`.
    pub fn convert(&self, target: PixelFormat, converter: &dyn PixelConverter) -> Result<Sample> {
        let video = self.video_format().ok_or_else(|| {
            Error::UnsupportedFormat("pixel conversion of an audio sample".into())
        })?;
        let mut out = Sample::new_video(target, video.width, video.height)?;
        converter.convert(self, &mut out)?;
        Ok(out)
    }
}

/// Copy every row of every plane between two samples of equal format.
pub fn copy_planes(src: &Sample, dst: &mut Sample) -> Result<()> {
    if src.format() != dst.format() {
        return Err(Error::InvalidArgument(format!(
            "plane copy needs equal formats, got {} and {}",
            src.format(),
            dst.format()
        )));
    }
    dst.data_mut()?;
    for plane in 0..src.plane_count() {
        for y in 0..src.format().plane_rows(plane) {
            if let (Some(from), Some(to)) = (src.row(plane, y), dst.row_mut(plane, y)) {
                to.copy_from_slice(from);
            }
        }
    }
    Ok(())
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("format", &self.format)
            .field("planes", &self.planes.as_slice())
            .field("roi", &self.roi)
            .field("buffer", &self.buffer)
            .finish()
    }
}
