//! Renderer configuration.

use super::layout::Color;
use crate::defaults::{
    DEFAULT_BORDER_WIDTH, DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_REFRESH_INTERVAL,
    DEFAULT_STALE_AFTER,
};
use crate::error::{Error, Result};
use crate::format::{PixelFormat, VideoFormat};
use std::time::Duration;

/// Pixel formats a canvas can use.
pub const CANVAS_FORMATS: [PixelFormat; 3] = [PixelFormat::Bgra, PixelFormat::Rgba, PixelFormat::I420];

/// Renderer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Canvas pixel format, one of [`CANVAS_FORMATS`].
    pub format: PixelFormat,
    /// Time between ticks.
    pub refresh_interval: Duration,
    /// Background fill when no background image is set.
    pub background: Color,
    /// Inputs whose timestamp is further than this from the tick time are
    /// shown as "no signal".
    pub stale_after: Duration,
    /// Border thickness in pixels.
    pub border_width: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            format: PixelFormat::Bgra,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            background: Color::BLACK,
            stale_after: DEFAULT_STALE_AFTER,
            border_width: DEFAULT_BORDER_WIDTH,
        }
    }
}

impl RendererConfig {
    /// Set the canvas size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the canvas pixel format.
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the tick interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    /// Set the staleness threshold.
    pub fn with_stale_after(mut self, threshold: Duration) -> Self {
        self.stale_after = threshold;
        self
    }

    /// Set the border thickness.
    pub fn with_border_width(mut self, width: u32) -> Self {
        self.border_width = width;
        self
    }

    /// The canvas format.
    pub fn canvas_format(&self) -> VideoFormat {
        VideoFormat::new(self.format, self.width, self.height)
    }

    /// Check the settings.
    pub fn validate(&self) -> Result<()> {
        validate_canvas(&self.canvas_format())?;
        if self.refresh_interval.is_zero() {
            return Err(Error::Config("refresh_interval must be > 0".into()));
        }
        Ok(())
    }
}

pub(crate) fn validate_canvas(canvas: &VideoFormat) -> Result<()> {
    if !CANVAS_FORMATS.contains(&canvas.pixel) {
        return Err(Error::UnsupportedFormat(format!(
            "{} cannot be used as a canvas format",
            canvas.pixel
        )));
    }
    if canvas.width == 0 || canvas.height == 0 {
        return Err(Error::Config("canvas size must be non-zero".into()));
    }
    let (ax, ay) = canvas.pixel.origin_alignment();
    if canvas.width % ax != 0 || canvas.height % ay != 0 {
        return Err(Error::Config(format!(
            "{} canvas needs dimensions divisible by {}x{}, got {}x{}",
            canvas.pixel, ax, ay, canvas.width, canvas.height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.format, PixelFormat::Bgra);
        assert_eq!(config.refresh_interval, Duration::from_millis(40));
        assert_eq!(config.stale_after, Duration::from_secs(5));
        assert_eq!(config.border_width, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            RendererConfig::default().with_format(PixelFormat::Nv12).validate(),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(RendererConfig::default()
            .with_format(PixelFormat::I420)
            .with_size(641, 480)
            .validate()
            .is_err());
        assert!(RendererConfig::default()
            .with_refresh_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
