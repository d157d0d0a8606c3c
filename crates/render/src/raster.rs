//! Decoded raster images shared by every layer of the viewer
//!
//! A [`RasterImage`] is an immutable RGBA pixel buffer. Pixels live behind an
//! `Arc`, so handing the same page to the cache, the scheduler and a display
//! slot never copies pixel data and repeated cache hits stay bit-identical.

use image::RgbaImage;
use std::fmt;
use std::sync::Arc;

/// Bytes per pixel of the RGBA8 buffers used throughout the engine
pub const BYTES_PER_PIXEL: u64 = 4;

/// Decoded RGBA image with optional diagnostic caption
///
/// Images produced by a successful decode have no caption. Synthetic
/// placeholders (see [`crate::placeholder`]) carry a short caption that
/// explains why the real page could not be shown.
#[derive(Clone)]
pub struct RasterImage {
    /// Shared pixel buffer
    pixels: Arc<RgbaImage>,

    /// Caption for placeholder images
    caption: Option<Arc<str>>,
}

impl RasterImage {
    /// Wrap a decoded RGBA buffer
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
            caption: None,
        }
    }

    /// Wrap a buffer and mark it as a placeholder with the given caption
    pub fn with_caption(pixels: RgbaImage, caption: impl Into<String>) -> Self {
        let caption: String = caption.into();
        Self {
            pixels: Arc::new(pixels),
            caption: Some(Arc::from(caption)),
        }
    }

    /// Build an image from raw RGBA bytes
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, rgba).map(Self::new)
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Approximate decoded size in bytes (`width * height * 4`)
    pub fn byte_size(&self) -> u64 {
        self.width() as u64 * self.height() as u64 * BYTES_PER_PIXEL
    }

    /// Borrow the underlying pixel buffer
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Raw RGBA bytes in row-major order
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Diagnostic caption, present only on placeholder images
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    /// Whether this image is a synthetic placeholder
    pub fn is_placeholder(&self) -> bool {
        self.caption.is_some()
    }

    /// Whether this image has no pixels left to show
    ///
    /// Zero-sized buffers are what a released image looks like; caches refuse
    /// to store or return them.
    pub fn is_disposed(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Whether two images share the same pixel allocation
    pub fn ptr_eq(&self, other: &RasterImage) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("caption", &self.caption)
            .finish()
    }
}

impl PartialEq for RasterImage {
    fn eq(&self, other: &Self) -> bool {
        self.caption == other.caption
            && (self.ptr_eq(other) || *self.pixels == *other.pixels)
    }
}

impl Eq for RasterImage {}

impl From<RgbaImage> for RasterImage {
    fn from(pixels: RgbaImage) -> Self {
        Self::new(pixels)
    }
}

/// Fit `width x height` inside a square of side `max_side`
///
/// Aspect ratio is preserved, results are truncated toward zero and clamped to
/// at least one pixel per side. The scale factor may be above 1.0; callers that
/// only want to shrink should check [`needs_downscale`] first.
pub fn scaled_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    if width == 0 || height == 0 || max_side == 0 {
        return (width.max(1), height.max(1));
    }

    if width >= height {
        let short = (height as u64 * max_side as u64 / width as u64) as u32;
        (max_side, short.max(1))
    } else {
        let short = (width as u64 * max_side as u64 / height as u64) as u32;
        (short.max(1), max_side)
    }
}

/// Whether an image of the given size exceeds the bounding square
pub fn needs_downscale(width: u32, height: u32, max_side: u32) -> bool {
    width > max_side || height > max_side
}
