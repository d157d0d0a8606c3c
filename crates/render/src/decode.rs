//! Decoding, downscaling and encoding of page images
//!
//! Compressed page bytes are decoded with the `image` crate and shrunk to fit
//! a bounding square. Images already inside the bound are never upscaled.
//! Thumbnails are persisted as JPEG.

use crate::raster::{needs_downscale, scaled_dimensions, RasterImage};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Default bound for pages of paged documents
pub const DEFAULT_PAGE_SIDE: u32 = 1280;

/// Default bound for thumbnails
pub const DEFAULT_THUMBNAIL_SIDE: u32 = 400;

/// Default JPEG quality for persisted thumbnails
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Errors raised while decoding or encoding images
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decoded image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Decode compressed image bytes and shrink them to fit `max_side`
///
/// The format is sniffed from the content, so entry names do not need to match
/// the actual encoding.
pub fn decode_page_bytes(bytes: &[u8], max_side: u32) -> RenderResult<RasterImage> {
    let decoded = image::load_from_memory(bytes)?;
    let rgba = decoded.into_rgba8();
    ensure_not_empty(&rgba)?;
    Ok(RasterImage::new(downscale_to_fit(rgba, max_side)))
}

/// Shrink `image` to fit inside `max_side`, leaving smaller images untouched
pub fn downscale_to_fit(image: RgbaImage, max_side: u32) -> RgbaImage {
    if max_side == 0 || !needs_downscale(image.width(), image.height(), max_side) {
        return image;
    }

    let (width, height) = scaled_dimensions(image.width(), image.height(), max_side);
    imageops::resize(&image, width, height, FilterType::Triangle)
}

/// Encode an image as baseline JPEG
///
/// JPEG has no alpha channel, so pixels are flattened to RGB first.
pub fn encode_jpeg(image: &RasterImage, quality: u8) -> RenderResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image.pixels().clone()).into_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(buffer)
}

/// Encode an image as PNG
pub fn encode_png(image: &RasterImage) -> RenderResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.pixels().write_to(&mut cursor, image::ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Decode an image file from disk at its stored resolution
pub fn decode_file(path: &Path) -> RenderResult<RasterImage> {
    let bytes = std::fs::read(path)?;
    let rgba = image::load_from_memory(&bytes)?.into_rgba8();
    ensure_not_empty(&rgba)?;
    Ok(RasterImage::new(rgba))
}

fn ensure_not_empty(image: &RgbaImage) -> RenderResult<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(RenderError::Empty { width: image.width(), height: image.height() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 255]));
        let mut cursor = Cursor::new(Vec::new());
        image.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_decode_small_image_keeps_size() {
        let image = decode_page_bytes(&png_bytes(40, 60), DEFAULT_PAGE_SIDE).unwrap();
        assert_eq!((image.width(), image.height()), (40, 60));
        assert!(!image.is_placeholder());
    }

    #[test]
    fn test_decode_large_image_downscales() {
        let image = decode_page_bytes(&png_bytes(1000, 500), DEFAULT_THUMBNAIL_SIDE).unwrap();
        assert_eq!((image.width(), image.height()), (400, 200));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_page_bytes(b"definitely not an image", 400).unwrap_err();
        assert!(matches!(err, RenderError::Image(_)));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let bytes = png_bytes(900, 700);
        let first = decode_page_bytes(&bytes, 400).unwrap();
        let second = decode_page_bytes(&bytes, 400).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_jpeg_encode_and_decode_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("thumb.jpg");

        let image = decode_page_bytes(&png_bytes(120, 80), 400).unwrap();
        let jpeg = encode_jpeg(&image, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        std::fs::write(&path, &jpeg).unwrap();
        let loaded = decode_file(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (120, 80));
    }

    #[test]
    fn test_png_encode_has_signature() {
        let image = decode_page_bytes(&png_bytes(8, 8), 400).unwrap();
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_decode_missing_file_is_io_error() {
        let err = decode_file(Path::new("/nonexistent/leafview/thumb.jpg")).unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }
}
