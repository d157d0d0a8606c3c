//! Synthetic images shown in place of pages that could not be decoded

use crate::raster::RasterImage;
use image::{Rgba, RgbaImage};

/// Placeholder canvas width in pixels
pub const PLACEHOLDER_WIDTH: u32 = 800;

/// Placeholder canvas height in pixels
pub const PLACEHOLDER_HEIGHT: u32 = 1200;

/// Height of the caption band drawn across the vertical centre
pub const CAPTION_BAND_HEIGHT: u32 = 48;

const BACKGROUND: Rgba<u8> = Rgba([64, 64, 64, 255]);
const CAPTION_BAND: Rgba<u8> = Rgba([220, 38, 38, 255]);

/// Why a page is being replaced with a placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderReason {
    /// The decoder ran but produced nothing usable
    Corrupt,
    /// I/O or container error while extracting the page
    Failed,
    /// Entry was listed at open but not found when re-scanned
    Missing,
    /// Paged document reported a non-positive page size
    Invalid,
}

impl PlaceholderReason {
    /// Caption text for a zero-based page index
    ///
    /// Captions use one-based page numbers as shown to the reader.
    pub fn caption(self, index: u32) -> String {
        let label = match self {
            Self::Corrupt => "Corrupt",
            Self::Failed => "Failed",
            Self::Missing => "Missing",
            Self::Invalid => "Invalid",
        };
        format!("{label} page {}", index as u64 + 1)
    }
}

/// Build a placeholder image carrying `caption`
pub fn placeholder(caption: impl Into<String>) -> RasterImage {
    let mut canvas = RgbaImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, BACKGROUND);

    let band_top = (PLACEHOLDER_HEIGHT - CAPTION_BAND_HEIGHT) / 2;
    for y in band_top..band_top + CAPTION_BAND_HEIGHT {
        for x in 0..PLACEHOLDER_WIDTH {
            canvas.put_pixel(x, y, CAPTION_BAND);
        }
    }

    RasterImage::with_caption(canvas, caption)
}

/// Placeholder for page `index` failing for `reason`
pub fn placeholder_for(reason: PlaceholderReason, index: u32) -> RasterImage {
    placeholder(reason.caption(index))
}
