//! Leafview Render Library
//!
//! Raster images, placeholders and the decode/scale/encode primitives shared
//! by page sources and the thumbnail cache.

pub mod decode;
pub mod placeholder;
pub mod raster;

pub use decode::{
    decode_file, decode_page_bytes, downscale_to_fit, encode_jpeg, encode_png, RenderError,
    RenderResult, DEFAULT_JPEG_QUALITY, DEFAULT_PAGE_SIDE, DEFAULT_THUMBNAIL_SIDE,
};
pub use placeholder::{placeholder, placeholder_for, PlaceholderReason};
pub use raster::{needs_downscale, scaled_dimensions, RasterImage};
