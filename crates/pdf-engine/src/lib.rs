use image::{Rgba, RgbaImage};
use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// US Letter, used when a page carries no readable MediaBox
const FALLBACK_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub fn is_valid(&self) -> bool {
        self.width_pt > 0.0 && self.height_pt > 0.0
    }

    /// Pixel size of this page fitted into a `max_side` square
    ///
    /// The longer side becomes exactly `max_side`, aspect ratio is preserved
    /// and both sides are at least one pixel.
    pub fn fit_to(&self, max_side: u32) -> (u32, u32) {
        let max_side = max_side.max(1);
        let (width, height) = (self.width_pt as f64, self.height_pt as f64);

        if width >= height {
            let short = (height * max_side as f64 / width) as u32;
            (max_side, short.clamp(1, max_side))
        } else {
            let short = (width * max_side as f64 / height) as u32;
            (short.clamp(1, max_side), max_side)
        }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl OpenSource {
    fn into_bytes(self) -> Result<Vec<u8>, PdfEngineError> {
        match self {
            OpenSource::Path(path) => Ok(fs::read(path)?),
            OpenSource::Bytes(bytes) => Ok(bytes),
        }
    }
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("document has no pages")]
    NoPages,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("page {page} has invalid size {width_pt}x{height_pt}")]
    InvalidPageSize { page: u32, width_pt: f32, height_pt: f32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Renderer for paged documents
///
/// Engines are shared between page sources and the thumbnail service, so
/// they must be usable from any worker thread.
pub trait PagedEngine: Send + Sync {
    fn name(&self) -> &'static str;
    fn open(&self, source: OpenSource) -> Result<Box<dyn PagedDocument>, PdfEngineError>;
}

/// One open paged document
///
/// Owned by exactly one caller; dropping it releases the document.
pub trait PagedDocument: Send {
    fn page_count(&self) -> u32;
    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError>;

    /// Render a page scaled to fit inside a `max_side` square
    fn render_page(&self, page_index: u32, max_side: u32) -> Result<RgbaImage, PdfEngineError>;
}

fn checked_size(sizes: &[PageSize], page_index: u32) -> Result<PageSize, PdfEngineError> {
    let size = sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
        page: page_index,
        page_count: sizes.len() as u32,
    })?;

    if !size.is_valid() {
        return Err(PdfEngineError::InvalidPageSize {
            page: page_index,
            width_pt: size.width_pt,
            height_pt: size.height_pt,
        });
    }

    Ok(size)
}

/// Pure-Rust backend: page geometry from lopdf, blank page raster
#[derive(Debug, Default)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or(FALLBACK_PAGE_SIZE);

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(sizes)
    }
}

impl PagedEngine for LopdfEngine {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn open(&self, source: OpenSource) -> Result<Box<dyn PagedDocument>, PdfEngineError> {
        let bytes = source.into_bytes()?;
        let page_sizes = Self::parse_sizes(&bytes)?;
        Ok(Box::new(LopdfDocument { page_sizes }))
    }
}

#[derive(Debug, Clone)]
struct LopdfDocument {
    page_sizes: Vec<PageSize>,
}

impl PagedDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        checked_size(&self.page_sizes, page_index)
    }

    fn render_page(&self, page_index: u32, max_side: u32) -> Result<RgbaImage, PdfEngineError> {
        let (width, height) = self.page_size(page_index)?.fit_to(max_side);

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// PDFium-backed renderer
    ///
    /// The bound library is leaked once per engine and lives for the rest of
    /// the process. Documents keep their bytes and are reloaded per render so
    /// no PDFium handle crosses threads.
    pub struct PdfiumEngine {
        pdfium: &'static Pdfium,
    }

    impl PdfiumEngine {
        pub fn from_system_library() -> Result<Self, PdfEngineError> {
            let bindings = Pdfium::bind_to_system_library().map_err(|err| {
                PdfEngineError::Backend(format!("failed to bind pdfium system library: {err}"))
            })?;

            Ok(Self { pdfium: Box::leak(Box::new(Pdfium::new(bindings))) })
        }
    }

    impl PagedEngine for PdfiumEngine {
        fn name(&self) -> &'static str {
            "pdfium"
        }

        fn open(&self, source: OpenSource) -> Result<Box<dyn PagedDocument>, PdfEngineError> {
            let bytes = source.into_bytes()?;
            let page_sizes = {
                let document = self
                    .pdfium
                    .load_pdf_from_byte_slice(&bytes, None)
                    .map_err(|err| PdfEngineError::Backend(err.to_string()))?;
                document
                    .pages()
                    .iter()
                    .map(|page| PageSize {
                        width_pt: page.width().value,
                        height_pt: page.height().value,
                    })
                    .collect::<Vec<_>>()
            };

            if page_sizes.is_empty() {
                return Err(PdfEngineError::NoPages);
            }

            Ok(Box::new(PdfiumDocument { pdfium: self.pdfium, bytes, page_sizes }))
        }
    }

    struct PdfiumDocument {
        pdfium: &'static Pdfium,
        bytes: Vec<u8>,
        page_sizes: Vec<PageSize>,
    }

    impl PagedDocument for PdfiumDocument {
        fn page_count(&self) -> u32 {
            self.page_sizes.len() as u32
        }

        fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
            checked_size(&self.page_sizes, page_index)
        }

        fn render_page(
            &self,
            page_index: u32,
            max_side: u32,
        ) -> Result<RgbaImage, PdfEngineError> {
            let (width, height) = self.page_size(page_index)?.fit_to(max_side);

            let document = self
                .pdfium
                .load_pdf_from_byte_slice(&self.bytes, None)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;
            let page = document
                .pages()
                .get(page_index as u16)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_target_height(height as i32);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

            let rendered_width = bitmap.width() as u32;
            let rendered_height = bitmap.height() as u32;
            RgbaImage::from_raw(rendered_width, rendered_height, bitmap.as_rgba_bytes().to_vec())
                .ok_or_else(|| {
                    PdfEngineError::Backend("bitmap size does not match dimensions".to_owned())
                })
        }
    }
}

/// Engine used when nothing else is configured: [`LopdfEngine`]
///
/// It reads page geometry only and draws each page as a blank bordered
/// canvas of the right size. Real page content needs the `pdfium` feature
/// and `pdfium_backend::PdfiumEngine`.
pub fn default_engine() -> Arc<dyn PagedEngine> {
    Arc::new(LopdfEngine::new())
}

/// Builders for small PDF documents used by tests across the workspace
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use lopdf::{dictionary, Document, Object, Stream};

    /// A PDF with one empty page per `(width, height)` MediaBox
    pub fn blank_pdf(page_sizes: &[(i64, i64)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::with_capacity(page_sizes.len());
        for &(width, height) in page_sizes {
            let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(height),
                ],
            });
            kids.push(page_id.into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_sizes.len() as i64,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("in-memory PDF should serialize");
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::blank_pdf;
    use super::*;

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let engine = LopdfEngine::new();
        let document = engine
            .open(OpenSource::Bytes(blank_pdf(&[(612, 792), (612, 792), (842, 595)])))
            .expect("open should succeed");

        assert_eq!(document.page_count(), 3);
    }

    #[test]
    fn render_fits_page_inside_bound() {
        let engine = LopdfEngine::new();
        let document =
            engine.open(OpenSource::Bytes(blank_pdf(&[(612, 792)]))).expect("open should succeed");

        let image = document.render_page(0, 1280).expect("page should render");

        assert_eq!(image.height(), 1280);
        assert_eq!(image.width(), 989);
    }

    #[test]
    fn landscape_page_is_bounded_by_width() {
        let engine = LopdfEngine::new();
        let document =
            engine.open(OpenSource::Bytes(blank_pdf(&[(842, 595)]))).expect("open should succeed");

        let image = document.render_page(0, 400).expect("page should render");

        assert_eq!(image.width(), 400);
        assert!(image.height() < 400);
    }

    #[test]
    fn default_engine_draws_blank_bordered_page() {
        let engine = default_engine();
        assert_eq!(engine.name(), "lopdf");

        let document = engine.open(OpenSource::Bytes(blank_pdf(&[(612, 792)]))).expect("open should succeed");
        let image = document.render_page(0, 100).expect("page should render");

        assert_eq!(*image.get_pixel(0, 0), Rgba([220, 220, 220, 255]));
        assert_eq!(*image.get_pixel(image.width() / 2, image.height() / 2), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn zero_width_page_is_invalid() {
        let engine = LopdfEngine::new();
        let document =
            engine.open(OpenSource::Bytes(blank_pdf(&[(0, 792)]))).expect("open should succeed");

        let err = document.render_page(0, 1280).expect_err("page should be invalid");
        assert!(matches!(err, PdfEngineError::InvalidPageSize { page: 0, .. }));
    }

    #[test]
    fn out_of_range_page_returns_error() {
        let engine = LopdfEngine::new();
        let document =
            engine.open(OpenSource::Bytes(blank_pdf(&[(612, 792)]))).expect("open should succeed");

        let err = document.render_page(1, 1280).expect_err("should fail for page 1");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 1, page_count: 1 }));
    }

    #[test]
    fn document_without_pages_is_rejected() {
        let engine = LopdfEngine::new();
        let err = engine.open(OpenSource::Bytes(blank_pdf(&[]))).err().expect("should fail");

        assert!(matches!(err, PdfEngineError::NoPages));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"not a pdf at all".to_vec()))
            .err()
            .expect("should fail");

        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn fit_to_keeps_one_pixel_minimum() {
        let size = PageSize { width_pt: 10_000.0, height_pt: 1.0 };
        assert_eq!(size.fit_to(400), (400, 1));
    }
}
