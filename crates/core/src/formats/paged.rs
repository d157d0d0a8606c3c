//! Paged documents (PDF)

use crate::error::{DocumentOpenError, PageDecodeError};
use leafview_pdf_engine::{OpenSource, PagedDocument, PagedEngine, PdfEngineError};
use leafview_render::RasterImage;
use std::path::Path;

/// Open paged document backing a page source
pub struct PagedHandle {
    document: Box<dyn PagedDocument>,
    engine: &'static str,
}

impl PagedHandle {
    pub(crate) fn open(engine: &dyn PagedEngine, path: &Path) -> Result<Self, DocumentOpenError> {
        let document = engine.open(OpenSource::from(path)).map_err(|err| match err {
            PdfEngineError::NoPages => DocumentOpenError::NoPages,
            err => DocumentOpenError::Paged(err),
        })?;

        if document.page_count() == 0 {
            return Err(DocumentOpenError::NoPages);
        }

        Ok(Self { document, engine: engine.name() })
    }

    pub fn page_count(&self) -> u32 {
        self.document.page_count()
    }

    /// Name of the renderer that opened the document
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    pub(crate) fn render(&self, index: u32, max_side: u32) -> Result<RasterImage, PageDecodeError> {
        let pixels = self.document.render_page(index, max_side)?;
        Ok(RasterImage::new(pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leafview_pdf_engine::test_support::blank_pdf;
    use leafview_pdf_engine::LopdfEngine;
    use tempfile::TempDir;

    #[test]
    fn test_render_fits_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, blank_pdf(&[(612, 792), (842, 595)])).unwrap();

        let handle = PagedHandle::open(&LopdfEngine::new(), &path).unwrap();
        assert_eq!(handle.page_count(), 2);
        assert_eq!(handle.engine(), "lopdf");

        let portrait = handle.render(0, 1280).unwrap();
        assert_eq!((portrait.width(), portrait.height()), (989, 1280));

        let landscape = handle.render(1, 400).unwrap();
        assert_eq!(landscape.width(), 400);
        assert!(landscape.height() < 400);
    }

    #[test]
    fn test_invalid_page_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, blank_pdf(&[(612, 792), (0, 792)])).unwrap();

        let handle = PagedHandle::open(&LopdfEngine::new(), &path).unwrap();
        let err = handle.render(1, 1280).unwrap_err();
        assert_eq!(err.placeholder_reason(), leafview_render::PlaceholderReason::Invalid);
    }

    #[test]
    fn test_no_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.pdf");
        std::fs::write(&path, blank_pdf(&[])).unwrap();

        assert!(matches!(
            PagedHandle::open(&LopdfEngine::new(), &path),
            Err(DocumentOpenError::NoPages)
        ));
    }

    #[test]
    fn test_unparseable_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.5 nothing else").unwrap();

        assert!(matches!(
            PagedHandle::open(&LopdfEngine::new(), &path),
            Err(DocumentOpenError::Paged(_))
        ));
    }
}
