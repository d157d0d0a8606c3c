//! Open document resources, one variant per format

use crate::error::{DocumentOpenError, PageDecodeError};
use crate::formats::{zip, PagedHandle, RarHandle, ZipHandle};
use crate::index::PageEntry;
use crate::locator::{DocumentLocator, FormatTag};
use crate::source::SourceOptions;
use leafview_render::{decode_page_bytes, RasterImage};
use std::path::PathBuf;
use std::sync::Arc;

/// Owner of a document's underlying resources
///
/// Released exactly once: by [`DocumentHandle::close`], or when dropped.
pub enum DocumentHandle {
    Zip(ZipHandle),
    Rar(RarHandle),
    Paged(PagedHandle),
}

/// A freshly opened document and its fixed page list
pub struct OpenedDocument {
    pub handle: DocumentHandle,
    /// Archive entries in page order; empty for paged documents
    pub entries: Arc<[PageEntry]>,
    pub page_count: u32,
}

impl DocumentHandle {
    /// Open the document named by `locator`
    ///
    /// Fails with [`DocumentOpenError::NoPages`] when nothing qualifies as a page.
    pub fn open(locator: &DocumentLocator, options: &SourceOptions) -> Result<OpenedDocument, DocumentOpenError> {
        let path = locator.as_path();

        let opened = match locator.format() {
            FormatTag::ZipArchive => {
                let index = zip::index_archive(path)?;
                OpenedDocument {
                    handle: Self::Zip(ZipHandle::new(PathBuf::from(path), options.zip_strategy)),
                    page_count: index.len(),
                    entries: index.entries(),
                }
            }
            FormatTag::ProprietaryArchive => {
                let (handle, index) = RarHandle::open(path, &options.temp_dir)?;
                OpenedDocument {
                    handle: Self::Rar(handle),
                    page_count: index.len(),
                    entries: index.entries(),
                }
            }
            FormatTag::PagedDocument => {
                let handle = PagedHandle::open(options.paged_engine.as_ref(), path)?;
                OpenedDocument {
                    page_count: handle.page_count(),
                    handle: Self::Paged(handle),
                    entries: Arc::from(Vec::new()),
                }
            }
        };

        if opened.page_count == 0 {
            return Err(DocumentOpenError::NoPages);
        }
        Ok(opened)
    }

    pub fn format(&self) -> FormatTag {
        match self {
            Self::Zip(_) => FormatTag::ZipArchive,
            Self::Rar(_) => FormatTag::ProprietaryArchive,
            Self::Paged(_) => FormatTag::PagedDocument,
        }
    }

    /// Decode page `index` to fit inside `max_side`
    ///
    /// `entries` must be the list produced when this handle was opened.
    pub fn decode(
        &mut self,
        index: u32,
        entries: &[PageEntry],
        max_side: u32,
    ) -> Result<RasterImage, PageDecodeError> {
        let bytes = match self {
            Self::Paged(handle) => return handle.render(index, max_side),
            Self::Zip(handle) => handle.read_entry(entry_name(entries, index)?)?,
            Self::Rar(handle) => handle.read_entry(entry_name(entries, index)?)?,
        };
        Ok(decode_page_bytes(&bytes, max_side)?)
    }

    /// Release the underlying resources
    ///
    /// Release failures are logged; closing always completes.
    pub fn close(self) {
        match self {
            Self::Rar(mut handle) => {
                if let Err(err) = handle.release() {
                    tracing::error!(error = %err, "failed to release rar archive copy");
                }
            }
            Self::Zip(_) | Self::Paged(_) => {}
        }
    }
}

fn entry_name(entries: &[PageEntry], index: u32) -> Result<&str, PageDecodeError> {
    entries
        .get(index as usize)
        .map(|entry| entry.name.as_str())
        .ok_or_else(|| PageDecodeError::Missing(format!("page {index}")))
}
