//! Error types for opening documents and reading pages

use leafview_pdf_engine::PdfEngineError;
use leafview_render::{PlaceholderReason, RenderError};
use std::io;

/// Failure to open a document. Fatal to that page source.
#[derive(Debug, thiserror::Error)]
pub enum DocumentOpenError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("zip archive error: {0}")]
    Zip(#[from] ::zip::result::ZipError),
    #[error("rar archive error: {0}")]
    Rar(String),
    #[error("paged document error: {0}")]
    Paged(#[from] PdfEngineError),
    #[error("document contains no pages")]
    NoPages,
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

/// Caller contract violations when requesting pages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page {index} out of range (page_count={count})")]
    OutOfRange { index: u32, count: u32 },
    #[error("page source is closed")]
    Closed,
}

/// Failure to decode a single page
///
/// Never reaches the caller of `get_page`; it is turned into a placeholder.
#[derive(Debug, thiserror::Error)]
pub enum PageDecodeError {
    #[error("entry {0} not found in archive")]
    Missing(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("zip archive error: {0}")]
    Zip(#[from] ::zip::result::ZipError),
    #[error("rar archive error: {0}")]
    Rar(String),
    #[error("entry {name} declares {size} bytes, more than a page may hold")]
    TooLarge { name: String, size: u64 },
    #[error(transparent)]
    Image(#[from] RenderError),
    #[error(transparent)]
    Paged(#[from] PdfEngineError),
}

impl PageDecodeError {
    /// Placeholder shown in place of the page
    pub fn placeholder_reason(&self) -> PlaceholderReason {
        match self {
            Self::Missing(_) => PlaceholderReason::Missing,
            Self::Image(RenderError::Io(_)) => PlaceholderReason::Failed,
            Self::Image(_) | Self::TooLarge { .. } => PlaceholderReason::Corrupt,
            Self::Paged(PdfEngineError::InvalidPageSize { .. }) => PlaceholderReason::Invalid,
            Self::Io(_) | Self::Zip(_) | Self::Rar(_) | Self::Paged(_) => PlaceholderReason::Failed,
        }
    }
}

/// Failure while releasing a document's resources
///
/// Logged and swallowed; closing always completes.
#[derive(Debug, thiserror::Error)]
pub enum ResourceReleaseError {
    #[error("failed to delete temporary archive copy: {0}")]
    TempFile(#[from] io::Error),
}
