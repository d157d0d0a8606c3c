//! Document locators and format tags

use std::fmt;
use std::path::Path;

/// Container family of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    /// CBZ / ZIP image archive
    ZipArchive,
    /// CBR / RAR image archive
    ProprietaryArchive,
    /// PDF
    PagedDocument,
}

impl FormatTag {
    /// Format for a file extension, compared case-insensitively
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "cbz" | "zip" => Some(Self::ZipArchive),
            "cbr" | "rar" => Some(Self::ProprietaryArchive),
            "pdf" => Some(Self::PagedDocument),
            _ => None,
        }
    }

    /// Short lowercase name used in logs and CLI output
    pub fn name(self) -> &'static str {
        match self {
            Self::ZipArchive => "zip",
            Self::ProprietaryArchive => "rar",
            Self::PagedDocument => "pdf",
        }
    }

    /// Whether pages are image entries inside an archive
    pub fn is_archive(self) -> bool {
        !matches!(self, Self::PagedDocument)
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a document: a filesystem path plus its format
///
/// Immutable once a page source is opened for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentLocator {
    path: String,
    format: FormatTag,
}

impl DocumentLocator {
    pub fn new(path: impl Into<String>, format: FormatTag) -> Self {
        Self { path: path.into(), format }
    }

    /// Locator with the format derived from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        let format = FormatTag::from_extension(extension)?;
        Some(Self::new(path.to_string_lossy().into_owned(), format))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    /// Key under which the document's thumbnail is cached
    pub fn cache_key(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for DocumentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
