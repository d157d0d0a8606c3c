//! Leafview Core Library
//!
//! Lazy paginated rendering for image archives and paged documents.
//!
//! A [`PageSource`] opens one document (CBZ/ZIP, CBR/RAR or PDF), indexes its
//! pages and decodes them on demand through a small per-document cache. The
//! [`ThumbnailCache`] produces one representative image per document for
//! list and grid views, backed by memory and disk tiers.
//!
//! Pages are usually requested through a
//! [`RenderScheduler`](leafview_scheduler::RenderScheduler), for which
//! `PageSource` is a [`PageProvider`](leafview_scheduler::PageProvider).

pub mod error;
pub mod formats;
pub mod handle;
pub mod index;
pub mod locator;
pub mod source;
pub mod thumbnail;

#[cfg(test)]
mod test_fixtures;

pub use error::{DocumentOpenError, PageDecodeError, PageError, ResourceReleaseError};
pub use formats::ZipDecodeStrategy;
pub use handle::{DocumentHandle, OpenedDocument};
pub use index::{is_page_name, ArchiveIndex, PageEntry, PAGE_EXTENSIONS};
pub use locator::{DocumentLocator, FormatTag};
pub use source::{PageSource, SourceOptions};
pub use thumbnail::{
    render_thumbnail, ThumbnailCache, ThumbnailError, ThumbnailEvent, ThumbnailRecord,
};
