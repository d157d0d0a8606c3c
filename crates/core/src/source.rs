//! Lazy page access for one open document
//!
//! A [`PageSource`] hides the container format behind a page index. Pages are
//! decoded on demand under a per-document lock and kept in a small LRU cache;
//! a page that fails to decode comes back as a captioned placeholder instead
//! of an error, so the viewer always has something to show.

use crate::error::{DocumentOpenError, PageError};
use crate::formats::ZipDecodeStrategy;
use crate::handle::DocumentHandle;
use crate::index::PageEntry;
use crate::locator::{DocumentLocator, FormatTag};
use leafview_cache::{CacheConfig, PageCache, PageCacheStats, DEFAULT_PAGE_SLOTS};
use leafview_pdf_engine::{default_engine, PagedEngine};
use leafview_render::{placeholder_for, RasterImage, DEFAULT_PAGE_SIDE, DEFAULT_THUMBNAIL_SIDE};
use leafview_scheduler::{PageProvider, ProviderError, RenderScheduler, WorkerPool, DEFAULT_READ_AHEAD};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Settings shared by page sources and thumbnail generation
#[derive(Clone)]
pub struct SourceOptions {
    /// Renderer used for paged documents
    pub paged_engine: Arc<dyn PagedEngine>,
    pub page_cache_slots: usize,
    /// Bounding square for decoded pages
    pub max_page_side: u32,
    /// Bounding square for thumbnails
    pub thumbnail_side: u32,
    pub zip_strategy: ZipDecodeStrategy,
    /// Where private copies of RAR archives are made
    pub temp_dir: PathBuf,
    /// Pages a scheduler built by [`PageSource::scheduler`] decodes ahead
    pub read_ahead: u32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            paged_engine: default_engine(),
            page_cache_slots: DEFAULT_PAGE_SLOTS,
            max_page_side: DEFAULT_PAGE_SIDE,
            thumbnail_side: DEFAULT_THUMBNAIL_SIDE,
            zip_strategy: ZipDecodeStrategy::default(),
            temp_dir: std::env::temp_dir(),
            read_ahead: DEFAULT_READ_AHEAD,
        }
    }
}

impl SourceOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            page_cache_slots: config.page_cache_slots,
            max_page_side: config.max_page_side,
            thumbnail_side: config.thumbnail_side,
            read_ahead: config.read_ahead,
            ..Self::default()
        }
    }

    pub fn with_paged_engine(mut self, engine: Arc<dyn PagedEngine>) -> Self {
        self.paged_engine = engine;
        self
    }

    pub fn with_page_cache_slots(mut self, slots: usize) -> Self {
        self.page_cache_slots = slots.max(1);
        self
    }

    pub fn with_max_page_side(mut self, side: u32) -> Self {
        self.max_page_side = side;
        self
    }

    pub fn with_thumbnail_side(mut self, side: u32) -> Self {
        self.thumbnail_side = side;
        self
    }

    pub fn with_zip_strategy(mut self, strategy: ZipDecodeStrategy) -> Self {
        self.zip_strategy = strategy;
        self
    }

    pub fn with_temp_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.temp_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_read_ahead(mut self, pages: u32) -> Self {
        self.read_ahead = pages;
        self
    }
}

impl fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceOptions")
            .field("paged_engine", &self.paged_engine.name())
            .field("page_cache_slots", &self.page_cache_slots)
            .field("max_page_side", &self.max_page_side)
            .field("thumbnail_side", &self.thumbnail_side)
            .field("zip_strategy", &self.zip_strategy)
            .field("temp_dir", &self.temp_dir)
            .field("read_ahead", &self.read_ahead)
            .finish()
    }
}

/// Page access for one open document
pub struct PageSource {
    locator: DocumentLocator,
    entries: Arc<[PageEntry]>,
    page_count: u32,
    max_page_side: u32,
    read_ahead: u32,
    cache: PageCache,
    handle: Mutex<Option<DocumentHandle>>,
    closed: AtomicBool,
}

impl PageSource {
    /// Open `locator`, indexing its pages
    pub fn open(locator: DocumentLocator, options: &SourceOptions) -> Result<Self, DocumentOpenError> {
        let started = Instant::now();
        let opened = DocumentHandle::open(&locator, options)?;

        tracing::info!(
            path = %locator,
            format = %locator.format(),
            page_count = opened.page_count,
            elapsed = ?started.elapsed(),
            "document opened"
        );

        Ok(Self {
            locator,
            entries: opened.entries,
            page_count: opened.page_count,
            max_page_side: options.max_page_side,
            read_ahead: options.read_ahead,
            cache: PageCache::new(options.page_cache_slots),
            handle: Mutex::new(Some(opened.handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Open a file, deriving its format from the extension
    pub fn open_path(path: &Path, options: &SourceOptions) -> Result<Self, DocumentOpenError> {
        let locator = DocumentLocator::from_path(path)
            .ok_or_else(|| DocumentOpenError::UnsupportedFormat(path.display().to_string()))?;
        Self::open(locator, options)
    }

    pub fn locator(&self) -> &DocumentLocator {
        &self.locator
    }

    pub fn format(&self) -> FormatTag {
        self.locator.format()
    }

    /// Number of pages, fixed at open
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Scheduler over this source, reading ahead as configured at open
    pub fn scheduler(self: &Arc<Self>, pool: Arc<WorkerPool>) -> RenderScheduler {
        let provider: Arc<dyn PageProvider> = self.clone();
        RenderScheduler::new(provider, pool).with_read_ahead(self.read_ahead)
    }

    /// Archive entries in page order; empty for paged documents
    pub fn entries(&self) -> Arc<[PageEntry]> {
        Arc::clone(&self.entries)
    }

    /// Page `index`, from cache or freshly decoded
    ///
    /// In-range pages always yield an image. A page that fails to decode is
    /// returned as an uncached placeholder so a later request retries it.
    pub fn get_page(&self, index: u32) -> Result<RasterImage, PageError> {
        if self.is_closed() {
            return Err(PageError::Closed);
        }
        if index >= self.page_count {
            return Err(PageError::OutOfRange { index, count: self.page_count });
        }

        if let Some(image) = self.cache.get(index) {
            tracing::debug!(path = %self.locator, index, "page cache hit");
            return Ok(image);
        }

        let mut guard = self.handle.lock();
        let Some(handle) = guard.as_mut() else {
            return Err(PageError::Closed);
        };

        // Another caller may have decoded the page while we waited for the lock
        if self.cache.contains(index) {
            if let Some(image) = self.cache.get(index) {
                return Ok(image);
            }
        }

        let started = Instant::now();
        match handle.decode(index, &self.entries, self.max_page_side) {
            Ok(image) => {
                tracing::debug!(
                    path = %self.locator,
                    index,
                    width = image.width(),
                    height = image.height(),
                    elapsed = ?started.elapsed(),
                    "page decoded"
                );
                self.cache.put(index, image.clone());
                Ok(image)
            }
            Err(err) => {
                let reason = err.placeholder_reason();
                tracing::warn!(path = %self.locator, index, error = %err, ?reason, "page decode failed");
                Ok(placeholder_for(reason, index))
            }
        }
    }

    /// Drop every cached page
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> PageCacheStats {
        self.cache.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the document and its cached pages. Idempotent.
    ///
    /// Waits for a decode in progress to finish.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);

        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            return;
        };

        handle.close();
        self.cache.clear();
        tracing::info!(path = %self.locator, "document closed");
    }
}

impl Drop for PageSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSource")
            .field("locator", &self.locator)
            .field("page_count", &self.page_count)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PageProvider for PageSource {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page(&self, index: u32) -> Result<RasterImage, ProviderError> {
        Ok(self.get_page(index)?)
    }
}
