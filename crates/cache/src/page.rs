//! Per-document decoded page cache
//!
//! A small, slot-bounded strict LRU. Each open document owns one; with the
//! default five slots the current page and its neighbours stay decoded while
//! the reader pages back and forth.

use leafview_render::RasterImage;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Default number of decoded pages kept per document
pub const DEFAULT_PAGE_SLOTS: usize = 5;

/// A decoded page held by a [`PageCache`]
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub index: u32,
    pub image: RasterImage,
    pub approx_size_bytes: u64,
}

impl CachedPage {
    pub fn new(index: u32, image: RasterImage) -> Self {
        let approx_size_bytes = image.byte_size();
        Self { index, image, approx_size_bytes }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCacheStats {
    pub len: usize,
    pub capacity: usize,
    pub approx_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl PageCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct PageCacheState {
    pages: LruCache<u32, CachedPage>,
    approx_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe slot-bounded LRU of decoded pages
pub struct PageCache {
    state: Mutex<PageCacheState>,
}

impl PageCache {
    /// Create a cache with `slots` entries (at least one)
    pub fn new(slots: usize) -> Self {
        let capacity = NonZeroUsize::new(slots.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(PageCacheState {
                pages: LruCache::new(capacity),
                approx_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Look up a page, promoting it to most recently used
    pub fn get(&self, index: u32) -> Option<RasterImage> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.pages.get(&index) {
            Some(page) if !page.image.is_disposed() => {
                let image = page.image.clone();
                state.hits += 1;
                Some(image)
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    /// Insert a decoded page
    ///
    /// At capacity the least recently used page is evicted before the new one
    /// goes in; its index is returned. Disposed images are ignored.
    pub fn put(&self, index: u32, image: RasterImage) -> Option<u32> {
        if image.is_disposed() {
            return None;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(previous) = state.pages.pop(&index) {
            state.approx_bytes = state.approx_bytes.saturating_sub(previous.approx_size_bytes);
        }

        let mut evicted = None;
        if state.pages.len() >= state.pages.cap().get() {
            if let Some((old_index, old_page)) = state.pages.pop_lru() {
                state.approx_bytes = state.approx_bytes.saturating_sub(old_page.approx_size_bytes);
                state.evictions += 1;
                tracing::debug!(evicted = old_index, inserted = index, "page cache eviction");
                evicted = Some(old_index);
            }
        }

        let page = CachedPage::new(index, image);
        state.approx_bytes += page.approx_size_bytes;
        state.pages.put(index, page);
        evicted
    }

    pub fn contains(&self, index: u32) -> bool {
        self.state.lock().pages.contains(&index)
    }

    pub fn remove(&self, index: u32) -> Option<CachedPage> {
        let mut state = self.state.lock();
        let page = state.pages.pop(&index)?;
        state.approx_bytes = state.approx_bytes.saturating_sub(page.approx_size_bytes);
        Some(page)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pages.clear();
        state.approx_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().pages.cap().get()
    }

    /// Cached indices from most to least recently used
    pub fn indices(&self) -> Vec<u32> {
        self.state.lock().pages.iter().map(|(index, _)| *index).collect()
    }

    pub fn stats(&self) -> PageCacheStats {
        let state = self.state.lock();
        PageCacheStats {
            len: state.pages.len(),
            capacity: state.pages.cap().get(),
            approx_bytes: state.approx_bytes,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SLOTS)
    }
}
