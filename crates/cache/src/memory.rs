//! In-memory thumbnail tier with byte-budget LRU eviction
//!
//! Thumbnails are keyed by document cache key. Eviction is driven by the
//! decoded size of each image (`width * height * 4`), not by entry count.

use leafview_render::RasterImage;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;

/// Statistics about thumbnail memory usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryTierStats {
    /// Number of thumbnails currently held
    pub entry_count: usize,

    /// Total decoded bytes held
    pub memory_used: u64,

    /// Byte budget
    pub memory_limit: u64,

    pub hits: u64,
    pub misses: u64,

    /// Entries dropped to stay under the budget
    pub evictions: u64,
}

impl MemoryTierStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

struct TierState {
    /// Most recently used entries are at the front
    entries: LruCache<String, RasterImage>,
    memory_used: u64,
    memory_limit: u64,
    stats: MemoryTierStats,
}

impl TierState {
    fn new(memory_limit: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            memory_used: 0,
            memory_limit,
            stats: MemoryTierStats { memory_limit, ..Default::default() },
        }
    }

    fn evict_lru(&mut self) -> bool {
        match self.entries.pop_lru() {
            Some((key, image)) => {
                tracing::debug!(key = %key, bytes = image.byte_size(), "evicting thumbnail from memory");
                self.memory_used = self.memory_used.saturating_sub(image.byte_size());
                self.stats.evictions += 1;
                true
            }
            None => false,
        }
    }

    fn evict_to_fit(&mut self, incoming: u64) {
        while self.memory_used + incoming > self.memory_limit {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
        self.stats.memory_limit = self.memory_limit;
    }
}

/// Thread-safe thumbnail memory tier
///
/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct ThumbnailMemoryCache {
    state: Arc<Mutex<TierState>>,
}

impl ThumbnailMemoryCache {
    /// Create a tier holding at most `memory_limit` decoded bytes
    pub fn new(memory_limit: u64) -> Self {
        Self { state: Arc::new(Mutex::new(TierState::new(memory_limit))) }
    }

    /// Look up a thumbnail, promoting it to most recently used
    ///
    /// Disposed images are dropped and reported as a miss.
    pub fn get(&self, key: &str) -> Option<RasterImage> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(image) = state.entries.get(key) {
            if !image.is_disposed() {
                let image = image.clone();
                state.stats.hits += 1;
                return Some(image);
            }
        }

        if let Some(disposed) = state.entries.pop(key) {
            state.memory_used = state.memory_used.saturating_sub(disposed.byte_size());
            state.sync_stats();
        }
        state.stats.misses += 1;
        None
    }

    /// Insert a thumbnail, evicting least recently used entries as needed
    ///
    /// Returns `false` when the image was not stored: it is disposed or larger
    /// than the whole budget.
    pub fn insert(&self, key: impl Into<String>, image: RasterImage) -> bool {
        let size = image.byte_size();
        let mut state = self.state.lock();

        if image.is_disposed() || size > state.memory_limit {
            return false;
        }

        let key = key.into();
        if let Some(previous) = state.entries.pop(&key) {
            state.memory_used = state.memory_used.saturating_sub(previous.byte_size());
        }

        state.evict_to_fit(size);
        state.entries.put(key, image);
        state.memory_used += size;
        state.sync_stats();
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<RasterImage> {
        let mut state = self.state.lock();
        let image = state.entries.pop(key)?;
        state.memory_used = state.memory_used.saturating_sub(image.byte_size());
        state.sync_stats();
        Some(image)
    }

    /// Drop every thumbnail, keeping hit/miss counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.memory_used = 0;
        state.sync_stats();
    }

    /// Change the byte budget, evicting immediately if it shrank
    pub fn set_memory_limit(&self, memory_limit: u64) {
        let mut state = self.state.lock();
        state.memory_limit = memory_limit;
        state.evict_to_fit(0);
        state.sync_stats();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_used(&self) -> u64 {
        self.state.lock().memory_used
    }

    pub fn memory_limit(&self) -> u64 {
        self.state.lock().memory_limit
    }

    pub fn stats(&self) -> MemoryTierStats {
        self.state.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    /// 10x10 RGBA thumbnail, 400 bytes decoded
    fn thumb() -> RasterImage {
        RasterImage::new(RgbaImage::new(10, 10))
    }

    #[test]
    fn test_basic_insert_get() {
        let cache = ThumbnailMemoryCache::new(10_000);
        let image = thumb();

        assert!(cache.insert("/books/a.cbz", image.clone()));
        let cached = cache.get("/books/a.cbz").unwrap();
        assert!(cached.ptr_eq(&image));
        assert_eq!(cache.memory_used(), 400);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ThumbnailMemoryCache::new(10_000);
        assert!(cache.get("/books/missing.cbz").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_byte_budget_eviction() {
        // Room for exactly three 400-byte thumbnails
        let cache = ThumbnailMemoryCache::new(1_200);

        cache.insert("a", thumb());
        cache.insert("b", thumb());
        cache.insert("c", thumb());
        cache.insert("d", thumb());

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("a"));
        assert!(cache.memory_used() <= 1_200);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_ordering() {
        let cache = ThumbnailMemoryCache::new(1_200);

        cache.insert("a", thumb());
        cache.insert("b", thumb());
        cache.insert("c", thumb());

        // Touch "a" so "b" becomes least recently used
        cache.get("a");
        cache.insert("d", thumb());

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_oversized_image_rejected() {
        let cache = ThumbnailMemoryCache::new(100);
        assert!(!cache.insert("big", thumb()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disposed_image_rejected() {
        let cache = ThumbnailMemoryCache::new(10_000);
        let disposed = RasterImage::new(RgbaImage::new(0, 0));
        assert!(!cache.insert("gone", disposed));
        assert!(cache.get("gone").is_none());
    }

    #[test]
    fn test_replace_existing_key_accounts_bytes() {
        let cache = ThumbnailMemoryCache::new(10_000);
        cache.insert("a", thumb());
        cache.insert("a", RasterImage::new(RgbaImage::new(20, 10)));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_used(), 800);
    }

    #[test]
    fn test_clear_and_remove() {
        let cache = ThumbnailMemoryCache::new(10_000);
        cache.insert("a", thumb());
        cache.insert("b", thumb());

        assert!(cache.remove("a").is_some());
        assert_eq!(cache.memory_used(), 400);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_used(), 0);
    }

    #[test]
    fn test_set_memory_limit_evicts() {
        let cache = ThumbnailMemoryCache::new(2_000);
        for key in ["a", "b", "c", "d", "e"] {
            cache.insert(key, thumb());
        }

        cache.set_memory_limit(800);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("d"));
        assert!(cache.contains("e"));
    }

    #[test]
    fn test_budget_never_exceeded_under_churn() {
        let cache = ThumbnailMemoryCache::new(5_000);
        for i in 0..200u32 {
            let side = 5 + (i % 20);
            cache.insert(format!("doc-{i}"), RasterImage::new(RgbaImage::new(side, side)));
            assert!(cache.memory_used() <= 5_000);
        }
    }

    #[test]
    fn test_hit_rate() {
        let cache = ThumbnailMemoryCache::new(10_000);
        cache.insert("a", thumb());
        cache.get("a");
        cache.get("a");
        cache.get("b");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}
