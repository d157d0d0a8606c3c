//! Leafview Cache Library
//!
//! Decoded page cache per document, plus the memory and disk tiers of the
//! thumbnail cache, with their configuration and memory budget.

pub mod config;
pub mod disk;
pub mod memory;
pub mod memory_budget;
pub mod page;

pub use config::{CacheConfig, ConfigError};
pub use disk::{CleanupReport, ThumbnailDiskStore, DEFAULT_RETENTION};
pub use memory::{MemoryTierStats, ThumbnailMemoryCache};
pub use memory_budget::{MemoryBudget, SystemMemory};
pub use page::{CachedPage, PageCache, PageCacheStats, DEFAULT_PAGE_SLOTS};

/// Errors raised by the persistent thumbnail tier
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Render(#[from] leafview_render::RenderError),
}
