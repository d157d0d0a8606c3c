//! Representative thumbnails for whole documents
//!
//! Lookups go memory tier, then disk tier, then generation from the document
//! itself. A memory hit is answered immediately; anything slower runs as a
//! background job on the worker pool and its outcome is published as a
//! [`ThumbnailEvent`]. Failures never propagate: the caller just sees `None`.

use crate::error::{DocumentOpenError, PageDecodeError};
use crate::handle::DocumentHandle;
use crate::locator::DocumentLocator;
use crate::source::SourceOptions;
use crossbeam_channel::{Receiver, Sender};
use leafview_cache::{
    CacheConfig, CacheError, CleanupReport, MemoryBudget, MemoryTierStats, ThumbnailDiskStore,
    ThumbnailMemoryCache,
};
use leafview_render::RasterImage;
use leafview_scheduler::{JobGroup, JobPriority, WorkerPool};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Outcome of a background thumbnail lookup
#[derive(Debug, Clone)]
pub struct ThumbnailEvent {
    pub locator: DocumentLocator,
    /// `None` when no thumbnail could be produced
    pub image: Option<RasterImage>,
}

/// Both tiers' view of one document's thumbnail
#[derive(Debug, Clone)]
pub struct ThumbnailRecord {
    pub key: String,
    pub disk_path: PathBuf,
    pub in_memory_image: Option<RasterImage>,
    /// Modification time of the persisted file, if there is one
    pub created_at: Option<SystemTime>,
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Open(#[from] DocumentOpenError),
    #[error(transparent)]
    Decode(#[from] PageDecodeError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Decode the representative page of a document at thumbnail size
///
/// The first sorted image entry of an archive, or the first page of a paged
/// document.
pub fn render_thumbnail(
    locator: &DocumentLocator,
    options: &SourceOptions,
) -> Result<RasterImage, ThumbnailError> {
    let opened = DocumentHandle::open(locator, options)?;
    let mut handle = opened.handle;
    let result = handle.decode(0, &opened.entries, options.thumbnail_side);
    handle.close();
    Ok(result?)
}

struct Shared {
    memory: ThumbnailMemoryCache,
    disk: ThumbnailDiskStore,
    options: SourceOptions,
    retention: Duration,
    in_flight: Mutex<HashSet<String>>,
    cleanup_started: AtomicBool,
    cleanup_scheduled: AtomicBool,
    events: Sender<ThumbnailEvent>,
}

impl Shared {
    fn load_blocking(&self, locator: &DocumentLocator) -> Option<RasterImage> {
        let key = locator.cache_key();
        if let Some(image) = self.memory.get(key) {
            return Some(image);
        }

        match self.disk.load(key) {
            Ok(Some(image)) => {
                self.memory.insert(key, image.clone());
                return Some(image);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(path = %locator, error = %err, "persisted thumbnail unreadable, regenerating");
            }
        }

        let started = Instant::now();
        let image = match render_thumbnail(locator, &self.options) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(path = %locator, error = %err, "thumbnail generation failed");
                return None;
            }
        };
        tracing::debug!(path = %locator, elapsed = ?started.elapsed(), "thumbnail generated");

        if let Err(err) = self.disk.store(key, &image) {
            tracing::warn!(path = %locator, error = %err, "failed to persist thumbnail");
        }
        self.memory.insert(key, image.clone());
        Some(image)
    }

    fn cleanup_once(&self) -> Option<CleanupReport> {
        if self.cleanup_started.swap(true, Ordering::AcqRel) {
            return None;
        }

        match self.disk.cleanup_older_than(self.retention) {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(dir = %self.disk.dir().display(), error = %err, "thumbnail cleanup failed");
                None
            }
        }
    }
}

/// Two-tier thumbnail cache with background generation
///
/// Create one per process and share it by `Arc`.
pub struct ThumbnailCache {
    shared: Arc<Shared>,
    pool: Arc<WorkerPool>,
    group: JobGroup,
    receiver: Receiver<ThumbnailEvent>,
}

impl ThumbnailCache {
    pub fn new(
        memory: ThumbnailMemoryCache,
        disk: ThumbnailDiskStore,
        pool: Arc<WorkerPool>,
        options: SourceOptions,
        retention: Duration,
    ) -> Self {
        let (events, receiver) = crossbeam_channel::unbounded();
        let group = pool.new_group();
        Self {
            shared: Arc::new(Shared {
                memory,
                disk,
                options,
                retention,
                in_flight: Mutex::new(HashSet::new()),
                cleanup_started: AtomicBool::new(false),
                cleanup_scheduled: AtomicBool::new(false),
                events,
            }),
            pool,
            group,
            receiver,
        }
    }

    /// Build both tiers from configuration
    pub fn from_config(config: &CacheConfig, pool: Arc<WorkerPool>) -> Result<Self, CacheError> {
        let budget = MemoryBudget::from_config(config);
        let memory = ThumbnailMemoryCache::new(budget.thumbnail_budget());
        let disk = ThumbnailDiskStore::new(&config.thumbnail_dir)?.with_jpeg_quality(config.jpeg_quality);

        tracing::info!(
            dir = %config.thumbnail_dir.display(),
            memory_budget = budget.thumbnail_budget(),
            retention_days = config.retention_days,
            "thumbnail cache ready"
        );
        Ok(Self::new(memory, disk, pool, SourceOptions::from_config(config), config.retention()))
    }

    /// Thumbnail for `locator` if it is already in memory
    ///
    /// Otherwise returns `None` and looks it up in the background; the result
    /// arrives on [`events`](Self::events). Concurrent requests for the same
    /// document share one lookup. The first call also starts the retention
    /// sweep of the disk tier.
    pub fn get_thumbnail(&self, locator: &DocumentLocator) -> Option<RasterImage> {
        self.schedule_cleanup();

        if let Some(image) = self.shared.memory.get(locator.cache_key()) {
            return Some(image);
        }

        let key = locator.cache_key().to_owned();
        if !self.shared.in_flight.lock().insert(key.clone()) {
            tracing::trace!(path = %locator, "thumbnail lookup already in flight");
            return None;
        }

        let shared = Arc::clone(&self.shared);
        let job_locator = locator.clone();
        let submitted = self.pool.submit(JobPriority::Thumbnail, self.group, move |token| {
            let image = if token.is_cancelled() { None } else { shared.load_blocking(&job_locator) };
            shared.in_flight.lock().remove(job_locator.cache_key());
            let _ = shared.events.send(ThumbnailEvent { locator: job_locator, image });
        });

        if submitted.is_none() {
            self.shared.in_flight.lock().remove(&key);
        }
        None
    }

    /// Memory, then disk, then generation, on the calling thread
    pub fn load_blocking(&self, locator: &DocumentLocator) -> Option<RasterImage> {
        self.shared.load_blocking(locator)
    }

    /// Receiver for background lookup outcomes
    pub fn events(&self) -> Receiver<ThumbnailEvent> {
        self.receiver.clone()
    }

    /// Delete persisted thumbnails past the retention window
    ///
    /// Runs at most once per cache; later calls return `None`.
    pub fn cleanup_once(&self) -> Option<CleanupReport> {
        self.shared.cleanup_once()
    }

    fn schedule_cleanup(&self) {
        if self.shared.cleanup_scheduled.swap(true, Ordering::AcqRel)
            || self.shared.cleanup_started.load(Ordering::Acquire)
        {
            return;
        }
        let shared = Arc::clone(&self.shared);
        self.pool.submit(JobPriority::Thumbnail, self.group, move |_| {
            shared.cleanup_once();
        });
    }

    /// Current state of both tiers for `locator`, without generating anything
    pub fn record(&self, locator: &DocumentLocator) -> ThumbnailRecord {
        let key = locator.cache_key();
        let disk_path = self.shared.disk.path_for(key);
        let created_at = fs::metadata(&disk_path).and_then(|metadata| metadata.modified()).ok();

        ThumbnailRecord {
            key: key.to_owned(),
            in_memory_image: self.shared.memory.get(key),
            disk_path,
            created_at,
        }
    }

    /// Evict the memory tier; persisted thumbnails stay
    pub fn clear_memory(&self) {
        self.shared.memory.clear();
    }

    pub fn memory_stats(&self) -> MemoryTierStats {
        self.shared.memory.stats()
    }

    pub fn disk(&self) -> &ThumbnailDiskStore {
        &self.shared.disk
    }
}

impl Drop for ThumbnailCache {
    fn drop(&mut self) {
        self.pool.cancel_group(self.group);
    }
}
