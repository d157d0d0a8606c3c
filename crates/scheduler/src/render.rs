//! Page render scheduling for display slots
//!
//! The caller binds slots to page indices as the reader navigates. Decodes run
//! on the shared [`WorkerPool`] and complete in any order; completions travel
//! back over a channel and [`RenderScheduler::poll`] hands over only those
//! whose generation still matches their slot. A slot rebound while its decode
//! was in flight therefore never shows the stale page.

use crate::slot::{SlotId, SlotTable};
use crate::{CancellationToken, JobGroup, JobPriority, WorkerPool};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use leafview_render::RasterImage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Error type returned by page providers
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Source of decoded pages for a scheduler
pub trait PageProvider: Send + Sync {
    /// Number of pages, fixed for the provider's lifetime
    fn page_count(&self) -> u32;

    /// Decode (or fetch from cache) the page at `index`
    fn page(&self, index: u32) -> Result<RasterImage, ProviderError>;
}

/// A decoded page ready for display in a slot
#[derive(Debug, Clone)]
pub struct PageDelivery {
    pub slot: SlotId,
    pub index: u32,
    pub generation: u64,
    pub image: RasterImage,
}

/// Default number of pages decoded ahead of the requested one
pub const DEFAULT_READ_AHEAD: u32 = 1;

pub struct RenderScheduler {
    provider: Arc<dyn PageProvider>,
    pool: Arc<WorkerPool>,
    group: JobGroup,
    slots: Arc<Mutex<SlotTable>>,
    sender: Sender<PageDelivery>,
    receiver: Receiver<PageDelivery>,
    /// Current deliveries for other slots picked up by `wait_for`
    stash: Mutex<VecDeque<PageDelivery>>,
    cancelled: Arc<AtomicBool>,
    read_ahead: u32,
}

impl RenderScheduler {
    pub fn new(provider: Arc<dyn PageProvider>, pool: Arc<WorkerPool>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let group = pool.new_group();
        Self {
            provider,
            pool,
            group,
            slots: Arc::new(Mutex::new(SlotTable::new())),
            sender,
            receiver,
            stash: Mutex::new(VecDeque::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            read_ahead: DEFAULT_READ_AHEAD,
        }
    }

    /// Pages decoded after each requested page to warm the page cache
    pub fn with_read_ahead(mut self, pages: u32) -> Self {
        self.read_ahead = pages;
        self
    }

    pub fn page_count(&self) -> u32 {
        self.provider.page_count()
    }

    /// Bind `slot` to page `index` and schedule its decode
    ///
    /// Returns the slot's new generation, or `None` when the scheduler was
    /// cancelled or `index` is out of range (the slot is released in that case).
    pub fn request(&self, slot: SlotId, index: u32) -> Option<u64> {
        if self.is_cancelled() {
            return None;
        }

        let page_count = self.provider.page_count();
        if index >= page_count {
            tracing::debug!(?slot, index, page_count, "ignoring out-of-range page request");
            self.release(slot);
            return None;
        }

        let (generation, previous_job) = self.slots.lock().bind(slot, index);
        if let Some(job_id) = previous_job {
            self.pool.cancel(job_id);
        }

        let provider = Arc::clone(&self.provider);
        let slots = Arc::clone(&self.slots);
        let sender = self.sender.clone();
        let receiver = self.receiver.clone();
        let cancelled = Arc::clone(&self.cancelled);
        let submitted = self.pool.submit(JobPriority::Visible, self.group, move |token| {
            if is_stopped(token, &cancelled) || !slots.lock().is_current(slot, generation) {
                tracing::trace!(?slot, index, generation, "skipping stale page decode");
                return;
            }

            let started = Instant::now();
            match provider.page(index) {
                Ok(image) => {
                    tracing::debug!(?slot, index, elapsed = ?started.elapsed(), "page decoded");
                    deliver(&sender, &receiver, &cancelled, PageDelivery { slot, index, generation, image });
                }
                Err(err) => {
                    tracing::warn!(?slot, index, error = %err, "page decode failed");
                }
            }
        });

        if let Some((job_id, _)) = submitted {
            self.slots.lock().set_job(slot, generation, job_id);
        }

        self.schedule_read_ahead(index, page_count);
        Some(generation)
    }

    fn schedule_read_ahead(&self, index: u32, page_count: u32) {
        let last = index.saturating_add(self.read_ahead).min(page_count.saturating_sub(1));
        for ahead in index.saturating_add(1)..=last {
            let provider = Arc::clone(&self.provider);
            let cancelled = Arc::clone(&self.cancelled);
            self.pool.submit(JobPriority::ReadAhead, self.group, move |token| {
                if is_stopped(token, &cancelled) {
                    return;
                }
                if let Err(err) = provider.page(ahead) {
                    tracing::debug!(index = ahead, error = %err, "read-ahead decode failed");
                }
            });
        }
    }

    /// Deliveries that are still current for their slots
    ///
    /// Call from the thread that owns the views. Stale completions are dropped.
    pub fn poll(&self) -> Vec<PageDelivery> {
        let mut pending: Vec<PageDelivery> = self.stash.lock().drain(..).collect();
        pending.extend(self.receiver.try_iter());

        if self.is_cancelled() {
            return Vec::new();
        }
        pending.into_iter().filter(|delivery| self.accept(delivery)).collect()
    }

    /// Block until a current delivery for `slot` arrives or `timeout` passes
    ///
    /// Current deliveries for other slots are kept for the next [`poll`](Self::poll).
    pub fn wait_for(&self, slot: SlotId, timeout: Duration) -> Option<PageDelivery> {
        let deadline = Instant::now() + timeout;

        {
            let mut stash = self.stash.lock();
            if let Some(position) = stash.iter().position(|delivery| delivery.slot == slot) {
                if let Some(delivery) = stash.remove(position) {
                    if self.accept(&delivery) {
                        return Some(delivery);
                    }
                }
            }
        }

        loop {
            if self.is_cancelled() {
                return None;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(delivery) => {
                    if !self.is_current(&delivery) {
                        continue;
                    }
                    if delivery.slot == slot {
                        self.accept(&delivery);
                        return Some(delivery);
                    }
                    self.stash.lock().push_back(delivery);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    /// Unbind a recycled slot; anything in flight for it is discarded
    pub fn release(&self, slot: SlotId) {
        let job = self.slots.lock().release(slot);
        if let Some(job_id) = job {
            self.pool.cancel(job_id);
        }
    }

    /// Page index `slot` is currently bound to
    pub fn current_index(&self, slot: SlotId) -> Option<u32> {
        self.slots.lock().index(slot)
    }

    /// Stop all work for this scheduler. Idempotent.
    ///
    /// Queued jobs are dropped, running decodes finish but are never
    /// delivered, undelivered images are released and later requests are
    /// ignored.
    pub fn cancel_all(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let dropped = self.pool.cancel_group(self.group);
        self.slots.lock().release_all();
        self.stash.lock().clear();
        let undelivered = self.receiver.try_iter().count();
        tracing::debug!(dropped, undelivered, "render scheduler cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn is_current(&self, delivery: &PageDelivery) -> bool {
        self.slots.lock().is_current(delivery.slot, delivery.generation)
    }

    fn accept(&self, delivery: &PageDelivery) -> bool {
        let mut slots = self.slots.lock();
        if !slots.is_current(delivery.slot, delivery.generation) {
            return false;
        }
        slots.complete(delivery.slot, delivery.generation);
        true
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn is_stopped(token: &CancellationToken, cancelled: &AtomicBool) -> bool {
    token.is_cancelled() || cancelled.load(Ordering::Acquire)
}

/// Send a finished page unless the scheduler was cancelled meanwhile
///
/// `cancel_all` sets the flag before draining the channel, so a send that
/// races past the drain sees the flag afterwards and drains again.
fn deliver(
    sender: &Sender<PageDelivery>,
    receiver: &Receiver<PageDelivery>,
    cancelled: &AtomicBool,
    delivery: PageDelivery,
) {
    if cancelled.load(Ordering::Acquire) {
        return;
    }
    let _ = sender.send(delivery);
    if cancelled.load(Ordering::Acquire) {
        receiver.try_iter().for_each(drop);
    }
}
