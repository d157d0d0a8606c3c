//! Leafview Scheduler Library
//!
//! Worker pool with priority queue and cancellable jobs, plus the render
//! scheduler that binds display slots to pages.
//!
//! Jobs are organized by priority (visible page, read-ahead, thumbnails) and
//! executed in priority order with FIFO ordering within each priority level.
//!
//! # Example
//!
//! ```
//! use leafview_render::RasterImage;
//! use leafview_scheduler::{
//!     PageProvider, ProviderError, RenderScheduler, SlotId, WorkerPool, WorkerPoolConfig,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct BlankPages;
//!
//! impl PageProvider for BlankPages {
//!     fn page_count(&self) -> u32 {
//!         3
//!     }
//!
//!     fn page(&self, _index: u32) -> Result<RasterImage, ProviderError> {
//!         Ok(RasterImage::new(image::RgbaImage::new(8, 8)))
//!     }
//! }
//!
//! let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::new(1)));
//! let scheduler = RenderScheduler::new(Arc::new(BlankPages), pool);
//!
//! scheduler.request(SlotId(0), 1);
//! let delivery = scheduler.wait_for(SlotId(0), Duration::from_secs(5)).unwrap();
//! assert_eq!(delivery.index, 1);
//! ```

mod cancel;
mod priority;
mod render;
mod slot;
mod worker;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use priority::{Job, JobGroup, JobId, JobPriority, JobQueue, Task};
pub use render::{PageDelivery, PageProvider, ProviderError, RenderScheduler, DEFAULT_READ_AHEAD};
pub use slot::{SlotId, SlotTable};
pub use worker::{adaptive_worker_count, WorkerPool, WorkerPoolConfig};
