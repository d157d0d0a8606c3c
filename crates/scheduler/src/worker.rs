//! Decode worker pool for parallel job execution.
//!
//! A fixed set of threads pulls jobs from a shared priority queue. Idle
//! workers block on a condition variable until a job is queued or the pool
//! shuts down. The pool is created once by the application root and shared
//! by `Arc` between page scheduling and thumbnail extraction.

use crate::priority::{JobQueue, Task};
use crate::{CancellationRegistry, CancellationToken, JobGroup, JobId, JobPriority};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use sysinfo::System;

const GIB: u64 = 1024 * 1024 * 1024;

/// Worker count suited to the machine
///
/// Decoding is memory-heavy, so small machines get a single worker:
/// - 1 worker with at most 2 cores or at most 2 GiB of RAM
/// - 2 workers with at most 4 cores or at most 3 GiB of RAM
/// - 3 workers otherwise
pub fn adaptive_worker_count(cores: usize, total_memory_bytes: u64) -> usize {
    if cores <= 2 || total_memory_bytes <= 2 * GIB {
        1
    } else if cores <= 4 || total_memory_bytes <= 3 * GIB {
        2
    } else {
        3
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn (at least one).
    pub num_workers: usize,

    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::adaptive()
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers: num_workers.max(1), thread_name: "leafview-worker".to_string() }
    }

    /// Size the pool from the detected core count and total RAM.
    pub fn adaptive() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let mut system = System::new();
        system.refresh_memory();
        Self::new(adaptive_worker_count(cores, system.total_memory()))
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

struct Shared {
    queue: Mutex<JobQueue>,
    available: Condvar,
    shutdown: AtomicBool,
    registry: CancellationRegistry,
}

/// Worker pool executing prioritised, cancellable jobs.
///
/// # Example
///
/// ```
/// use leafview_scheduler::{JobPriority, WorkerPool, WorkerPoolConfig};
/// use std::sync::mpsc;
///
/// let pool = WorkerPool::new(WorkerPoolConfig::new(2));
/// let group = pool.new_group();
/// let (tx, rx) = mpsc::channel();
///
/// pool.submit(JobPriority::Visible, group, move |_token| {
///     tx.send(42).unwrap();
/// });
///
/// assert_eq!(rx.recv().unwrap(), 42);
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_group: AtomicU64,
}

impl WorkerPool {
    /// Create and start a new worker pool.
    pub fn new(config: WorkerPoolConfig) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(JobQueue::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            registry: CancellationRegistry::new(),
        });

        let num_workers = config.num_workers.max(1);
        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let shared = Arc::clone(&shared);
            let thread = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, id))
                .spawn(move || Self::run(shared))
                .expect("Failed to spawn worker thread");
            workers.push(thread);
        }

        tracing::debug!(workers = num_workers, "worker pool started");
        Self { shared, workers: Mutex::new(workers), next_group: AtomicU64::new(1) }
    }

    /// Allocate a group ID for a new submitter.
    pub fn new_group(&self) -> JobGroup {
        self.next_group.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue a task.
    ///
    /// Returns the job ID and its cancellation token, or `None` once the pool
    /// is shutting down.
    pub fn submit<F>(
        &self,
        priority: JobPriority,
        group: JobGroup,
        task: F,
    ) -> Option<(JobId, CancellationToken)>
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if self.is_shutting_down() {
            return None;
        }

        let job_id = queue.reserve_id();
        let token = self.shared.registry.register(job_id, group);
        queue.push(job_id, priority, group, token.clone(), Box::new(task) as Task);
        drop(queue);

        self.shared.available.notify_one();
        Some((job_id, token))
    }

    /// Cancel one job. A queued job is removed; a running one sees its token flip.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let removed = self.shared.queue.lock().remove_if(|job| job.id == job_id);
        let found = self.shared.registry.cancel(job_id);
        if !removed.is_empty() {
            self.shared.registry.unregister(job_id);
        }
        found || !removed.is_empty()
    }

    /// Cancel every queued and running job of `group`.
    ///
    /// Returns the number of queued jobs dropped.
    pub fn cancel_group(&self, group: JobGroup) -> usize {
        self.shared.registry.cancel_group(group);
        let removed = self.shared.queue.lock().remove_if(|job| job.group == group);
        for job in &removed {
            self.shared.registry.unregister(job.id);
        }
        removed.len()
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stop all workers and wait for them to exit.
    ///
    /// Running jobs finish; queued jobs are dropped. Idempotent.
    pub fn shutdown(&self) {
        let dropped = {
            let mut queue = self.shared.queue.lock();
            self.shared.shutdown.store(true, Ordering::Release);
            queue.remove_if(|_| true)
        };
        drop(dropped);
        self.shared.registry.cancel_all();
        self.shared.available.notify_all();

        let current = thread::current().id();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            // A worker may drop the last handle to the pool from inside a task
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!("worker thread panicked during shutdown");
            }
        }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let job = {
                let mut queue = shared.queue.lock();
                loop {
                    if shared.shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(job) = queue.pop() {
                        break job;
                    }
                    shared.available.wait(&mut queue);
                }
            };

            let job_id = job.id;
            let priority = job.priority;
            if panic::catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
                tracing::error!(job_id, ?priority, "job panicked");
            }
            shared.registry.unregister(job_id);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_adaptive_worker_count() {
        assert_eq!(adaptive_worker_count(2, 16 * GIB), 1);
        assert_eq!(adaptive_worker_count(8, 2 * GIB), 1);
        assert_eq!(adaptive_worker_count(4, 16 * GIB), 2);
        assert_eq!(adaptive_worker_count(8, 3 * GIB), 2);
        assert_eq!(adaptive_worker_count(8, 16 * GIB), 3);
    }

    #[test]
    fn test_worker_pool_config() {
        assert_eq!(WorkerPoolConfig::new(0).num_workers, 1);
        let adaptive = WorkerPoolConfig::adaptive();
        assert!((1..=3).contains(&adaptive.num_workers));
        assert_eq!(WorkerPoolConfig::new(2).with_thread_name("thumbs").thread_name, "thumbs");
    }

    #[test]
    fn test_worker_pool_executes_jobs() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(2));
        let group = pool.new_group();
        let (tx, rx) = unbounded();

        for i in 0..10 {
            let tx = tx.clone();
            pool.submit(JobPriority::Visible, group, move |_| {
                tx.send(i).unwrap();
            })
            .unwrap();
        }

        let mut seen: Vec<i32> =
            (0..10).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        pool.shutdown();
    }

    #[test]
    fn test_priority_order_on_single_worker() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1));
        let group = pool.new_group();
        let (gate_tx, gate_rx) = unbounded::<()>();
        let (tx, rx) = unbounded();

        // Block the only worker so the remaining jobs queue up
        pool.submit(JobPriority::Visible, group, move |_| {
            gate_rx.recv().unwrap();
        });

        for (priority, label) in [
            (JobPriority::Thumbnail, "thumb"),
            (JobPriority::ReadAhead, "ahead"),
            (JobPriority::Visible, "visible"),
        ] {
            let tx = tx.clone();
            pool.submit(priority, group, move |_| tx.send(label).unwrap());
        }

        gate_tx.send(()).unwrap();
        let order: Vec<_> =
            (0..3).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        assert_eq!(order, vec!["visible", "ahead", "thumb"]);
    }

    #[test]
    fn test_cancel_queued_job() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1));
        let group = pool.new_group();
        let (gate_tx, gate_rx) = unbounded::<()>();
        let runs = Arc::new(AtomicUsize::new(0));

        pool.submit(JobPriority::Visible, group, move |_| {
            gate_rx.recv().unwrap();
        });
        let counter = Arc::clone(&runs);
        let (job_id, token) = pool
            .submit(JobPriority::Visible, group, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(pool.cancel(job_id));
        assert!(token.is_cancelled());
        gate_tx.send(()).unwrap();
        pool.shutdown();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_group_leaves_other_groups() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1));
        let busy = pool.new_group();
        let doomed = pool.new_group();
        let kept = pool.new_group();
        let (gate_tx, gate_rx) = unbounded::<()>();
        let (tx, rx) = unbounded();

        pool.submit(JobPriority::Visible, busy, move |_| {
            gate_rx.recv().unwrap();
        });
        for group in [doomed, doomed, kept] {
            let tx = tx.clone();
            pool.submit(JobPriority::ReadAhead, group, move |_| tx.send(group).unwrap());
        }

        assert_eq!(pool.cancel_group(doomed), 2);
        assert_eq!(pool.pending(), 1);

        gate_tx.send(()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), kept);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1));
        let group = pool.new_group();
        let (tx, rx) = unbounded();

        pool.submit(JobPriority::Visible, group, |_| panic!("decoder exploded"));
        pool.submit(JobPriority::Visible, group, move |_| tx.send(()).unwrap());

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1));
        pool.shutdown();
        pool.shutdown();

        assert!(pool.is_shutting_down());
        assert!(pool.submit(JobPriority::Visible, 1, |_| {}).is_none());
        assert_eq!(pool.num_workers(), 0);
    }
}
