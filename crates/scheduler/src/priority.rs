//! Priority ordering for background jobs
//!
//! Jobs are executed in priority order, with higher priority jobs running first
//! and FIFO ordering within a priority level.

use crate::CancellationToken;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

/// Job priority levels
///
/// Higher numeric values have higher priority and are executed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Thumbnail extraction for list views (lowest priority)
    Thumbnail = 0,

    /// Pages next to the visible one, decoded to warm the page cache
    ReadAhead = 1,

    /// The page a slot is waiting to display
    Visible = 2,
}

/// Unique job identifier
pub type JobId = u64;

/// Identifies the submitter of a job so its queued work can be dropped together
pub type JobGroup = u64;

/// Work executed by a pool worker
pub type Task = Box<dyn FnOnce(&CancellationToken) + Send + 'static>;

/// A queued job with priority
///
/// Jobs are ordered by priority (higher priority first), then by insertion order
/// (earlier jobs first) to ensure FIFO ordering within the same priority level.
pub struct Job {
    pub id: JobId,
    pub priority: JobPriority,
    pub group: JobGroup,
    pub token: CancellationToken,
    task: Task,

    /// Insertion order (used for FIFO within same priority)
    insertion_order: u64,
}

impl Job {
    pub fn new(
        id: JobId,
        priority: JobPriority,
        group: JobGroup,
        token: CancellationToken,
        task: Task,
        insertion_order: u64,
    ) -> Self {
        Self { id, priority, group, token, task, insertion_order }
    }

    /// Run the task unless the job was cancelled while queued
    ///
    /// Returns `false` when the task was skipped.
    pub fn run(self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        (self.task)(&self.token);
        true
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .field("insertion_order", &self.insertion_order)
            .finish()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap, so earlier insertions must compare greater
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            other => other,
        }
    }
}

/// Priority queue of jobs
///
/// Not synchronised on its own; the worker pool guards it with its mutex.
#[derive(Debug, Default)]
pub struct JobQueue {
    heap: BinaryHeap<Job>,
    next_job_id: JobId,
    insertion_counter: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(), next_job_id: 1, insertion_counter: 0 }
    }

    /// Allocate the ID for the next job
    pub fn reserve_id(&mut self) -> JobId {
        let job_id = self.next_job_id.max(1);
        self.next_job_id = job_id + 1;
        job_id
    }

    /// Queue a task under an ID from [`JobQueue::reserve_id`]
    pub fn push(
        &mut self,
        job_id: JobId,
        priority: JobPriority,
        group: JobGroup,
        token: CancellationToken,
        task: Task,
    ) {
        let insertion_order = self.insertion_counter;
        self.insertion_counter += 1;

        self.heap.push(Job::new(job_id, priority, group, token, task, insertion_order));
    }

    /// Pop the highest priority job
    pub fn pop(&mut self) -> Option<Job> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Remove all jobs matching a predicate and hand them back
    ///
    /// Removed jobs are returned so the caller can drop them (and whatever
    /// their tasks captured) after releasing its lock.
    pub fn remove_if<F>(&mut self, mut predicate: F) -> Vec<Job>
    where
        F: FnMut(&Job) -> bool,
    {
        let (removed, remaining): (Vec<Job>, Vec<Job>) =
            std::mem::take(&mut self.heap).into_iter().partition(|job| predicate(job));
        self.heap = remaining.into_iter().collect();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn noop() -> Task {
        Box::new(|_| {})
    }

    fn push(queue: &mut JobQueue, priority: JobPriority) -> JobId {
        push_in(queue, priority, 0)
    }

    fn push_in(queue: &mut JobQueue, priority: JobPriority, group: JobGroup) -> JobId {
        let id = queue.reserve_id();
        queue.push(id, priority, group, CancellationToken::new(), noop());
        id
    }

    #[test]
    fn test_job_priority_ordering() {
        assert!(JobPriority::Visible > JobPriority::ReadAhead);
        assert!(JobPriority::ReadAhead > JobPriority::Thumbnail);
    }

    #[test]
    fn test_queue_basic() {
        let mut queue = JobQueue::new();
        assert!(queue.is_empty());

        let id = push(&mut queue, JobPriority::Visible);
        assert_eq!(queue.len(), 1);

        let job = queue.pop().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.priority, JobPriority::Visible);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_ordering() {
        let mut queue = JobQueue::new();

        push(&mut queue, JobPriority::Thumbnail);
        push(&mut queue, JobPriority::ReadAhead);
        push(&mut queue, JobPriority::Visible);

        assert_eq!(queue.pop().unwrap().priority, JobPriority::Visible);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::ReadAhead);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::Thumbnail);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_mixed_priority_fifo() {
        let mut queue = JobQueue::new();

        let id1 = push(&mut queue, JobPriority::Visible);
        let id2 = push(&mut queue, JobPriority::ReadAhead);
        let id3 = push(&mut queue, JobPriority::Visible);
        let id4 = push(&mut queue, JobPriority::ReadAhead);
        let id5 = push(&mut queue, JobPriority::Thumbnail);

        assert_eq!(queue.pop().unwrap().id, id1);
        assert_eq!(queue.pop().unwrap().id, id3);
        assert_eq!(queue.pop().unwrap().id, id2);
        assert_eq!(queue.pop().unwrap().id, id4);
        assert_eq!(queue.pop().unwrap().id, id5);
    }

    #[test]
    fn test_remove_if_by_group() {
        let mut queue = JobQueue::new();
        push_in(&mut queue, JobPriority::Visible, 1);
        push_in(&mut queue, JobPriority::Visible, 2);
        push_in(&mut queue, JobPriority::ReadAhead, 1);

        let removed = queue.remove_if(|job| job.group == 1);
        assert_eq!(removed.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().group, 2);
    }

    #[test]
    fn test_cancelled_job_is_skipped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut queue = JobQueue::new();

        let token = CancellationToken::new();
        let counter = Arc::clone(&runs);
        let id = queue.reserve_id();
        queue.push(
            id,
            JobPriority::Visible,
            0,
            token.clone(),
            Box::new(move |_| {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );

        token.cancel();
        assert!(!queue.pop().unwrap().run());
        assert_eq!(runs.load(AtomicOrdering::SeqCst), 0);
    }
}
