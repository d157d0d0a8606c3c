//! Cancellation token system for jobs
//!
//! Provides cancellation tokens that allow queued and running jobs to be
//! cancelled cooperatively. Workers skip cancelled jobs and long-running
//! tasks may poll their token to stop early.

use crate::{JobGroup, JobId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative job cancellation
///
/// Multiple tokens can share the same underlying cancellation state via Arc.
///
/// # Example
///
/// ```
/// use leafview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token in the non-cancelled state
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks tokens of jobs that are queued or running
///
/// Jobs can be cancelled one at a time by ID or all together by group.
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<JobId, (JobGroup, CancellationToken)>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and return the token the worker will observe
    pub fn register(&self, job_id: JobId, group: JobGroup) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(job_id, (group, token.clone()));
        token
    }

    /// Cancel a job by ID. Returns `true` if the job was registered.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.tokens.lock().get(&job_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every job of a group. Returns the number of jobs cancelled.
    pub fn cancel_group(&self, group: JobGroup) -> usize {
        let tokens = self.tokens.lock();
        let mut cancelled = 0;
        for (job_group, token) in tokens.values() {
            if *job_group == group {
                token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Cancel every registered job. Returns the number of jobs cancelled.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock();
        for (_, token) in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Forget a job once it has finished or left the queue
    pub fn unregister(&self, job_id: JobId) -> bool {
        self.tokens.lock().remove(&job_id).is_some()
    }

    pub fn get(&self, job_id: JobId) -> Option<CancellationToken> {
        self.tokens.lock().get(&job_id).map(|(_, token)| token.clone())
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}
