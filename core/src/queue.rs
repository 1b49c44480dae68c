//! In-process job queue with at-least-once delivery.
//!
//! RULE: The queue carries only transaction ids, never scores or
//! outcomes. Delivery may duplicate and has no cross-id ordering; it is
//! the claim transition in the store that guarantees single-worker
//! ownership, not the queue.

use crate::types::TransactionId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// One delivery of an evaluation job.
#[derive(Debug, Clone)]
pub struct EvaluationJob {
    pub transaction_id: TransactionId,
    /// 1-based delivery attempt.
    pub attempt: u32,
    pub enqueued_at: Instant,
    ready_at: Instant,
}

pub enum Delivery {
    Job(EvaluationJob),
    TimedOut,
    Shutdown,
}

pub struct JobQueue {
    jobs: Mutex<VecDeque<EvaluationJob>>,
    available: Condvar,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
}

impl JobQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        })
    }

    /// First delivery of a job for a transaction.
    pub fn enqueue(&self, transaction_id: TransactionId) {
        let now = Instant::now();
        self.push(EvaluationJob {
            transaction_id,
            attempt: 1,
            enqueued_at: now,
            ready_at: now,
        });
    }

    /// Redeliver a failed job after a backoff delay, attempt bumped.
    pub fn redeliver(&self, job: &EvaluationJob, delay: Duration) {
        self.push(EvaluationJob {
            transaction_id: job.transaction_id.clone(),
            attempt: job.attempt + 1,
            enqueued_at: job.enqueued_at,
            ready_at: Instant::now() + delay,
        });
    }

    fn push(&self, job: EvaluationJob) {
        self.lock_jobs().push_back(job);
        self.available.notify_one();
    }

    /// Block until a job is ready for delivery, the poll timeout
    /// elapses, or the queue shuts down.
    pub fn pop(&self, poll_timeout: Duration) -> Delivery {
        let deadline = Instant::now() + poll_timeout;
        let mut jobs = self.lock_jobs();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Delivery::Shutdown;
            }
            let now = Instant::now();
            if let Some(pos) = jobs.iter().position(|j| j.ready_at <= now) {
                let job = jobs.remove(pos).expect("position held under lock");
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                return Delivery::Job(job);
            }
            if now >= deadline {
                return Delivery::TimedOut;
            }
            // Wake early if a delayed redelivery becomes ready first.
            let mut wake_at = deadline;
            if let Some(next_ready) = jobs.iter().map(|j| j.ready_at).min() {
                wake_at = wake_at.min(next_ready);
            }
            let wait = wake_at
                .saturating_duration_since(now)
                .max(Duration::from_millis(1));
            jobs = match self.available.wait_timeout(jobs, wait) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// A worker acknowledges a delivery once it has fully handled it:
    /// processed, no-opped, or pushed a redelivery.
    pub fn ack(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// No queued jobs and no delivery currently being handled.
    pub fn is_idle(&self) -> bool {
        let jobs = self.lock_jobs();
        jobs.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    pub fn depth(&self) -> usize {
        self.lock_jobs().len()
    }

    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.available.notify_all();
    }

    fn lock_jobs(&self) -> MutexGuard<'_, VecDeque<EvaluationJob>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
