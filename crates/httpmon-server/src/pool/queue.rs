use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tokio::sync::{futures::Notified, Notify};

use httpmon_core::error::{HttpmonError, Result};

pub use crate::config::schema::QueueFull;

/// Outcome of running a job body: whether it panicked, plus the deferred
/// hand-off of its result to the submitter.
pub(crate) struct Executed {
    pub panic: Option<String>,
    pub deliver: Box<dyn FnOnce() + Send>,
}

pub(crate) struct Job {
    /// Correlation id captured from the submitting thread.
    pub context: Option<String>,
    pub enqueued: Instant,
    pub run: Box<dyn FnOnce() -> Executed + Send>,
}

/// Result of a non-blocking push.
pub(crate) enum TryPush {
    Queued,
    Full(Job),
    Closed,
}

/// Bounded FIFO shared by all workers of a pool.
///
/// Closing drops the only long-lived sender: workers drain what is queued,
/// then see the channel disconnect and exit.
pub(crate) struct JobQueue {
    tx: Mutex<Option<Sender<Job>>>,
    rx: Receiver<Job>,
    capacity: usize,
    /// Signalled whenever a worker takes a job, for async submitters waiting on room.
    room: Notify,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            capacity,
            room: Notify::new(),
        }
    }

    // Only clone/take happens under this lock, so a poisoned guard is still usable.
    fn lock_tx(&self) -> MutexGuard<'_, Option<Sender<Job>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self) -> Option<Sender<Job>> {
        self.lock_tx().clone()
    }

    /// Admit a job, failing fast or waiting for room according to `policy`.
    pub fn push(&self, job: Job, policy: QueueFull) -> Result<()> {
        let tx = self.sender().ok_or(HttpmonError::PoolShutdown)?;
        match policy {
            QueueFull::Reject => tx.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => HttpmonError::Saturation {
                    capacity: self.capacity,
                },
                TrySendError::Disconnected(_) => HttpmonError::PoolShutdown,
            }),
            QueueFull::Block => tx.send(job).map_err(|_| HttpmonError::PoolShutdown),
        }
    }

    pub fn try_push(&self, job: Job) -> TryPush {
        let Some(tx) = self.sender() else {
            return TryPush::Closed;
        };
        match tx.try_send(job) {
            Ok(()) => TryPush::Queued,
            Err(TrySendError::Full(job)) => TryPush::Full(job),
            Err(TrySendError::Disconnected(_)) => TryPush::Closed,
        }
    }

    /// Future resolving the next time a slot may have freed up. Create it
    /// before the `try_push` it guards so no wake-up is missed.
    pub fn room(&self) -> Notified<'_> {
        self.room.notified()
    }

    /// Next job in FIFO order. Blocks while the queue is empty; returns
    /// `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Job> {
        let job = self.rx.recv().ok()?;
        self.room.notify_waiters();
        Some(job)
    }

    /// Stop admitting jobs. Queued jobs still drain.
    pub fn close(&self) {
        self.lock_tx().take();
        self.room.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn receiver(&self) -> Receiver<Job> {
        self.rx.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
