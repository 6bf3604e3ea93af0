//! Fixed-size instrumented worker pool.
//!
//! - exactly `threads` workers, started up front and never resized
//! - bounded FIFO queue; a full queue rejects (`Saturation`) or blocks per config
//! - async callers use [`InstrumentedPool::submit_async`], which waits for room
//!   without parking the runtime thread
//! - every job runs inside a [`ContextScope`], so the worker's correlation id
//!   is cleared before the next job, even when the body panics
//! - gauges under `{prefix}.{name}.*` are computed on read; they are registered
//!   only once every worker is running, all or nothing

mod handle;
mod queue;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::Receiver;
use tokio::sync::oneshot;

use httpmon_core::error::{HttpmonError, Result};
use httpmon_core::{Counter, Gauge, Histogram, Meter, Metric, MetricsRegistry};

use crate::config::schema::ServerSection;
use crate::context::{self, ContextScope};

pub use handle::JobHandle;
pub use queue::QueueFull;
use queue::{Executed, Job, JobQueue, TryPush};

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub name: String,
    pub threads: usize,
    pub queue_size: usize,
    pub queue_full: QueueFull,
    /// Metric name prefix.
    pub prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "default-pool".into(),
            threads: 32,
            queue_size: 128,
            queue_full: QueueFull::Reject,
            prefix: "http-server".into(),
        }
    }
}

impl PoolConfig {
    pub fn from_server(server: &ServerSection, prefix: &str) -> Self {
        Self {
            name: server.pool_name.clone(),
            threads: server.threads,
            queue_size: server.queue_size,
            queue_full: server.queue_full,
            prefix: prefix.to_string(),
        }
    }
}

/// Read-only view of the pool's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub size: usize,
    pub active: usize,
    pub queued: usize,
    pub capacity: usize,
}

struct PoolMetrics {
    throughput: Arc<Meter>,
    queue_wait: Arc<Histogram>,
    rejected: Arc<Counter>,
    failures: Arc<Counter>,
}

impl PoolMetrics {
    fn new() -> Self {
        Self {
            throughput: Arc::new(Meter::new()),
            queue_wait: Arc::new(Histogram::new()),
            rejected: Arc::new(Counter::new()),
            failures: Arc::new(Counter::new()),
        }
    }

    fn register(
        &self,
        registry: &MetricsRegistry,
        cfg: &PoolConfig,
        active: &Arc<AtomicUsize>,
        queue: Receiver<Job>,
    ) -> Result<()> {
        let base = format!("{}.{}", cfg.prefix, cfg.name);
        let size = cfg.threads;
        let capacity = cfg.queue_size;

        let a = Arc::clone(active);
        let utilization = Arc::clone(active);
        let q = queue.clone();

        registry.register_all(vec![
            (format!("{base}.size"), polled(move || size as f64)),
            (
                format!("{base}.active"),
                polled(move || a.load(Ordering::Relaxed) as f64),
            ),
            (format!("{base}.jobs"), polled(move || q.len() as f64)),
            (
                format!("{base}.utilization"),
                polled(move || utilization.load(Ordering::Relaxed) as f64 / size as f64),
            ),
            (
                format!("{base}.jobs-queue-utilization"),
                polled(move || queue.len() as f64 / capacity as f64),
            ),
            (format!("{base}.throughput"), Metric::Meter(Arc::clone(&self.throughput))),
            (format!("{base}.queue-wait"), Metric::Histogram(Arc::clone(&self.queue_wait))),
            (format!("{base}.rejected"), Metric::Counter(Arc::clone(&self.rejected))),
            (format!("{base}.failures"), Metric::Counter(Arc::clone(&self.failures))),
        ])
    }
}

fn polled<F>(f: F) -> Metric
where
    F: Fn() -> f64 + Send + Sync + 'static,
{
    Metric::Gauge(Arc::new(Gauge::polled(f)))
}

struct Shared {
    name: String,
    queue: JobQueue,
    active: Arc<AtomicUsize>,
    metrics: PoolMetrics,
}

pub struct InstrumentedPool {
    shared: Arc<Shared>,
    threads: usize,
    queue_full: QueueFull,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InstrumentedPool {
    /// Start the workers, then register the pool's metrics.
    ///
    /// Fails with `DuplicateMetricName` if a pool of the same name and prefix
    /// already registered its metrics in `registry`. On any failure the
    /// workers already started are stopped and no metric stays registered.
    pub fn new(cfg: PoolConfig, registry: &MetricsRegistry) -> Result<Self> {
        if cfg.threads == 0 || cfg.queue_size == 0 {
            return Err(HttpmonError::BadConfig(
                "pool threads and queue_size must be positive".into(),
            ));
        }

        let shared = Arc::new(Shared {
            name: cfg.name.clone(),
            queue: JobQueue::new(cfg.queue_size),
            active: Arc::new(AtomicUsize::new(0)),
            metrics: PoolMetrics::new(),
        });

        // Dropping `pool` on an error path stops the workers already spawned.
        let pool = Self {
            shared,
            threads: cfg.threads,
            queue_full: cfg.queue_full,
            workers: Mutex::new(Vec::with_capacity(cfg.threads)),
        };

        for worker_id in 0..cfg.threads {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", cfg.name, worker_id))
                .spawn(move || worker_loop(shared, worker_id))
                .map_err(|e| HttpmonError::Internal(format!("spawn worker {worker_id} failed: {e}")))?;
            pool.lock_workers().push(handle);
        }

        pool.shared.metrics.register(
            registry,
            &cfg,
            &pool.shared.active,
            pool.shared.queue.receiver(),
        )?;

        tracing::info!(
            pool = %cfg.name,
            threads = cfg.threads,
            queue_size = cfg.queue_size,
            queue_full = ?cfg.queue_full,
            "worker pool started"
        );
        Ok(pool)
    }

    /// Schedule `f` on a worker.
    ///
    /// The submitting thread's correlation id (if any) is installed on the
    /// worker for the duration of the job and cleared afterwards. Under
    /// [`QueueFull::Block`] this parks the calling thread until there is
    /// room; async callers should use [`submit_async`](Self::submit_async).
    pub fn submit<F, T>(&self, f: F) -> Result<JobHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = package(f);
        match self.shared.queue.push(job, self.queue_full) {
            Ok(()) => Ok(handle),
            Err(e) => Err(self.rejected(e)),
        }
    }

    /// Like [`submit`](Self::submit), but a full queue under
    /// [`QueueFull::Block`] yields to the runtime until a worker frees a slot.
    pub async fn submit_async<F, T>(&self, f: F) -> Result<JobHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (mut job, handle) = package(f);
        loop {
            let room = self.shared.queue.room();
            match self.shared.queue.try_push(job) {
                TryPush::Queued => return Ok(handle),
                TryPush::Closed => return Err(HttpmonError::PoolShutdown),
                TryPush::Full(back) => {
                    if self.queue_full == QueueFull::Reject {
                        return Err(self.rejected(HttpmonError::Saturation {
                            capacity: self.shared.queue.capacity(),
                        }));
                    }
                    job = back;
                    room.await;
                }
            }
        }
    }

    fn rejected(&self, e: HttpmonError) -> HttpmonError {
        if matches!(e, HttpmonError::Saturation { .. }) {
            self.shared.metrics.rejected.inc();
            tracing::warn!(pool = %self.shared.name, "job rejected: queue full");
        }
        e
    }

    pub fn state(&self) -> PoolState {
        PoolState {
            size: self.threads,
            active: self.shared.active.load(Ordering::Relaxed),
            queued: self.shared.queue.len(),
            capacity: self.shared.queue.capacity(),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Stop admitting jobs, let queued jobs drain, and join the workers.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.shared.queue.close();
        let handles: Vec<JoinHandle<()>> = self.lock_workers().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        let me = thread::current().id();
        for h in handles {
            // A job may drop the last pool handle from inside a worker.
            if h.thread().id() == me {
                continue;
            }
            if h.join().is_err() {
                tracing::error!(pool = %self.shared.name, "worker thread exited abnormally");
            }
        }
        tracing::info!(pool = %self.shared.name, "worker pool stopped");
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for InstrumentedPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wrap `f` into a queueable job plus the handle its outcome arrives on.
fn package<F, T>(f: F) -> (Job, JobHandle<T>)
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel::<Result<T>>();

    let run = Box::new(move || match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Executed {
            panic: None,
            deliver: Box::new(move || {
                let _ = tx.send(Ok(v));
            }),
        },
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            Executed {
                panic: Some(msg.clone()),
                deliver: Box::new(move || {
                    let _ = tx.send(Err(HttpmonError::JobPanicked(msg)));
                }),
            }
        }
    });

    let job = Job {
        context: context::current(),
        enqueued: Instant::now(),
        run,
    };
    (job, JobHandle::new(rx))
}

fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    tracing::debug!(pool = %shared.name, worker_id, "worker started");
    while let Some(job) = shared.queue.pop() {
        shared.metrics.queue_wait.observe(job.enqueued.elapsed());
        shared.active.fetch_add(1, Ordering::Relaxed);

        let executed = {
            let _scope = ContextScope::enter(job.context);
            (job.run)()
        };

        shared.active.fetch_sub(1, Ordering::Relaxed);
        shared.metrics.throughput.mark();

        if let Some(msg) = &executed.panic {
            shared.metrics.failures.inc();
            tracing::error!(pool = %shared.name, worker_id, panic = %msg, "job panicked");
        }
        (executed.deliver)();
    }
    tracing::debug!(pool = %shared.name, worker_id, "worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_common_payloads() {
        let p: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(p.as_ref()), "boom");
        let p: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(p.as_ref()), "bang");
        let p: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(p.as_ref()), "non-string panic payload");
    }

    #[test]
    fn zero_threads_is_rejected() {
        let reg = MetricsRegistry::new();
        let cfg = PoolConfig {
            threads: 0,
            ..PoolConfig::default()
        };
        let err = InstrumentedPool::new(cfg, &reg).err().expect("must fail");
        assert_eq!(err.code().as_str(), "BAD_CONFIG");
    }
}
