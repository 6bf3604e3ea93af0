use tokio::sync::oneshot;

use httpmon_core::error::{HttpmonError, Result};

/// Receives the outcome of one submitted job.
///
/// The value is whatever the job returned, untouched: a job returning
/// `Result<T, E>` hands its `E` back as-is. A panicking body surfaces as
/// `JobPanicked`. Either way the outcome arrives only after the worker has
/// cleared its correlation context.
#[must_use = "dropping the handle discards the job's result"]
pub struct JobHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> JobHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { rx }
    }

    /// Block the current thread until the job finishes.
    ///
    /// Must not be called from inside an async runtime; use [`wait`](Self::wait) there.
    pub fn join(self) -> Result<T> {
        self.rx.blocking_recv().map_err(|_| lost())?
    }

    /// Await the job's outcome.
    pub async fn wait(self) -> Result<T> {
        self.rx.await.map_err(|_| lost())?
    }
}

fn lost() -> HttpmonError {
    HttpmonError::Internal("job dropped before reporting a result".into())
}
