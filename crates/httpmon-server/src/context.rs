//! Per-thread correlation context.
//!
//! Each thread carries at most one correlation id (the request id used to tie
//! log lines and metrics to a request). Worker threads are reused across
//! unrelated jobs, so the pool wraps every job in a [`ContextScope`] whose
//! drop clears the slot on normal return and on unwinding alike.

use std::cell::RefCell;

use httpmon_core::error::{HttpmonError, Result};

thread_local! {
    static CORRELATION_ID: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Header carrying the correlation id on inbound requests.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Set the current thread's correlation id, returning the previous value.
pub fn set(id: impl Into<String>) -> Option<String> {
    let id = id.into();
    CORRELATION_ID
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut s| s.replace(id)))
        .ok()
        .flatten()
}

/// The current thread's correlation id, if any.
pub fn current() -> Option<String> {
    CORRELATION_ID
        .try_with(|slot| slot.try_borrow().ok().and_then(|s| s.clone()))
        .ok()
        .flatten()
}

/// Clear the current thread's correlation id.
///
/// Fails only if the slot is borrowed or the thread is tearing down its
/// locals; either way the next job on this thread could observe stale state.
pub fn clear() -> Result<()> {
    CORRELATION_ID
        .try_with(|slot| match slot.try_borrow_mut() {
            Ok(mut s) => {
                s.take();
                Ok(())
            }
            Err(e) => Err(HttpmonError::ContextCleanup(format!("slot borrowed: {e}"))),
        })
        .map_err(|e| HttpmonError::ContextCleanup(format!("slot destroyed: {e}")))?
}

/// Installs a correlation id for its lifetime and clears the slot on drop.
#[must_use = "the context is cleared as soon as the scope is dropped"]
pub struct ContextScope {
    _private: (),
}

impl ContextScope {
    /// Enter a scope, installing `id` when present. Any value left on the
    /// thread is replaced so the scope always starts from a known state.
    pub fn enter(id: Option<String>) -> Self {
        match id {
            Some(id) => {
                set(id);
            }
            None => {
                if let Err(e) = clear() {
                    tracing::error!(error = %e, "correlation context not cleared on scope entry");
                }
            }
        }
        Self { _private: () }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if let Err(e) = clear() {
            tracing::error!(
                error = %e,
                thread = ?std::thread::current().name(),
                "correlation context cleanup failed; later jobs on this thread may see a stale id"
            );
        }
    }
}
