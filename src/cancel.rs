//! Run-level cancellation

use crate::error::{ImgsyncError, ImgsyncResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag checked by transfers and the cache sweep
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current run
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` once cancellation was requested
    pub fn check(&self) -> ImgsyncResult<()> {
        if self.is_cancelled() {
            Err(ImgsyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}
