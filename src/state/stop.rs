//! Cooperative cancellation via a shared atomic flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stop flag for one crawl run
///
/// Clones share the same flag, so a handle can be moved to a signal handler
/// or UI thread while the coordinator polls it between operations.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop; calling it again has no further effect
    pub fn request_stop(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop requested, finishing the current operation");
        }
    }

    /// Check if a stop was requested
    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clears a previous stop request so the handle can drive another run
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
