//! Cancellation tokens for render jobs
//!
//! A token is shared between the in-flight registry and the decode lane. The
//! lane checks it at every checkpoint of a decode and stops early once it
//! fires.

use pdf_reader_render::CancelCheck;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative job cancellation
///
/// Clones share the same flag, so cancelling one handle is observed by the
/// lane through its own clone.
///
/// # Example
///
/// ```
/// use pdf_reader_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let lane_token = token.clone();
///
/// token.cancel();
/// assert!(lane_token.is_cancelled());
///
/// // A new request for the same page revives the job.
/// token.reset();
/// assert!(!lane_token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    ///
    /// The token starts in a non-cancelled state.
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clear the cancellation for every clone of this token.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelCheck for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}
