//! A cheap, clonable cancellation handle threaded through long-running
//! operations (`preload`, signal evaluation, both backtesters).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Signals cooperative cancellation. Checked between trading days and
/// between strategy workers (§5); in-flight I/O is not interrupted, only
/// its result is discarded once the flag is observed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every clone of this token as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`Self::cancel`] has been called on this token or any clone
    /// of it.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_visible_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
