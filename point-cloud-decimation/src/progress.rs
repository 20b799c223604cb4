use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::trace;

/// Receives progress and answers abort polls during scans and reads.
pub trait ImportProgress: Sync {
    fn on_progress(&self, message: &str, fraction: f64);

    fn is_abort_requested(&self) -> bool;
}

/// Shared abort switch. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl ImportProgress for AbortFlag {
    fn on_progress(&self, message: &str, fraction: f64) {
        trace!(fraction, "{}", message);
    }

    fn is_abort_requested(&self) -> bool {
        self.is_set()
    }
}

/// Turns per item increments into fractions for a parent reporter.
pub struct CountingProgress<'a> {
    inner: &'a dyn ImportProgress,
    total: u64,
    done: AtomicU64,
}

impl<'a> CountingProgress<'a> {
    pub fn new(inner: &'a dyn ImportProgress, total: u64) -> Self {
        Self {
            inner,
            total,
            done: AtomicU64::new(0),
        }
    }

    /// Record `count` more items. Returns false once an abort was requested.
    pub fn advance(&self, message: &str, count: u64) -> bool {
        let done = self.done.fetch_add(count, Ordering::Relaxed) + count;
        let fraction = if self.total == 0 {
            1.0
        } else {
            (done as f64 / self.total as f64).min(1.0)
        };
        self.inner.on_progress(message, fraction);
        !self.inner.is_abort_requested()
    }
}
