use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters describing what a [`crate::ClassLoader`] has linked so far
#[derive(Debug, Default)]
pub struct LinkStats {
    loaded: AtomicUsize,
    prepared: AtomicUsize,
    initialized: AtomicUsize,
    failed: AtomicUsize,
}

impl LinkStats {
    pub(crate) fn record_loaded(&self) {
        self.loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_prepared(&self) {
        self.prepared.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_initialized(&self) {
        self.initialized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Classes whose ancestors were resolved
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.loaded.load(Ordering::Relaxed)
    }

    /// Classes that completed preparation
    #[must_use]
    pub fn prepared(&self) -> usize {
        self.prepared.load(Ordering::Relaxed)
    }

    /// Classes whose static initializer completed
    #[must_use]
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::Relaxed)
    }

    /// Preparation attempts that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}
