//! Scoped regions in which the garbage collector must not run.
//!
//! Code that holds raw object handles (storing a reference into a static slot, binding an
//! interned string to its runtime object) enters a [`NoGcRegion`] first and leaves it before
//! doing anything that could allocate or block.

use std::{cell::Cell, marker::PhantomData};

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Guard marking the current thread as non-preemptible for the collector
///
/// The guard is tied to the thread that created it and may be nested.
///
/// ```rust
/// use classlink::services::NoGcRegion;
///
/// assert!(!NoGcRegion::active());
/// {
///     let _outer = NoGcRegion::enter();
///     let _inner = NoGcRegion::enter();
///     assert!(NoGcRegion::active());
/// }
/// assert!(!NoGcRegion::active());
/// ```
pub struct NoGcRegion {
    _not_send: PhantomData<*const ()>,
}

impl NoGcRegion {
    /// Enters a region on the current thread
    #[must_use]
    pub fn enter() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        NoGcRegion {
            _not_send: PhantomData,
        }
    }

    /// Returns `true` if the current thread is inside at least one region
    #[must_use]
    pub fn active() -> bool {
        DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for NoGcRegion {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
