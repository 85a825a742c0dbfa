use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::{
    class::ClassId,
    services::{Heap, NoGcRegion, ObjectRef, SlotHolder},
};

/// Bookkeeping for one object handed out by [`SimpleHeap`]
#[derive(Debug, Clone, Copy)]
pub struct ObjectRecord {
    /// Requested size in bytes
    pub size: usize,
    /// Runtime type of the object
    pub class: ClassId,
}

/// A bump-handle heap with an optional byte budget
///
/// Objects are never collected; the heap only records what was allocated so the linker's
/// interaction with the collector can be observed.
pub struct SimpleHeap {
    next_handle: AtomicU64,
    budget: Option<usize>,
    used: AtomicUsize,
    objects: DashMap<ObjectRef, ObjectRecord>,
    barriers: AtomicUsize,
}

impl SimpleHeap {
    /// Creates an unbounded heap
    #[must_use]
    pub fn new() -> Self {
        SimpleHeap {
            next_handle: AtomicU64::new(0x10),
            budget: None,
            used: AtomicUsize::new(0),
            objects: DashMap::new(),
            barriers: AtomicUsize::new(0),
        }
    }

    /// Creates a heap that fails every request once `budget` bytes have been handed out
    #[must_use]
    pub fn with_budget(budget: usize) -> Self {
        SimpleHeap {
            budget: Some(budget),
            ..Self::new()
        }
    }

    fn charge(&self, bytes: usize) -> bool {
        match self.budget {
            None => {
                self.used.fetch_add(bytes, Ordering::Relaxed);
                true
            }
            Some(budget) => self
                .used
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                    used.checked_add(bytes).filter(|total| *total <= budget)
                })
                .is_ok(),
        }
    }

    /// Number of objects allocated so far
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Bytes handed out so far (objects and native reservations)
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Number of write barriers executed
    #[must_use]
    pub fn barrier_count(&self) -> usize {
        self.barriers.load(Ordering::Acquire)
    }

    /// Returns what is known about `object`
    #[must_use]
    pub fn record(&self, object: ObjectRef) -> Option<ObjectRecord> {
        self.objects.get(&object).map(|entry| *entry.value())
    }
}

impl Default for SimpleHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap for SimpleHeap {
    fn allocate(&self, size: usize, class: ClassId) -> Option<ObjectRef> {
        debug_assert!(
            !NoGcRegion::active(),
            "allocation inside a region that forbids collection"
        );

        if !self.charge(size) {
            return None;
        }

        let object = ObjectRef::new(self.next_handle.fetch_add(1, Ordering::Relaxed))?;
        self.objects.insert(object, ObjectRecord { size, class });
        Some(object)
    }

    fn reserve(&self, bytes: usize) -> bool {
        self.charge(bytes)
    }

    fn write_barrier(&self, _holder: SlotHolder, _offset: u32, _value: ObjectRef) {
        self.barriers.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_enforced() {
        let heap = SimpleHeap::with_budget(64);
        let class = ClassId::new(1);

        assert!(heap.allocate(32, class).is_some());
        assert!(heap.reserve(16));
        assert!(heap.allocate(32, class).is_none());
        assert!(heap.allocate(16, class).is_some());
        assert!(!heap.reserve(1));

        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.used_bytes(), 64);
    }

    #[test]
    fn records_objects_and_barriers() {
        let heap = SimpleHeap::new();
        let class = ClassId::new(7);

        let object = heap.allocate(24, class).unwrap();
        let record = heap.record(object).unwrap();
        assert_eq!(record.size, 24);
        assert_eq!(record.class, class);

        heap.write_barrier(SlotHolder::Statics(class), 0, object);
        heap.write_barrier(SlotHolder::Object(object), 16, object);
        assert_eq!(heap.barrier_count(), 2);
    }
}
