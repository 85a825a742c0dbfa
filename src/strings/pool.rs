use std::{
    ptr,
    sync::{
        atomic::{AtomicPtr, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::{
    services::{NoGcRegion, ObjectRef},
    strings::{hash_bytes, BoundStrings, InternedRef, InternedString},
    Error, Result,
};

/// A link in a bucket chain. Nodes are immutable once published and live as long as the pool.
struct Node {
    record: InternedRef,
    next: *mut Node,
}

/// Content-addressed table of [`InternedString`] records
///
/// Records are filed into buckets by [`hash_bytes`]; each bucket is a singly linked list that
/// only ever grows at its head.
pub struct StringPool {
    buckets: Box<[AtomicPtr<Node>]>,
    mask: usize,
    insert_lock: Mutex<()>,
    count: AtomicUsize,
    bound: BoundStrings,
}

impl StringPool {
    /// Creates a pool with `buckets` chains, rounded up to a power of two
    #[must_use]
    pub fn new(buckets: usize) -> Self {
        let buckets = buckets.max(1).next_power_of_two();
        StringPool {
            buckets: (0..buckets).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
            mask: buckets - 1,
            insert_lock: Mutex::new(()),
            count: AtomicUsize::new(0),
            bound: BoundStrings::new(),
        }
    }

    fn scan(mut node: *mut Node, hash: u32, bytes: &[u8]) -> Option<InternedRef> {
        while !node.is_null() {
            // SAFETY: nodes are published fully initialised (release store, acquire load) and
            // are only freed when the pool itself is dropped.
            let current = unsafe { &*node };
            if current.record.hash_code() == hash && current.record.as_bytes() == bytes {
                return Some(current.record.clone());
            }
            node = current.next;
        }
        None
    }

    /// Returns the canonical record for `bytes`, inserting it if absent
    pub fn lookup(&self, bytes: &[u8]) -> InternedRef {
        let hash = hash_bytes(bytes);
        let bucket = &self.buckets[hash as usize & self.mask];

        if let Some(found) = Self::scan(bucket.load(Ordering::Acquire), hash, bytes) {
            return found;
        }

        // A panic while holding the lock cannot leave a half-published node behind
        let _guard = self
            .insert_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let head = bucket.load(Ordering::Acquire);
        if let Some(found) = Self::scan(head, hash, bytes) {
            return found;
        }

        let record = Arc::new(InternedString::new(bytes, hash));
        let node = Box::into_raw(Box::new(Node {
            record: record.clone(),
            next: head,
        }));
        bucket.store(node, Ordering::Release);
        self.count.fetch_add(1, Ordering::Relaxed);

        record
    }

    /// Convenience wrapper around [`StringPool::lookup`] for text
    pub fn intern_str(&self, text: &str) -> InternedRef {
        self.lookup(text.as_bytes())
    }

    /// Returns the record for `bytes` without inserting it
    #[must_use]
    pub fn find(&self, bytes: &[u8]) -> Option<InternedRef> {
        let hash = hash_bytes(bytes);
        Self::scan(
            self.buckets[hash as usize & self.mask].load(Ordering::Acquire),
            hash,
            bytes,
        )
    }

    /// Number of distinct records in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns `true` if nothing has been interned yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Records that are bound to a runtime string object
    #[must_use]
    pub fn bound(&self) -> &BoundStrings {
        &self.bound
    }

    /// Returns the runtime string object for `record`, creating it with `create` if unbound
    ///
    /// `create` may run on several threads at once for the same record; only the first object
    /// to be bound is kept and every caller receives that one. The losing objects are simply
    /// dropped, so `create` must not have side effects beyond allocating.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if `create` fails to allocate.
    pub fn intern_object<F>(&self, record: &InternedRef, create: F) -> Result<ObjectRef>
    where
        F: FnOnce() -> Option<ObjectRef>,
    {
        if let Some(object) = record.runtime_object() {
            return Ok(object);
        }

        let candidate =
            create().ok_or_else(|| Error::OutOfMemory(format!("string object for {record}")))?;

        let _region = NoGcRegion::enter();
        match record.try_bind(candidate) {
            Ok(()) => {
                self.bound.push(record.clone());
                Ok(candidate)
            }
            Err(winner) => Ok(winner),
        }
    }
}

impl Drop for StringPool {
    fn drop(&mut self) {
        for bucket in self.buckets.iter() {
            let mut node = bucket.swap(ptr::null_mut(), Ordering::AcqRel);
            while !node.is_null() {
                // SAFETY: every node was created by Box::into_raw in lookup and is owned
                // exclusively by the pool, which is being dropped.
                let owned = unsafe { Box::from_raw(node) };
                node = owned.next;
            }
        }
    }
}
