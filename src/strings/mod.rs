//! Interned-string table.
//!
//! Class names, member names, descriptors and string constants are interned: each distinct
//! byte sequence is stored exactly once and every user holds a reference to the same record,
//! so names can be compared by identity. A record can additionally be bound to the runtime
//! string object that represents it, which is what gives string constants their identity.
//!
//! # Key Components
//!
//! - [`StringPool`] - The content-addressed table itself
//! - [`InternedString`] - One immutable record
//! - [`BoundStrings`] - Registry of records bound to a runtime object, for root enumeration
//! - [`hash_bytes`] - The bucket hash
//!
//! # Thread Safety
//!
//! Lookups that hit never take a lock. Inserts serialise on a single pool-wide lock and
//! publish the new record with release ordering, so a concurrent reader either misses the
//! record entirely or sees it fully built. Runtime-object binding is a compare-and-swap where
//! the first writer wins.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use classlink::strings::StringPool;
//!
//! let pool = StringPool::new(64);
//! let a = pool.intern_str("java/lang/Object");
//! let b = pool.lookup(b"java/lang/Object");
//! assert!(Arc::ptr_eq(&a, &b));
//! assert_eq!(pool.len(), 1);
//! ```

mod bound;
mod hash;
mod pool;

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub use bound::BoundStrings;
pub use hash::hash_bytes;
pub use pool::StringPool;

use crate::services::ObjectRef;

/// Shared reference to an interned record
pub type InternedRef = Arc<InternedString>;

/// An immutable, interned byte sequence
///
/// Equality is by content, with an identity fast path; two records from the same pool are
/// equal exactly when they are the same record.
pub struct InternedString {
    bytes: Box<[u8]>,
    hash: u32,
    /// Raw handle of the bound runtime string object, `0` while unbound
    object: AtomicU64,
}

impl InternedString {
    pub(crate) fn new(bytes: &[u8], hash: u32) -> Self {
        InternedString {
            bytes: bytes.into(),
            hash,
            object: AtomicU64::new(0),
        }
    }

    /// The interned bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The interned text, if it is valid UTF-8
    #[must_use]
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for the empty string
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The bucket hash this record was filed under
    #[must_use]
    pub fn hash_code(&self) -> u32 {
        self.hash
    }

    /// The runtime string object bound to this record, if any
    #[must_use]
    pub fn runtime_object(&self) -> Option<ObjectRef> {
        ObjectRef::new(self.object.load(Ordering::Acquire))
    }

    /// Binds `object` unless another object won the race first
    ///
    /// Returns `Ok(())` if `object` is now bound, or `Err(winner)` with the object that was
    /// bound earlier.
    pub(crate) fn try_bind(&self, object: ObjectRef) -> std::result::Result<(), ObjectRef> {
        match self
            .object
            .compare_exchange(0, object.value(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(existing) => match ObjectRef::new(existing) {
                Some(winner) => Err(winner),
                None => Ok(()),
            },
        }
    }
}

impl PartialEq for InternedString {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || (self.hash == other.hash && self.bytes == other.bytes)
    }
}

impl Eq for InternedString {}

impl Hash for InternedString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl PartialEq<str> for InternedString {
    fn eq(&self, other: &str) -> bool {
        &*self.bytes == other.as_bytes()
    }
}

impl PartialEq<&str> for InternedString {
    fn eq(&self, other: &&str) -> bool {
        &*self.bytes == other.as_bytes()
    }
}

impl fmt::Display for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InternedString({:?})", String::from_utf8_lossy(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_first_writer_wins() {
        let record = InternedString::new(b"foo", hash_bytes(b"foo"));
        assert!(record.runtime_object().is_none());

        let first = ObjectRef::new(100).unwrap();
        let second = ObjectRef::new(200).unwrap();

        assert_eq!(record.try_bind(first), Ok(()));
        assert_eq!(record.try_bind(second), Err(first));
        assert_eq!(record.runtime_object(), Some(first));
    }

    #[test]
    fn equality_and_display() {
        let a = InternedString::new(b"bar", hash_bytes(b"bar"));
        let b = InternedString::new(b"bar", hash_bytes(b"bar"));
        let c = InternedString::new(b"baz", hash_bytes(b"baz"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a == "bar");
        assert_eq!(a.to_string(), "bar");
        assert_eq!(a.to_str(), Some("bar"));
        assert_eq!(a.len(), 3);
        assert!(!a.is_empty());
    }
}
