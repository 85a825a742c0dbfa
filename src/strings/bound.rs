use crate::{services::ObjectRef, strings::InternedRef};

/// Registry of interned records that have a runtime string object bound to them
///
/// The collector enumerates this list to keep interned string objects alive. Storage is a
/// list of arrays: appends reserve a slot with an atomic increment and grow by adding a new,
/// larger array once the current one is full, so existing entries never move and readers can
/// iterate while writers append.
pub struct BoundStrings {
    records: boxcar::Vec<InternedRef>,
}

impl BoundStrings {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        BoundStrings {
            records: boxcar::Vec::new(),
        }
    }

    /// Appends a freshly bound record
    pub(crate) fn push(&self, record: InternedRef) {
        self.records.push(record);
    }

    /// Number of bound records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.count()
    }

    /// Returns `true` if nothing has been bound yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.count() == 0
    }

    /// Calls `visit` with every bound record and its runtime object
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&InternedRef, ObjectRef),
    {
        for (_, record) in self.records.iter() {
            if let Some(object) = record.runtime_object() {
                visit(record, object);
            }
        }
    }

    /// Collects all runtime string objects, e.g. as collector roots
    #[must_use]
    pub fn roots(&self) -> Vec<ObjectRef> {
        let mut roots = Vec::with_capacity(self.len());
        self.for_each(|_, object| roots.push(object));
        roots
    }
}

impl Default for BoundStrings {
    fn default() -> Self {
        Self::new()
    }
}
