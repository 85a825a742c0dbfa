use std::sync::{Arc, Weak};

use crate::{link::VTable, services::CodeAddress};

/// A dispatch-table slot that was filled with a method's entry point
///
/// Held by the method so the slot can be rewritten when the method gets new code. The table
/// is referenced weakly; a site whose table is gone is simply skipped.
pub(crate) struct PatchSite {
    table: Weak<VTable>,
    slot: usize,
}

impl PatchSite {
    pub(crate) fn new(table: &Arc<VTable>, slot: usize) -> Self {
        PatchSite {
            table: Arc::downgrade(table),
            slot,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.table.strong_count() > 0
    }

    /// Rewrites the slot from `old` to `new`
    ///
    /// Returns `None` if the table is gone, otherwise whether the slot still held `old`.
    pub(crate) fn patch(&self, old: CodeAddress, new: CodeAddress) -> Option<bool> {
        let table = self.table.upgrade()?;
        Some(table.swap_slot_code(self.slot, old, new))
    }
}
