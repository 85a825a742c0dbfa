//! Subtype checks.
//!
//! Every virtual method table embeds an array of ancestors indexed by depth. A class that is
//! neither an array nor an interface and sits at depth `1..max` records itself in its own
//! table and in the tables of all its subclasses, so testing `A <: B` for such a `B` is one
//! load from `A`'s table. Everything else goes through the hierarchy walk.

use std::sync::Arc;

use crate::{
    class::ClassEntity,
    classfile::ROOT_CLASS,
    loader::{CLONEABLE_INTERFACE, SERIALIZABLE_INTERFACE},
};

impl ClassEntity {
    /// `true` if instances of this class are instances of `other`
    #[must_use]
    pub fn is_instanceof(&self, other: &ClassEntity) -> bool {
        if self.id() == other.id() {
            return true;
        }
        self.fast_instanceof(other)
            .unwrap_or_else(|| self.slow_instanceof(other))
    }

    /// `true` if `other` can be tested with the fast path, i.e. it occupies an entry of the
    /// embedded ancestor arrays
    #[must_use]
    pub fn is_fast_subtype_target(&self) -> bool {
        self.prepared()
            .is_some_and(|prepared| prepared.fast_subtype)
    }

    /// Answers `self <: other` from the ancestor array, or `None` if the fast path does not
    /// apply to this pair
    #[must_use]
    pub fn fast_instanceof(&self, other: &ClassEntity) -> Option<bool> {
        if !other.is_fast_subtype_target() {
            return None;
        }
        let depth = other.depth()?;
        let vtable = self.vtable()?;
        Some(vtable.ancestor(depth as usize - 1) == Some(other.id()))
    }

    /// Answers `self <: other` by walking the hierarchy
    #[must_use]
    pub fn slow_instanceof(&self, other: &ClassEntity) -> bool {
        if self.id() == other.id() {
            return true;
        }

        if let Some(array) = self.array_info() {
            if let Some(other_array) = other.array_info() {
                let (element, other_element) = (&array.element, &other_array.element);
                if element.is_primitive() || other_element.is_primitive() {
                    return element.id() == other_element.id();
                }
                return element.slow_instanceof(other_element);
            }
            return **other.name() == ROOT_CLASS
                || **other.name() == CLONEABLE_INTERFACE
                || **other.name() == SERIALIZABLE_INTERFACE;
        }

        if other.is_interface() {
            let mut current = Some(self);
            while let Some(class) = current {
                if class
                    .direct_interfaces()
                    .iter()
                    .any(|interface| interface.slow_instanceof(other))
                {
                    return true;
                }
                current = class.super_class().map(Arc::as_ref);
            }
            return false;
        }

        let mut current = self.super_class();
        while let Some(class) = current {
            if class.id() == other.id() {
                return true;
            }
            current = class.super_class();
        }
        false
    }
}
