//! Virtual method tables and interface tables.
//!
//! # Table Layout
//!
//! ```text
//!  --------------------------------
//! |          class pointer         |  \
//!  --------------------------------     header
//! |      interface table pointer   |  /
//!  --------------------------------
//! |   ancestor 0 .. ancestor N-1   |  fast subtype check, N = max depth
//!  --------------------------------
//! |     virtual method slots       |  superclass slots first, then new methods
//!  --------------------------------
//! |    interface method slots      |  one contiguous run per implemented interface
//!  --------------------------------
//! ```
//!
//! Every entry is one reference wide. The interface table lists, per implemented interface,
//! the interface and the first slot of its run; method `k` of that interface lives at
//! `first_slot + k`.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::{trace, warn};

use crate::{
    class::{ClassEntity, ClassId, ClassRc, ClassState, Method, MethodRc},
    classfile::Visibility,
    link::PatchSite,
    services::{CodeAddress, CodeGenerator},
    strings::InternedRef,
    Error, Result,
};

/// Number of reference-sized words in front of the ancestor array
pub const VTABLE_HEADER_WORDS: u32 = 2;

/// What a dispatch-table slot resolves to when invoked
#[derive(Debug, Clone)]
pub enum SlotTarget {
    /// A method implementation (possibly abstract or a placeholder)
    Method(MethodRc),
    /// No implementation exists for this interface method
    AbstractMethodError(MethodRc),
    /// The implementation exists but is not public
    IllegalAccessError(MethodRc),
}

impl SlotTarget {
    /// The method the slot was created for
    #[must_use]
    pub fn method(&self) -> &MethodRc {
        match self {
            SlotTarget::Method(method)
            | SlotTarget::AbstractMethodError(method)
            | SlotTarget::IllegalAccessError(method) => method,
        }
    }
}

/// One entry of a dispatch table
pub struct VTableSlot {
    code: AtomicU64,
    target: SlotTarget,
}

impl VTableSlot {
    /// Address currently installed in the slot
    #[must_use]
    pub fn code(&self) -> CodeAddress {
        CodeAddress::new(self.code.load(Ordering::Acquire))
    }

    /// What the slot resolves to
    #[must_use]
    pub fn target(&self) -> &SlotTarget {
        &self.target
    }
}

impl fmt::Debug for VTableSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {:?}", self.code(), self.target)
    }
}

/// Interface-table entry: where the slots of one implemented interface start
#[derive(Debug, Clone)]
pub struct InterfaceEntry {
    /// Id of the implemented interface
    pub interface: ClassId,
    /// Internal name of the implemented interface
    pub interface_name: InternedRef,
    /// Index of the first slot of this interface's run
    pub first_slot: u32,
    /// Number of slots in the run
    pub len: u32,
}

/// The dispatch table of a prepared class
pub struct VTable {
    class: ClassId,
    class_name: InternedRef,
    ancestors: Box<[Option<ClassId>]>,
    slots: Box<[VTableSlot]>,
    num_virtual: u32,
    interfaces: Vec<InterfaceEntry>,
    reference_size: u32,
}

impl VTable {
    /// Id of the class this table belongs to
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class
    }

    /// Internal name of the class this table belongs to
    #[must_use]
    pub fn class_name(&self) -> &InternedRef {
        &self.class_name
    }

    /// Number of virtual method slots
    #[must_use]
    pub fn num_virtual_methods(&self) -> u32 {
        self.num_virtual
    }

    /// Total number of slots, interface runs included
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` if the table has no slots at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the slot at `index`
    #[must_use]
    pub fn slot(&self, index: u32) -> Option<&VTableSlot> {
        self.slots.get(index as usize)
    }

    /// All slots in table order
    #[must_use]
    pub fn slots(&self) -> &[VTableSlot] {
        &self.slots
    }

    /// The embedded ancestor array; entry `d - 1` holds the ancestor of depth `d`
    #[must_use]
    pub fn ancestors(&self) -> &[Option<ClassId>] {
        &self.ancestors
    }

    /// The ancestor recorded at `index`, if any
    #[must_use]
    pub fn ancestor(&self, index: usize) -> Option<ClassId> {
        self.ancestors.get(index).copied().flatten()
    }

    /// The interface table, in the order interfaces were collected
    #[must_use]
    pub fn interface_table(&self) -> &[InterfaceEntry] {
        &self.interfaces
    }

    /// Finds the interface-table entry of `interface`
    #[must_use]
    pub fn find_interface(&self, interface: ClassId) -> Option<&InterfaceEntry> {
        self.interfaces
            .iter()
            .find(|entry| entry.interface == interface)
    }

    /// Byte offset of the ancestor array
    #[must_use]
    pub fn ancestors_offset(&self) -> u32 {
        VTABLE_HEADER_WORDS * self.reference_size
    }

    /// Byte offset of slot `index`, as used by compiled dispatch sequences
    #[must_use]
    pub fn slot_offset(&self, index: u32) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let ancestors = self.ancestors.len() as u32;
        (VTABLE_HEADER_WORDS + ancestors + index) * self.reference_size
    }

    /// Inverse of [`VTable::slot_offset`]
    #[must_use]
    pub fn slot_index(&self, offset: u32) -> Option<u32> {
        let first = self.slot_offset(0);
        if offset < first || (offset - first) % self.reference_size != 0 {
            return None;
        }
        let index = (offset - first) / self.reference_size;
        ((index as usize) < self.slots.len()).then_some(index)
    }

    /// Bytes the table occupies when materialised for native code
    #[must_use]
    pub fn table_size(&self) -> usize {
        (VTABLE_HEADER_WORDS as usize + self.ancestors.len() + self.slots.len())
            * self.reference_size as usize
    }

    /// Resolves an invocation through slot `index`
    ///
    /// # Errors
    /// Returns [`Error::AbstractMethod`] for slots without an implementation,
    /// [`Error::IllegalAccess`] for slots bound to a non-public implementation and
    /// [`Error::OutOfBounds`] for indices past the table.
    pub fn dispatch_slot(&self, index: u32) -> Result<MethodRc> {
        let slot = self.slot(index).ok_or_else(|| {
            Error::OutOfBounds(format!("slot {index} of {}", self.class_name))
        })?;

        match &slot.target {
            SlotTarget::Method(method) if !method.is_abstract() => Ok(method.clone()),
            SlotTarget::Method(method) | SlotTarget::AbstractMethodError(method) => {
                Err(Error::AbstractMethod {
                    class: self.class_name.to_string(),
                    method: format!("{}{}", method.name(), method.descriptor()),
                })
            }
            SlotTarget::IllegalAccessError(method) => Err(Error::IllegalAccess {
                class: self.class_name.to_string(),
                method: format!("{}{}", method.name(), method.descriptor()),
            }),
        }
    }

    /// Resolves a virtual invocation of the method with dispatch index `index`
    ///
    /// # Errors
    /// As [`VTable::dispatch_slot`]; indices into the interface runs are out of bounds.
    pub fn dispatch_virtual(&self, index: u32) -> Result<MethodRc> {
        if index >= self.num_virtual {
            return Err(Error::OutOfBounds(format!(
                "virtual slot {index} of {}",
                self.class_name
            )));
        }
        self.dispatch_slot(index)
    }

    pub(crate) fn swap_slot_code(&self, index: usize, old: CodeAddress, new: CodeAddress) -> bool {
        self.slots.get(index).is_some_and(|slot| {
            slot.code
                .compare_exchange(old.value(), new.value(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }
}

impl fmt::Debug for VTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VTable")
            .field("class", &self.class_name)
            .field("num_virtual", &self.num_virtual)
            .field("slots", &self.slots.len())
            .field("interfaces", &self.interfaces.len())
            .finish()
    }
}

impl ClassEntity {
    /// Resolves an invocation of `method`, declared by `interface`, on instances of this class
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleClassChange`] if this class does not implement
    /// `interface`, [`Error::InvalidState`] if it is not prepared, or the deferred dispatch
    /// error installed in the slot.
    pub fn dispatch_interface(&self, interface: &ClassEntity, method: &Method) -> Result<MethodRc> {
        let vtable = self.vtable().ok_or_else(|| Error::InvalidState {
            class: self.name().to_string(),
            state: self.state().name(),
            expected: ClassState::Prepared.name(),
        })?;
        let entry = vtable.find_interface(interface.id()).ok_or_else(|| {
            Error::IncompatibleClassChange {
                class: self.name().to_string(),
                message: format!("does not implement {}", interface.name()),
            }
        })?;
        let index = method
            .vtable_index()
            .filter(|index| *index < entry.len)
            .ok_or_else(|| Error::NoSuchMethod {
                class: interface.name().to_string(),
                name: method.name().to_string(),
                descriptor: method.descriptor().to_string(),
            })?;

        vtable.dispatch_slot(entry.first_slot + index)
    }
}

/// Synthesizes placeholders for interface methods an abstract class leaves unimplemented
///
/// Without them, a later subclass implementing such a method would append a new slot instead
/// of filling a slot every class of the hierarchy agrees on.
pub(crate) fn synthesize_fake_methods(
    class: &ClassEntity,
    inherited: &[MethodRc],
    interfaces: &[ClassRc],
) -> Vec<MethodRc> {
    let mut fakes: Vec<MethodRc> = Vec::new();
    for interface in interfaces {
        for interface_method in interface.interface_methods() {
            let known = class
                .methods()
                .iter()
                .chain(inherited)
                .chain(&fakes)
                .any(|method| method.same_signature(interface_method));
            if !known {
                trace!(class = %class.name(), method = %interface_method, "synthesized fake method");
                fakes.push(Arc::new(Method::fake(
                    class.id(),
                    class.name(),
                    interface_method,
                )));
            }
        }
    }
    fakes
}

/// `true` if `method` overrides `inherited` rather than starting a new slot
fn overrides(method: &Method, inherited: &Method) -> bool {
    match inherited.visibility() {
        Visibility::Private => false,
        Visibility::Package => method.same_package(inherited),
        Visibility::Protected | Visibility::Public => true,
    }
}

/// Assigns dispatch indices to the virtual methods of `class`
///
/// Starts from the superclass table `inherited` and returns the table of `class`: each slot
/// holds the most specific method for it.
pub(crate) fn assign_virtual_slots(
    class: &ClassEntity,
    inherited: &[MethodRc],
    fakes: &[MethodRc],
) -> Result<Vec<MethodRc>> {
    let mut table = inherited.to_vec();

    for method in class
        .methods()
        .iter()
        .chain(fakes)
        .filter(|method| method.is_virtual())
    {
        let mut slot = None;
        for (index, candidate) in inherited.iter().enumerate() {
            if !candidate.same_signature(method) || !overrides(method, candidate) {
                continue;
            }
            if candidate.is_final() {
                return Err(Error::Verify {
                    class: class.name().to_string(),
                    message: format!("{method} overrides final method {candidate}"),
                });
            }
            slot = Some(index);
            break;
        }

        let index = match slot {
            Some(index) => {
                table[index].mark_overridden();
                table[index] = method.clone();
                index
            }
            None => {
                table.push(method.clone());
                table.len() - 1
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        method.assign_vtable_index(index as u32)?;
    }

    Ok(table)
}

/// Assigns interface-local indices to the methods of an interface
pub(crate) fn assign_interface_slots(interface: &ClassEntity) -> Result<Vec<MethodRc>> {
    let methods: Vec<MethodRc> = interface.interface_methods().cloned().collect();
    for (index, method) in methods.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        method.assign_vtable_index(index as u32)?;
    }
    Ok(methods)
}

/// Number of slots a class table needs: the virtual part plus one run per interface
pub(crate) fn slot_count(virtual_methods: &[MethodRc], interfaces: &[ClassRc]) -> usize {
    virtual_methods.len()
        + interfaces
            .iter()
            .map(|interface| interface.interface_methods().count())
            .sum::<usize>()
}

/// Builds the dispatch table of a prepared class and registers its patch sites
pub(crate) fn build_vtable(
    class: &ClassEntity,
    virtual_methods: &[MethodRc],
    interfaces: &[ClassRc],
    ancestors: Box<[Option<ClassId>]>,
    codegen: &dyn CodeGenerator,
    reference_size: u32,
) -> Result<Arc<VTable>> {
    let mut slots = Vec::with_capacity(slot_count(virtual_methods, interfaces));

    for method in virtual_methods {
        slots.push(VTableSlot {
            code: AtomicU64::new(method.ensure_entry_point(codegen, class).value()),
            target: SlotTarget::Method(method.clone()),
        });
    }

    let mut entries = Vec::with_capacity(interfaces.len());
    for interface in interfaces {
        #[allow(clippy::cast_possible_truncation)]
        let first_slot = slots.len() as u32;
        for interface_method in interface.interface_methods() {
            // The most derived declaration wins when a subclass adds a slot shadowing a
            // package-private method of the same signature
            let implementation = virtual_methods
                .iter()
                .rev()
                .find(|method| method.same_signature(interface_method));

            let (code, target) = match implementation {
                Some(method) if method.is_public() => (
                    method.ensure_entry_point(codegen, class),
                    SlotTarget::Method(method.clone()),
                ),
                Some(method) => (
                    codegen.illegal_access_error_stub(class, method),
                    SlotTarget::IllegalAccessError(method.clone()),
                ),
                // Default method of the interface itself
                None if !interface_method.is_abstract() => (
                    interface_method.ensure_entry_point(codegen, interface),
                    SlotTarget::Method(interface_method.clone()),
                ),
                None => {
                    if !class.is_abstract() {
                        warn!(
                            class = %class.name(),
                            method = %interface_method,
                            "no implementation for interface method"
                        );
                    }
                    (
                        codegen.abstract_method_error_stub(class, interface_method),
                        SlotTarget::AbstractMethodError(interface_method.clone()),
                    )
                }
            };
            slots.push(VTableSlot {
                code: AtomicU64::new(code.value()),
                target,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let len = slots.len() as u32 - first_slot;
        entries.push(InterfaceEntry {
            interface: interface.id(),
            interface_name: interface.name().clone(),
            first_slot,
            len,
        });
    }

    #[allow(clippy::cast_possible_truncation)]
    let table = Arc::new(VTable {
        class: class.id(),
        class_name: class.name().clone(),
        ancestors,
        slots: slots.into_boxed_slice(),
        num_virtual: virtual_methods.len() as u32,
        interfaces: entries,
        reference_size,
    });

    for (index, slot) in table.slots.iter().enumerate() {
        if let SlotTarget::Method(method) = &slot.target {
            method.register_patch_site(PatchSite::new(&table, index))?;
            // Code replaced while the table was being built
            if let Some(current) = method.entry_point() {
                table.swap_slot_code(index, slot.code(), current);
            }
        }
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::MethodAccessFlags,
        test::{class, interface, loader_with},
    };

    const ROOT_VIRTUALS: u32 = 6;

    #[test]
    fn override_reuses_slot() {
        let loader = loader_with(vec![
            class("p/A").method("m", "()V", MethodAccessFlags::PUBLIC).build().unwrap(),
            class("p/B")
                .extends("p/A")
                .method("m", "()V", MethodAccessFlags::PUBLIC)
                .method("n", "()V", MethodAccessFlags::PUBLIC)
                .build()
                .unwrap(),
        ]);

        let b = loader.resolve_and_prepare("p/B").unwrap();
        let a = loader.get("p/A").unwrap();
        let a_m = a.declared_method("m", "()V").unwrap();
        let b_m = b.declared_method("m", "()V").unwrap();

        assert_eq!(a_m.vtable_index(), Some(ROOT_VIRTUALS));
        assert_eq!(b_m.vtable_index(), Some(ROOT_VIRTUALS));
        assert_eq!(b.declared_method("n", "()V").unwrap().vtable_index(), Some(ROOT_VIRTUALS + 1));
        assert!(a_m.is_overridden());

        let vtable = b.vtable().unwrap();
        assert_eq!(vtable.num_virtual_methods(), ROOT_VIRTUALS + 2);
        assert!(Arc::ptr_eq(&vtable.dispatch_virtual(ROOT_VIRTUALS).unwrap(), &b_m));
        assert_eq!(vtable.slot(ROOT_VIRTUALS).unwrap().code(), b_m.entry_point().unwrap());
        assert!(matches!(
            vtable.dispatch_virtual(ROOT_VIRTUALS + 2),
            Err(Error::OutOfBounds(_))
        ));
    }

    #[test]
    fn package_private_stays_in_its_package() {
        let loader = loader_with(vec![
            class("p/A").method("m", "()V", MethodAccessFlags::empty()).build().unwrap(),
            class("q/B")
                .extends("p/A")
                .method("m", "()V", MethodAccessFlags::empty())
                .build()
                .unwrap(),
            class("p/C")
                .extends("p/A")
                .method("m", "()V", MethodAccessFlags::empty())
                .build()
                .unwrap(),
        ]);

        let b = loader.resolve_and_prepare("q/B").unwrap();
        let c = loader.resolve_and_prepare("p/C").unwrap();

        assert_eq!(b.declared_method("m", "()V").unwrap().vtable_index(), Some(ROOT_VIRTUALS + 1));
        assert_eq!(c.declared_method("m", "()V").unwrap().vtable_index(), Some(ROOT_VIRTUALS));
        assert_eq!(b.vtable().unwrap().num_virtual_methods(), ROOT_VIRTUALS + 2);
    }

    #[test]
    fn interface_slot_binds_shadowing_public_method() {
        let loader = loader_with(vec![
            class("p/A").method("m", "()V", MethodAccessFlags::empty()).build().unwrap(),
            interface("i/Runner").abstract_method("m", "()V").build().unwrap(),
            class("q/B")
                .extends("p/A")
                .implements("i/Runner")
                .method("m", "()V", MethodAccessFlags::PUBLIC)
                .build()
                .unwrap(),
        ]);

        let runner = loader.resolve_and_prepare("i/Runner").unwrap();
        let runner_m = runner.declared_method("m", "()V").unwrap();
        let b = loader.resolve_and_prepare("q/B").unwrap();
        let b_m = b.declared_method("m", "()V").unwrap();
        assert_eq!(b_m.vtable_index(), Some(ROOT_VIRTUALS + 1));

        let target = b.dispatch_interface(&runner, &runner_m).unwrap();
        assert!(Arc::ptr_eq(&target, &b_m));

        let entry = b.vtable().unwrap().find_interface(runner.id()).unwrap().clone();
        let slot = b.vtable().unwrap().slot(entry.first_slot).unwrap();
        assert_eq!(slot.code(), b_m.entry_point().unwrap());
    }

    #[test]
    fn final_method_cannot_be_overridden() {
        let loader = loader_with(vec![
            class("p/A")
                .method("m", "()V", MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL)
                .build()
                .unwrap(),
            class("p/B")
                .extends("p/A")
                .method("m", "()V", MethodAccessFlags::PUBLIC)
                .build()
                .unwrap(),
        ]);

        let error = loader.resolve_and_prepare("p/B").unwrap_err();
        assert!(matches!(error, Error::Verify { .. }));
        assert!(loader.get("p/A").unwrap().state().is_at_least(ClassState::Prepared));
    }

    #[test]
    fn interface_slots_resolve_or_stub() {
        let loader = loader_with(vec![
            interface("p/Task")
                .abstract_method("run", "()V")
                .abstract_method("stop", "()V")
                .method("describe", "()V", MethodAccessFlags::PUBLIC)
                .build()
                .unwrap(),
            class("p/Worker")
                .implements("p/Task")
                .method("run", "()V", MethodAccessFlags::PUBLIC)
                .method("stop", "()V", MethodAccessFlags::empty())
                .build()
                .unwrap(),
            class("p/Idle").implements("p/Task").build().unwrap(),
        ]);

        let task = loader.resolve_and_prepare("p/Task").unwrap();
        let run = task.declared_method("run", "()V").unwrap();
        let stop = task.declared_method("stop", "()V").unwrap();
        let describe = task.declared_method("describe", "()V").unwrap();

        let worker = loader.resolve_and_prepare("p/Worker").unwrap();
        let target = worker.dispatch_interface(&task, &run).unwrap();
        assert!(Arc::ptr_eq(&target, &worker.declared_method("run", "()V").unwrap()));
        assert!(matches!(
            worker.dispatch_interface(&task, &stop),
            Err(Error::IllegalAccess { .. })
        ));
        let default = worker.dispatch_interface(&task, &describe).unwrap();
        assert!(Arc::ptr_eq(&default, &describe));

        let idle = loader.resolve_and_prepare("p/Idle").unwrap();
        assert!(matches!(
            idle.dispatch_interface(&task, &run),
            Err(Error::AbstractMethod { .. })
        ));

        let entry = idle.vtable().unwrap().find_interface(task.id()).unwrap().clone();
        assert_eq!(entry.len, 3);
        let slot = idle.vtable().unwrap().slot(entry.first_slot).unwrap();
        assert!(matches!(slot.target(), SlotTarget::AbstractMethodError(_)));
    }

    #[test]
    fn abstract_class_gets_fake_methods() {
        let loader = loader_with(vec![
            interface("p/Shape").abstract_method("area", "()D").build().unwrap(),
            class("p/Base").abstract_class().implements("p/Shape").build().unwrap(),
            class("p/Circle")
                .extends("p/Base")
                .method("area", "()D", MethodAccessFlags::PUBLIC)
                .build()
                .unwrap(),
        ]);

        let base = loader.resolve_and_prepare("p/Base").unwrap();
        let fakes = &base.prepared().unwrap().fake_methods;
        assert_eq!(fakes.len(), 1);
        assert!(fakes[0].is_fake());
        assert_eq!(fakes[0].vtable_index(), Some(ROOT_VIRTUALS));
        assert!(matches!(
            base.vtable().unwrap().dispatch_virtual(ROOT_VIRTUALS),
            Err(Error::AbstractMethod { .. })
        ));

        let circle = loader.resolve_and_prepare("p/Circle").unwrap();
        let area = circle.declared_method("area", "()D").unwrap();
        assert_eq!(area.vtable_index(), Some(ROOT_VIRTUALS));
        assert!(fakes[0].is_overridden());

        let shape = loader.get("p/Shape").unwrap();
        let shape_area = shape.declared_method("area", "()D").unwrap();
        assert!(Arc::ptr_eq(&circle.dispatch_interface(&shape, &shape_area).unwrap(), &area));
    }

    #[test]
    fn slot_offsets_round_trip() {
        let loader = loader_with(vec![]);
        let root = loader.resolve_and_prepare(crate::classfile::ROOT_CLASS).unwrap();
        let vtable = root.vtable().unwrap();

        assert_eq!(vtable.ancestors().len(), 5);
        assert_eq!(vtable.ancestors_offset(), 16);
        assert_eq!(vtable.slot_offset(0), (2 + 5) * 8);
        assert_eq!(vtable.slot_index(vtable.slot_offset(3)), Some(3));
        assert_eq!(vtable.slot_index(vtable.slot_offset(0) + 1), None);
        assert_eq!(vtable.slot_index(vtable.slot_offset(ROOT_VIRTUALS)), None);
        assert_eq!(vtable.table_size(), (2 + 5 + 6) * 8);
    }
}
