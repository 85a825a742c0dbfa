//! Class preparation.
//!
//! Preparation turns a loaded and verified class into one that can be instantiated and
//! dispatched on: field offsets, instance size, virtual method table, interface table,
//! static storage and the embedded ancestor array for fast subtype checks.
//!
//! # Pipeline
//!
//! 1. Prepare all super-interfaces, then the superclass
//! 2. Inherit the superclass instance layout and virtual method table
//! 3. Lay out fields ([`layout`])
//! 4. Collect implemented interfaces
//! 5. Synthesize fake methods for abstract classes, assign dispatch indices
//! 6. Reserve and allocate the static block
//! 7. Build the virtual method and interface tables ([`VTable`])
//! 8. Compute instance size and class properties
//! 9. Record the class in its ancestor array if eligible for fast subtype checks
//! 10. Store constant values into static fields
//!
//! Preparation of one class is serialised by a per-class lock and the finished result is
//! published in one step, so readers either see a fully prepared class or none at all. A
//! failure in any step is recorded on the class and returned to every later caller.

mod ancestors;
mod init;
mod interfaces;
pub mod layout;
mod patch;
mod subtype;
mod vtable;

use std::sync::Arc;

use bitflags::bitflags;
use tracing::{debug, trace};

pub use layout::{FieldLayout, InstanceLayout};
pub use vtable::{InterfaceEntry, SlotTarget, VTable, VTableSlot, VTABLE_HEADER_WORDS};

pub(crate) use patch::PatchSite;

use crate::{
    class::{
        ClassEntity, ClassId, ClassRc, ClassState, ConstantValue, MethodRc, StaticBlock,
    },
    classfile::{FieldType, PrimitiveKind},
    config::LinkerConfig,
    loader::{ClassLoader, STRING_CLASS},
    services::{NoGcRegion, SlotHolder},
    Error, Result,
};

/// Size of the length word that follows the header of every array
pub const ARRAY_LENGTH_SIZE: u32 = 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Properties of a prepared class that the collector and allocator care about
    pub struct ClassProperties: u32 {
        /// The class is an array type
        const ARRAY = 0x0001;
        /// Array whose elements are primitives, so it holds no references
        const REFERENCELESS_ARRAY = 0x0002;
        /// Instances must never be moved
        const PINNED = 0x0004;
        /// Instances use a custom alignment
        const ALIGNED = 0x0008;
        /// Instances need finalization before they are reclaimed
        const FINALIZABLE = 0x0010;
    }
}

/// Everything preparation computes for a class, published once
#[derive(Debug)]
pub struct PreparedClass {
    /// Instance layout after this class's fields
    pub instance: InstanceLayout,
    /// Instance size, padded to [`PreparedClass::alignment`]
    pub instance_size: u32,
    /// Instance alignment
    pub alignment: u32,
    /// Declared instance fields in offset-assignment order, as indices into the field list
    pub instance_field_order: Vec<usize>,
    /// Size of the static block
    pub static_size: u32,
    /// Static field storage
    pub statics: StaticBlock,
    /// Every implemented interface in interface-table order; an interface does not list itself
    pub interfaces: Vec<ClassRc>,
    /// The methods behind the virtual slots, or the slot methods of an interface
    pub virtual_methods: Vec<MethodRc>,
    /// Placeholders synthesized for an abstract class
    pub fake_methods: Vec<MethodRc>,
    /// Dispatch table, absent for interfaces and primitives
    pub vtable: Option<Arc<VTable>>,
    /// Collector and allocator properties
    pub properties: ClassProperties,
    /// `true` if subtype checks against this class use the ancestor array
    pub fast_subtype: bool,
    /// Size of one element, for array classes
    pub array_element_size: Option<u32>,
}

impl PreparedClass {
    /// The final layout of a primitive class
    pub(crate) fn primitive(kind: PrimitiveKind, config: &LinkerConfig) -> Self {
        PreparedClass {
            instance: InstanceLayout::default(),
            instance_size: kind.size(),
            alignment: kind.size().max(1),
            instance_field_order: Vec::new(),
            static_size: 0,
            statics: StaticBlock::new(0, config.reference_size),
            interfaces: Vec::new(),
            virtual_methods: Vec::new(),
            fake_methods: Vec::new(),
            vtable: None,
            properties: ClassProperties::empty(),
            fast_subtype: false,
            array_element_size: None,
        }
    }

    /// Number of virtual method slots
    #[must_use]
    pub fn num_virtual_methods(&self) -> usize {
        self.virtual_methods.len()
    }
}

fn is_finalizer(class: &ClassEntity) -> bool {
    !class.is_root()
        && class
            .declared_method("finalize", "()V")
            .is_some_and(|method| !method.is_abstract() && !method.is_static())
}

impl ClassEntity {
    fn prepare_outcome(&self) -> Option<Result<()>> {
        match self.state() {
            ClassState::Error => Some(Err(self.failure_or_state_error(ClassState::Prepared))),
            state if state.is_at_least(ClassState::Prepared) => Some(Ok(())),
            _ => None,
        }
    }

    /// Prepares the class, preparing its ancestors first
    ///
    /// Idempotent and safe to call from several threads: exactly one thread does the work,
    /// the others wait for it and observe the same outcome.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the class is not yet verified, or the recorded
    /// failure if preparation (now or earlier) failed.
    pub fn prepare(self: &ClassRc, loader: &ClassLoader) -> Result<()> {
        if let Some(outcome) = self.prepare_outcome() {
            return outcome;
        }

        let _guard = lock!(self.prepare_lock);
        if let Some(outcome) = self.prepare_outcome() {
            return outcome;
        }

        let state = self.state();
        if !state.is_at_least(ClassState::BytecodesVerified) {
            return Err(Error::InvalidState {
                class: self.name().to_string(),
                state: state.name(),
                expected: ClassState::BytecodesVerified.name(),
            });
        }

        debug!(class = %self.name(), "preparing");
        let prepared = match self.build_prepared(loader) {
            Ok(prepared) => prepared,
            Err(error) => {
                loader.stats().record_failed();
                return Err(self.fail(error));
            }
        };

        let instance_size = prepared.instance_size;
        if self.prepared.set(prepared).is_err() {
            return Err(self.fail(malformed_error!("{} was prepared twice", self.name())));
        }
        let target = if self.is_array() {
            ClassState::Initialized
        } else {
            ClassState::Prepared
        };
        self.state.raise(target);
        loader.stats().record_prepared();
        debug!(class = %self.name(), instance_size, "prepared");
        Ok(())
    }

    fn ancestor_failed(&self, ancestor: &ClassEntity, error: Error) -> Error {
        Error::AncestorFailed {
            class: self.name().to_string(),
            ancestor: ancestor.name().to_string(),
            source: Box::new(error),
        }
    }

    fn build_prepared(self: &ClassRc, loader: &ClassLoader) -> Result<PreparedClass> {
        let config = loader.config();
        let services = loader.services();
        let ancestors = self
            .ancestors()
            .cloned()
            .ok_or_else(|| self.failure_or_state_error(ClassState::Loaded))?;

        for interface in &ancestors.interfaces {
            interface
                .prepare(loader)
                .map_err(|error| self.ancestor_failed(interface, error))?;
        }
        let super_prepared = match &ancestors.super_class {
            Some(super_class) if !self.is_interface() => {
                super_class
                    .prepare(loader)
                    .map_err(|error| self.ancestor_failed(super_class, error))?;
                super_class.prepared()
            }
            _ => None,
        };

        let inherited = match super_prepared {
            Some(prepared) => prepared.instance,
            None if self.is_interface() => InstanceLayout::default(),
            None => InstanceLayout::root(config),
        };
        let inherited_methods: &[MethodRc] =
            super_prepared.map_or(&[], |prepared| &prepared.virtual_methods);

        let layout = layout::compute_field_layout(self.fields(), inherited, config)?;
        for (field, offset) in self.fields().iter().zip(&layout.offsets) {
            field.assign_offset(*offset)?;
        }
        let mut instance = layout.instance;
        if self.is_array() {
            instance.unpadded_size += ARRAY_LENGTH_SIZE;
        }
        self.state.raise(ClassState::InstanceSizeComputed);
        trace!(class = %self.name(), unpadded = instance.unpadded_size, "instance layout computed");

        let interfaces = interfaces::collect_interfaces(self);

        let (fake_methods, virtual_methods) = if self.is_interface() {
            (Vec::new(), vtable::assign_interface_slots(self)?)
        } else {
            let fakes = if self.is_abstract() {
                vtable::synthesize_fake_methods(self, inherited_methods, &interfaces)
            } else {
                Vec::new()
            };
            let table = vtable::assign_virtual_slots(self, inherited_methods, &fakes)?;
            (fakes, table)
        };

        if layout.static_size > 0 && !services.heap.reserve(layout.static_size as usize) {
            return Err(Error::OutOfMemory(format!(
                "{} bytes of static storage for {}",
                layout.static_size,
                self.name()
            )));
        }
        let statics = StaticBlock::new(layout.static_size, config.reference_size);

        let mut properties = ClassProperties::empty();
        if self.is_pinned() {
            properties |= ClassProperties::PINNED;
        }
        if self.alignment_hint().is_some() {
            properties |= ClassProperties::ALIGNED;
        }
        let inherits_finalizer = super_prepared.is_some_and(|prepared| {
            prepared.properties.contains(ClassProperties::FINALIZABLE)
        });
        if inherits_finalizer || is_finalizer(self) {
            properties |= ClassProperties::FINALIZABLE;
        }

        let array_element_size = self.array_info().map(|array| {
            properties |= ClassProperties::ARRAY;
            match array.element.primitive_kind() {
                Some(kind) => {
                    properties |= ClassProperties::REFERENCELESS_ARRAY;
                    kind.size()
                }
                None => config.reference_size,
            }
        });

        let alignment = super_prepared
            .map_or(config.object_alignment, |prepared| prepared.alignment)
            .max(config.object_alignment)
            .max(self.alignment_hint().unwrap_or(1));

        let (vtable, fast_subtype, instance_size) = if self.is_interface() {
            (None, false, 0)
        } else {
            let max_depth = config.max_fast_subtype_depth as usize;
            let slots = vtable::slot_count(&virtual_methods, &interfaces);
            let table_bytes = (VTABLE_HEADER_WORDS as usize + max_depth + slots)
                * config.reference_size as usize;
            if !services.heap.reserve(table_bytes) {
                return Err(Error::OutOfMemory(format!(
                    "{table_bytes} bytes of dispatch table for {}",
                    self.name()
                )));
            }

            let depth = ancestors.depth;
            let fast_subtype =
                depth > 0 && depth < config.max_fast_subtype_depth && !self.is_array();
            let mut ancestor_ids: Vec<Option<ClassId>> = super_prepared
                .and_then(|prepared| prepared.vtable.as_ref())
                .map_or_else(Vec::new, |table| table.ancestors().to_vec());
            ancestor_ids.resize(max_depth, None);
            if fast_subtype {
                ancestor_ids[depth as usize - 1] = Some(self.id());
            }

            let table = vtable::build_vtable(
                self,
                &virtual_methods,
                &interfaces,
                ancestor_ids.into_boxed_slice(),
                services.codegen.as_ref(),
                config.reference_size,
            )?;
            let instance_size = layout::align_up(instance.unpadded_size, alignment)?;
            (Some(table), fast_subtype, instance_size)
        };

        self.write_constant_statics(loader, &statics)?;

        Ok(PreparedClass {
            instance,
            instance_size,
            alignment,
            instance_field_order: layout.instance_order,
            static_size: layout.static_size,
            statics,
            interfaces: interfaces
                .into_iter()
                .filter(|interface| interface.id() != self.id())
                .collect(),
            virtual_methods,
            fake_methods,
            vtable,
            properties,
            fast_subtype,
            array_element_size,
        })
    }

    /// Stores the constant values of static fields into the freshly allocated static block
    fn write_constant_statics(&self, loader: &ClassLoader, statics: &StaticBlock) -> Result<()> {
        for field in self.fields().iter().filter(|field| field.is_static()) {
            let Some(index) = field.constant_value() else {
                continue;
            };
            let offset = field
                .offset()
                .ok_or_else(|| malformed_error!("Static field {} has no offset", field.name()))?;

            match (self.constant_pool().value(index)?, field.field_type()) {
                (
                    ConstantValue::Int(value),
                    FieldType::Primitive(
                        PrimitiveKind::Boolean
                        | PrimitiveKind::Byte
                        | PrimitiveKind::Char
                        | PrimitiveKind::Short
                        | PrimitiveKind::Int,
                    ),
                ) => statics.write_i32(offset, value)?,
                (ConstantValue::Long(value), FieldType::Primitive(PrimitiveKind::Long)) => {
                    statics.write_i64(offset, value)?;
                }
                (ConstantValue::Float(value), FieldType::Primitive(PrimitiveKind::Float)) => {
                    statics.write_f32(offset, value)?;
                }
                (ConstantValue::Double(value), FieldType::Primitive(PrimitiveKind::Double)) => {
                    statics.write_f64(offset, value)?;
                }
                (ConstantValue::String(record), FieldType::Object(class)) if class == STRING_CLASS => {
                    let object = loader.string_object(&record)?;
                    let _region = NoGcRegion::enter();
                    loader
                        .services()
                        .heap
                        .write_barrier(SlotHolder::Statics(self.id()), offset, object);
                    statics.write_reference(offset, object)?;
                }
                (value, field_type) => {
                    return Err(malformed_error!(
                        "Constant {:?} cannot initialize {}.{} of type {}",
                        value,
                        self.name(),
                        field.name(),
                        field_type
                    ))
                }
            }
            trace!(class = %self.name(), field = %field.name(), offset, "constant static stored");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        classfile::{Constant, FieldAccessFlags, MethodAccessFlags, ROOT_CLASS},
        services::{Services, SimpleHeap},
        test::{class, interface, loader_with},
    };

    #[test]
    fn constant_statics_are_stored() {
        let heap = Arc::new(SimpleHeap::new());
        let loader = ClassLoader::with_services(
            LinkerConfig::default(),
            Services::default().with_heap(heap.clone()),
        )
        .unwrap();
        loader
            .define(
                class("a/Constants")
                    .constant_field("ANSWER", "I", Constant::Integer(42))
                    .constant_field("BIG", "J", Constant::Long(-7))
                    .constant_field("HALF", "D", Constant::Double(0.5))
                    .constant_field("GREETING", "Ljava/lang/String;", Constant::Utf8("hi".into()))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let constants = loader.resolve_and_prepare("a/Constants").unwrap();
        let statics = constants.statics().unwrap();
        let offset = |name: &str| constants.declared_field(name).unwrap().offset().unwrap();

        assert_eq!(statics.read_i32(offset("ANSWER")).unwrap(), 42);
        assert_eq!(statics.read_i64(offset("BIG")).unwrap(), -7);
        assert!((statics.read_f64(offset("HALF")).unwrap() - 0.5).abs() < f64::EPSILON);

        let greeting = statics.read_reference(offset("GREETING")).unwrap().unwrap();
        let record = loader.strings().intern_str("hi");
        assert_eq!(record.runtime_object(), Some(greeting));
        assert_eq!(heap.barrier_count(), 1);
    }

    #[test]
    fn mismatched_constant_fails_preparation() {
        let loader = loader_with(vec![class("a/Bad")
            .constant_field("WRONG", "J", Constant::Integer(1))
            .build()
            .unwrap()]);

        let bad = loader.load_class("a/Bad").unwrap();
        assert!(matches!(bad.prepare(&loader), Err(Error::Malformed { .. })));
        assert_eq!(bad.state(), ClassState::Error);
        assert!(matches!(bad.prepare(&loader), Err(Error::Malformed { .. })));
        assert_eq!(loader.stats().failed(), 1);
    }

    #[test]
    fn properties_follow_the_hierarchy() {
        let loader = loader_with(vec![
            class("a/Resource")
                .method("finalize", "()V", MethodAccessFlags::PROTECTED)
                .build()
                .unwrap(),
            class("a/File").extends("a/Resource").pinned().build().unwrap(),
            class("a/Wide")
                .aligned(32)
                .field("x", "I", FieldAccessFlags::PRIVATE)
                .build()
                .unwrap(),
        ]);

        let root = loader.resolve_and_prepare(ROOT_CLASS).unwrap();
        assert!(!root
            .prepared()
            .unwrap()
            .properties
            .contains(ClassProperties::FINALIZABLE));

        let file = loader.resolve_and_prepare("a/File").unwrap();
        let properties = file.prepared().unwrap().properties;
        assert!(properties.contains(ClassProperties::FINALIZABLE | ClassProperties::PINNED));

        let wide = loader.resolve_and_prepare("a/Wide").unwrap();
        let prepared = wide.prepared().unwrap();
        assert!(prepared.properties.contains(ClassProperties::ALIGNED));
        assert_eq!(prepared.alignment, 32);
        assert_eq!(prepared.instance_size, 32);
    }

    #[test]
    fn interfaces_have_no_instances() {
        let loader = loader_with(vec![
            interface("a/Readable")
                .abstract_method("read", "()I")
                .abstract_method("close", "()V")
                .build()
                .unwrap(),
        ]);

        let readable = loader.resolve_and_prepare("a/Readable").unwrap();
        let prepared = readable.prepared().unwrap();
        assert_eq!(prepared.instance_size, 0);
        assert!(prepared.vtable.is_none());
        assert!(prepared.interfaces.is_empty());
        assert!(!prepared.fast_subtype);

        let indices: Vec<u32> = readable
            .methods()
            .iter()
            .filter_map(|method| method.vtable_index())
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn unverified_class_cannot_be_prepared() {
        let loader = ClassLoader::new().unwrap();
        // Never loaded, so its ancestors are unknown
        let definition = class("a/Early").build().unwrap();
        let early = Arc::new(
            ClassEntity::from_definition(&definition, ClassId::next(), loader.strings()).unwrap(),
        );
        assert!(matches!(
            early.prepare(&loader),
            Err(Error::InvalidState { .. })
        ));
        assert_eq!(early.state(), ClassState::Start);
    }

    #[test]
    fn static_block_exhaustion() {
        let heap = Arc::new(SimpleHeap::with_budget(0));
        let starved = ClassLoader::with_services(
            LinkerConfig::default(),
            Services::default().with_heap(heap),
        )
        .unwrap();
        starved
            .define(
                class("a/Counter")
                    .field("count", "J", FieldAccessFlags::STATIC)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let error = starved.resolve_and_prepare("a/Counter").unwrap_err();
        assert!(matches!(error, Error::AncestorFailed { .. } | Error::OutOfMemory(_)));
        assert!(matches!(error.root_cause(), Error::OutOfMemory(_)));
    }
}
