//! Runtime class model.
//!
//! A [`ClassEntity`] is the runtime representation of one class, interface, array type or
//! primitive type. It is created from a [`ClassDefinition`] by the [`crate::ClassLoader`] and
//! then moves through the [`ClassState`] machine as the linker resolves its ancestors, verifies
//! it, prepares its layout and dispatch tables and finally initializes it.
//!
//! # Ownership
//!
//! Classes are shared through [`ClassRc`]. References up the hierarchy (superclass,
//! interfaces, array element type) are strong; the list of direct subclasses and implementors
//! holds [`ClassRef`] weak references, so the hierarchy never forms a reference cycle.
//!
//! # Thread Safety
//!
//! Everything that is computed after creation is published exactly once through a
//! `OnceLock` (ancestors, prepared layout, type object, field offsets, dispatch indices).
//! Readers never block; writers race only within the linker, which serialises preparation
//! per class.

mod constant_pool;
mod field;
mod method;
mod state;
mod statics;

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Condvar, Mutex, OnceLock, Weak,
    },
    thread::ThreadId,
};

use tracing::warn;

pub use constant_pool::{ConstantPool, ConstantValue, Resolved};
pub use field::{Field, FieldRc};
pub use method::{Method, MethodRc, CLASS_INITIALIZER_NAME, CONSTRUCTOR_NAME};
pub use state::ClassState;
pub use statics::StaticBlock;

pub(crate) use state::AtomicState;

use crate::{
    classfile::{ClassAccessFlags, ClassDefinition, PrimitiveKind, ROOT_CLASS},
    link::{PreparedClass, VTable},
    services::ObjectRef,
    strings::{InternedRef, StringPool},
    Error, Result,
};

static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(1);

/// Process-wide unique identity of a runtime class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Wraps a raw id
    #[must_use]
    pub fn new(value: u32) -> Self {
        ClassId(value)
    }

    /// The raw id
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    pub(crate) fn next() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared reference to a [`ClassEntity`]
pub type ClassRc = Arc<ClassEntity>;
/// Weak reference to a [`ClassEntity`]
pub type ClassRef = Weak<ClassEntity>;

/// What kind of type a class represents
#[derive(Debug)]
pub enum ClassKind {
    /// One of the primitive types
    Primitive(PrimitiveKind),
    /// An ordinary class
    Class,
    /// An interface
    Interface,
    /// An array type
    Array(ArrayInfo),
}

/// Element information of an array class
#[derive(Debug, Clone)]
pub struct ArrayInfo {
    /// Class of the elements, itself an array class for multi-dimensional arrays
    pub element: ClassRc,
    /// Number of dimensions, at least 1
    pub dimensions: u32,
}

/// The resolved direct ancestors of a class
#[derive(Debug, Clone)]
pub struct Ancestors {
    /// The superclass, `None` for the root class, primitives and interfaces of the root
    pub super_class: Option<ClassRc>,
    /// Direct super-interfaces, in declaration order
    pub interfaces: Vec<ClassRc>,
    /// Number of superclasses above this class, `0` for the root
    pub depth: u32,
}

/// The runtime representation of a class, interface, array or primitive type
pub struct ClassEntity {
    id: ClassId,
    name: InternedRef,
    display_name: String,
    kind: ClassKind,
    flags: ClassAccessFlags,
    super_name: Option<InternedRef>,
    interface_names: Vec<InternedRef>,
    pub(crate) ancestors: OnceLock<Ancestors>,
    children: boxcar::Vec<ClassRef>,
    fields: Vec<FieldRc>,
    methods: Vec<MethodRc>,
    constant_pool: ConstantPool,
    pinned: bool,
    alignment: Option<u32>,
    pub(crate) state: AtomicState,
    failure: OnceLock<Error>,
    pub(crate) prepare_lock: Mutex<()>,
    pub(crate) init_owner: Mutex<Option<ThreadId>>,
    pub(crate) init_done: Condvar,
    pub(crate) prepared: OnceLock<PreparedClass>,
    type_object: OnceLock<ObjectRef>,
}

fn display_name_of(name: &str) -> String {
    name.replace('/', ".")
}

impl ClassEntity {
    fn empty(id: ClassId, name: InternedRef, display_name: String, kind: ClassKind) -> Self {
        ClassEntity {
            id,
            name,
            display_name,
            kind,
            flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::ABSTRACT,
            super_name: None,
            interface_names: Vec::new(),
            ancestors: OnceLock::new(),
            children: boxcar::Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constant_pool: ConstantPool::empty(),
            pinned: false,
            alignment: None,
            state: AtomicState::new(ClassState::Start),
            failure: OnceLock::new(),
            prepare_lock: Mutex::new(()),
            init_owner: Mutex::new(None),
            init_done: Condvar::new(),
            prepared: OnceLock::new(),
            type_object: OnceLock::new(),
        }
    }

    /// Creates the runtime class for a definition
    pub(crate) fn from_definition(
        definition: &ClassDefinition,
        id: ClassId,
        strings: &StringPool,
    ) -> Result<ClassEntity> {
        let name = strings.intern_str(&definition.name);
        let kind = if definition.is_interface() {
            ClassKind::Interface
        } else {
            ClassKind::Class
        };

        let fields = definition
            .fields
            .iter()
            .map(|field| Field::new(field, id, strings).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        let methods = definition
            .methods
            .iter()
            .map(|method| Method::new(method, id, &name, strings).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(ClassEntity {
            flags: definition.flags,
            super_name: definition
                .super_name
                .as_deref()
                .map(|super_name| strings.intern_str(super_name)),
            interface_names: definition
                .interfaces
                .iter()
                .map(|interface| strings.intern_str(interface))
                .collect(),
            fields,
            methods,
            constant_pool: ConstantPool::new(&definition.constants, strings),
            pinned: definition.pinned,
            alignment: definition.alignment,
            ..Self::empty(id, name, display_name_of(&definition.name), kind)
        })
    }

    /// Creates the class of a primitive type, already in its final state
    pub(crate) fn new_primitive(
        kind: PrimitiveKind,
        id: ClassId,
        strings: &StringPool,
        prepared: PreparedClass,
    ) -> ClassEntity {
        let class = Self::empty(
            id,
            strings.intern_str(kind.class_name()),
            kind.class_name().to_string(),
            ClassKind::Primitive(kind),
        );
        let _ = class.ancestors.set(Ancestors {
            super_class: None,
            interfaces: Vec::new(),
            depth: 0,
        });
        let _ = class.prepared.set(prepared);
        class.state.raise(ClassState::Initialized);
        class
    }

    /// Creates an array class whose ancestors are already resolved
    ///
    /// Array classes need no verification, so they start out verified and are ready to be
    /// prepared.
    pub(crate) fn new_array(
        id: ClassId,
        name: InternedRef,
        element: ClassRc,
        ancestors: Ancestors,
    ) -> ClassEntity {
        let dimensions = match &element.kind {
            ClassKind::Array(inner) => inner.dimensions + 1,
            _ => 1,
        };
        let display_name = format!("{}[]", element.display_name);
        let class = ClassEntity {
            super_name: ancestors
                .super_class
                .as_ref()
                .map(|super_class| super_class.name.clone()),
            interface_names: ancestors
                .interfaces
                .iter()
                .map(|interface| interface.name.clone())
                .collect(),
            ..Self::empty(
                id,
                name,
                display_name,
                ClassKind::Array(ArrayInfo {
                    element,
                    dimensions,
                }),
            )
        };
        let _ = class.ancestors.set(ancestors);
        class.state.raise(ClassState::BytecodesVerified);
        class
    }

    /// Process-wide unique id
    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Internal name (`java/lang/String`, `[I`, `int`)
    #[must_use]
    pub fn name(&self) -> &InternedRef {
        &self.name
    }

    /// Human readable name (`java.lang.String`, `int[]`, `int`)
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// What kind of type this class represents
    #[must_use]
    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    /// Access flags
    #[must_use]
    pub fn flags(&self) -> ClassAccessFlags {
        self.flags
    }

    /// `true` for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface)
    }

    /// `true` for array classes
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array(_))
    }

    /// `true` for primitive classes
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, ClassKind::Primitive(_))
    }

    /// `true` for abstract classes and interfaces
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(ClassAccessFlags::ABSTRACT)
    }

    /// `true` for classes that cannot be subclassed
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags.contains(ClassAccessFlags::FINAL)
    }

    /// `true` for the root of the class hierarchy
    #[must_use]
    pub fn is_root(&self) -> bool {
        *self.name == ROOT_CLASS
    }

    /// Element information, for array classes
    #[must_use]
    pub fn array_info(&self) -> Option<&ArrayInfo> {
        match &self.kind {
            ClassKind::Array(info) => Some(info),
            _ => None,
        }
    }

    /// The primitive kind, for primitive classes
    #[must_use]
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match &self.kind {
            ClassKind::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Declared superclass name
    #[must_use]
    pub fn super_name(&self) -> Option<&InternedRef> {
        self.super_name.as_ref()
    }

    /// Declared interface names
    #[must_use]
    pub fn interface_names(&self) -> &[InternedRef] {
        &self.interface_names
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ClassState {
        self.state.load()
    }

    /// The error that moved this class into [`ClassState::Error`]
    #[must_use]
    pub fn failure(&self) -> Option<Error> {
        self.failure.get().cloned()
    }

    /// Records `error` as the failure of this class and enters the error state
    ///
    /// Only the first failure is kept; the recorded failure is returned.
    pub(crate) fn fail(&self, error: Error) -> Error {
        let recorded = self
            .failure
            .get_or_init(|| {
                warn!(class = %self.name, %error, "class entered error state");
                error
            })
            .clone();
        self.state.fail();
        recorded
    }

    /// The recorded failure, or an invalid-state error if none was recorded
    pub(crate) fn failure_or_state_error(&self, expected: ClassState) -> Error {
        self.failure().unwrap_or_else(|| Error::InvalidState {
            class: self.name.to_string(),
            state: self.state().name(),
            expected: expected.name(),
        })
    }

    /// Resolved ancestors, once loaded
    #[must_use]
    pub fn ancestors(&self) -> Option<&Ancestors> {
        self.ancestors.get()
    }

    /// The superclass, once loaded
    #[must_use]
    pub fn super_class(&self) -> Option<&ClassRc> {
        self.ancestors.get().and_then(|a| a.super_class.as_ref())
    }

    /// Direct super-interfaces, once loaded
    #[must_use]
    pub fn direct_interfaces(&self) -> &[ClassRc] {
        self.ancestors
            .get()
            .map_or(&[], |ancestors| ancestors.interfaces.as_slice())
    }

    /// Depth in the class hierarchy, `0` for the root; `None` until loaded
    #[must_use]
    pub fn depth(&self) -> Option<u32> {
        self.ancestors.get().map(|ancestors| ancestors.depth)
    }

    pub(crate) fn add_child(&self, child: &ClassRc) {
        self.children.push(Arc::downgrade(child));
    }

    /// Direct subclasses, or direct implementors and sub-interfaces for interfaces
    #[must_use]
    pub fn children(&self) -> Vec<ClassRc> {
        self.children
            .iter()
            .filter_map(|(_, child)| child.upgrade())
            .collect()
    }

    /// Declared fields
    #[must_use]
    pub fn fields(&self) -> &[FieldRc] {
        &self.fields
    }

    /// Declared methods
    #[must_use]
    pub fn methods(&self) -> &[MethodRc] {
        &self.methods
    }

    /// Methods that occupy an interface-table slot, in slot order
    pub fn interface_methods(&self) -> impl Iterator<Item = &MethodRc> {
        self.methods
            .iter()
            .filter(|method| method.is_virtual())
    }

    /// The runtime constant pool
    #[must_use]
    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    /// `true` if instances must never be moved
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Requested instance alignment, if any
    #[must_use]
    pub fn alignment_hint(&self) -> Option<u32> {
        self.alignment
    }

    /// Layout and dispatch tables, once prepared
    #[must_use]
    pub fn prepared(&self) -> Option<&PreparedClass> {
        self.prepared.get()
    }

    /// The virtual method table, once prepared; interfaces and primitives have none
    #[must_use]
    pub fn vtable(&self) -> Option<&Arc<VTable>> {
        self.prepared.get().and_then(|prepared| prepared.vtable.as_ref())
    }

    /// Size of an instance in bytes, once prepared
    #[must_use]
    pub fn instance_size(&self) -> Option<u32> {
        self.prepared.get().map(|prepared| prepared.instance_size)
    }

    /// Static field storage, once prepared
    #[must_use]
    pub fn statics(&self) -> Option<&StaticBlock> {
        self.prepared.get().map(|prepared| &prepared.statics)
    }

    /// The runtime type object (mirror) of this class, once created
    #[must_use]
    pub fn type_object(&self) -> Option<ObjectRef> {
        self.type_object.get().copied()
    }

    /// Binds the mirror unless one was bound first; returns the bound mirror
    ///
    /// `on_bind` runs only for the winning object, before any other thread can observe it.
    pub(crate) fn bind_type_object(
        &self,
        object: ObjectRef,
        on_bind: impl FnOnce(ObjectRef),
    ) -> ObjectRef {
        *self.type_object.get_or_init(|| {
            on_bind(object);
            object
        })
    }

    /// Finds a declared method by name and descriptor
    #[must_use]
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<MethodRc> {
        self.methods
            .iter()
            .find(|method| method.matches(name, descriptor))
            .cloned()
    }

    /// Finds a declared field by name
    #[must_use]
    pub fn declared_field(&self, name: &str) -> Option<FieldRc> {
        self.fields.iter().find(|field| **field.name() == name).cloned()
    }

    /// Looks a field up in this class, its super-interfaces and then its superclasses
    #[must_use]
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<FieldRc> {
        if let Some(field) = self.fields.iter().find(|f| f.matches(name, descriptor)) {
            return Some(field.clone());
        }
        for interface in self.direct_interfaces() {
            if let Some(field) = interface.find_field(name, descriptor) {
                return Some(field);
            }
        }
        self.super_class()
            .and_then(|super_class| super_class.find_field(name, descriptor))
    }

    /// Looks a method up in this class and its superclasses, then in all super-interfaces
    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<MethodRc> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(method) = class.declared_method(name, descriptor) {
                return Some(method);
            }
            current = class.super_class().map(Arc::as_ref);
        }

        let mut current = Some(self);
        while let Some(class) = current {
            for interface in class.direct_interfaces() {
                if let Some(method) = interface.find_method(name, descriptor) {
                    return Some(method);
                }
            }
            current = class.super_class().map(Arc::as_ref);
        }
        None
    }
}

impl fmt::Display for ClassEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for ClassEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassEntity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
