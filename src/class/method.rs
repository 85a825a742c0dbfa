use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use tracing::trace;

use crate::{
    class::{ClassEntity, ClassId},
    classfile::{MethodAccessFlags, MethodDefinition, MethodDescriptor, Visibility},
    link::PatchSite,
    services::{CodeAddress, CodeGenerator},
    strings::{InternedRef, StringPool},
    Result,
};

/// Shared reference to a [`Method`]
pub type MethodRc = Arc<Method>;

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// Name of static initializers
pub const CLASS_INITIALIZER_NAME: &str = "<clinit>";

/// A method of a runtime class
///
/// Besides the declared data a method carries its dispatch-table index (assigned once during
/// preparation of the declaring class), its current entry point and the list of dispatch-table
/// slots that were filled with that entry point, so that a recompiled method can be patched
/// into every table that references it.
pub struct Method {
    name: InternedRef,
    descriptor: InternedRef,
    signature: MethodDescriptor,
    flags: MethodAccessFlags,
    code: Option<Box<[u8]>>,
    class_id: ClassId,
    class_name: InternedRef,
    fake: bool,
    vtable_index: OnceLock<u32>,
    overridden: AtomicBool,
    entry: AtomicU64,
    patch_sites: Mutex<Vec<PatchSite>>,
}

impl Method {
    pub(crate) fn new(
        definition: &MethodDefinition,
        class_id: ClassId,
        class_name: &InternedRef,
        strings: &StringPool,
    ) -> Result<Method> {
        Ok(Method {
            name: strings.intern_str(&definition.name),
            descriptor: strings.intern_str(&definition.descriptor),
            signature: MethodDescriptor::parse(&definition.descriptor)?,
            flags: definition.flags,
            code: definition.code.as_deref().map(Box::from),
            class_id,
            class_name: class_name.clone(),
            fake: false,
            vtable_index: OnceLock::new(),
            overridden: AtomicBool::new(false),
            entry: AtomicU64::new(0),
            patch_sites: Mutex::new(Vec::new()),
        })
    }

    /// Creates a placeholder for an interface method an abstract class leaves unimplemented
    pub(crate) fn fake(class_id: ClassId, class_name: &InternedRef, interface_method: &Method) -> Method {
        Method {
            name: interface_method.name.clone(),
            descriptor: interface_method.descriptor.clone(),
            signature: interface_method.signature.clone(),
            flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            code: None,
            class_id,
            class_name: class_name.clone(),
            fake: true,
            vtable_index: OnceLock::new(),
            overridden: AtomicBool::new(false),
            entry: AtomicU64::new(0),
            patch_sites: Mutex::new(Vec::new()),
        }
    }

    /// Simple name
    #[must_use]
    pub fn name(&self) -> &InternedRef {
        &self.name
    }

    /// Method descriptor text
    #[must_use]
    pub fn descriptor(&self) -> &InternedRef {
        &self.descriptor
    }

    /// Parsed method descriptor
    #[must_use]
    pub fn signature(&self) -> &MethodDescriptor {
        &self.signature
    }

    /// Access flags
    #[must_use]
    pub fn flags(&self) -> MethodAccessFlags {
        self.flags
    }

    /// Bytecode, if the method has a body
    #[must_use]
    pub fn code(&self) -> Option<&[u8]> {
        self.code.as_deref()
    }

    /// Id of the declaring class
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Internal name of the declaring class
    #[must_use]
    pub fn class_name(&self) -> &InternedRef {
        &self.class_name
    }

    /// Package part of the declaring class name, empty for the unnamed package
    #[must_use]
    pub fn package(&self) -> &[u8] {
        let name = self.class_name.as_bytes();
        match name.iter().rposition(|b| *b == b'/') {
            Some(pos) => &name[..pos],
            None => &[],
        }
    }

    /// `true` if both methods are declared in the same package
    #[must_use]
    pub fn same_package(&self, other: &Method) -> bool {
        self.package() == other.package()
    }

    /// `true` for placeholders synthesized for abstract classes
    #[must_use]
    pub fn is_fake(&self) -> bool {
        self.fake
    }

    /// Visibility derived from the access flags
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.flags.visibility()
    }

    /// `true` for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAccessFlags::STATIC)
    }

    /// `true` for private methods
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.flags.contains(MethodAccessFlags::PRIVATE)
    }

    /// `true` for public methods
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags.contains(MethodAccessFlags::PUBLIC)
    }

    /// `true` for final methods
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags.contains(MethodAccessFlags::FINAL)
    }

    /// `true` for methods without implementation
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAccessFlags::ABSTRACT)
    }

    /// `true` for instance constructors
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        *self.name == CONSTRUCTOR_NAME
    }

    /// `true` for the static initializer
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        *self.name == CLASS_INITIALIZER_NAME
    }

    /// `true` if the method is dispatched through a vtable or interface-table slot
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.is_private() && !self.is_constructor() && !self.is_class_initializer()
    }

    /// `true` if both methods have the same name and descriptor
    #[must_use]
    pub fn same_signature(&self, other: &Method) -> bool {
        self.name == other.name && self.descriptor == other.descriptor
    }

    /// `true` if `name` and `descriptor` match this method
    #[must_use]
    pub fn matches(&self, name: &str, descriptor: &str) -> bool {
        *self.name == name && *self.descriptor == descriptor
    }

    /// Index in the dispatch table, assigned when the declaring class is prepared
    ///
    /// For interface methods this is the index within the interface's slot range.
    #[must_use]
    pub fn vtable_index(&self) -> Option<u32> {
        self.vtable_index.get().copied()
    }

    pub(crate) fn assign_vtable_index(&self, index: u32) -> Result<()> {
        self.vtable_index
            .set(index)
            .map_err(|_| malformed_error!("Dispatch index of {} assigned twice", self))
    }

    /// `true` once a subclass has overridden this method
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        self.overridden.load(Ordering::Acquire)
    }

    pub(crate) fn mark_overridden(&self) {
        self.overridden.store(true, Ordering::Release);
    }

    /// Current entry point, `None` until a dispatch table referenced the method
    #[must_use]
    pub fn entry_point(&self) -> Option<CodeAddress> {
        match self.entry.load(Ordering::Acquire) {
            0 => None,
            raw => Some(CodeAddress::new(raw)),
        }
    }

    /// Returns the entry point, asking `codegen` for one on first use
    ///
    /// Abstract methods receive a stub that raises an abstract-method error for `class`.
    pub(crate) fn ensure_entry_point(
        &self,
        codegen: &dyn CodeGenerator,
        class: &ClassEntity,
    ) -> CodeAddress {
        if let Some(entry) = self.entry_point() {
            return entry;
        }

        let candidate = if self.is_abstract() {
            codegen.abstract_method_error_stub(class, self)
        } else {
            codegen.compile_or_stub(self)
        };
        match self
            .entry
            .compare_exchange(0, candidate.value(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => candidate,
            Err(existing) => CodeAddress::new(existing),
        }
    }

    pub(crate) fn register_patch_site(&self, site: PatchSite) -> Result<()> {
        lock!(self.patch_sites).push(site);
        Ok(())
    }

    /// Number of dispatch-table slots that currently hold this method's entry point
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the patch list is poisoned.
    pub fn patch_site_count(&self) -> Result<usize> {
        Ok(lock!(self.patch_sites)
            .iter()
            .filter(|site| site.is_live())
            .count())
    }

    /// Installs a new entry point and rewrites every dispatch-table slot holding the old one
    ///
    /// Slots are updated with a compare-and-swap from the old to the new address, so a slot
    /// that was changed by other means in the meantime is left alone. Sites whose table was
    /// dropped are forgotten. Returns the number of slots that were rewritten.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the patch list is poisoned.
    pub fn replace_code(&self, code: CodeAddress) -> Result<usize> {
        let mut sites = lock!(self.patch_sites);
        let old = CodeAddress::new(self.entry.swap(code.value(), Ordering::AcqRel));

        let mut patched = 0;
        sites.retain(|site| match site.patch(old, code) {
            Some(updated) => {
                if updated {
                    patched += 1;
                }
                true
            }
            None => false,
        });

        trace!(method = %self, old = %old, new = %code, patched, "replaced method code");
        Ok(patched)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("method", &format_args!("{self}"))
            .field("flags", &self.flags)
            .field("fake", &self.fake)
            .field("vtable_index", &self.vtable_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::MethodDefinition;

    fn method(class: &str, name: &str, desc: &str, flags: MethodAccessFlags) -> Method {
        let pool = StringPool::new(16);
        let class_name = pool.intern_str(class);
        Method::new(
            &MethodDefinition::new(name, desc, flags),
            ClassId::new(7),
            &class_name,
            &pool,
        )
        .unwrap()
    }

    #[test]
    fn classification() {
        let init = method("a/B", "<init>", "()V", MethodAccessFlags::PUBLIC);
        assert!(init.is_constructor());
        assert!(!init.is_virtual());

        let run = method("a/B", "run", "()V", MethodAccessFlags::PUBLIC);
        assert!(run.is_virtual());
        assert_eq!(run.to_string(), "a/B.run()V");

        let helper = method("a/B", "helper", "()V", MethodAccessFlags::PRIVATE);
        assert!(!helper.is_virtual());

        let stat = method("a/B", "of", "(I)La/B;", MethodAccessFlags::STATIC);
        assert!(!stat.is_virtual());
        assert_eq!(stat.signature().params.len(), 1);
    }

    #[test]
    fn packages() {
        let a = method("p/q/A", "m", "()V", MethodAccessFlags::empty());
        let b = method("p/q/B", "m", "()V", MethodAccessFlags::empty());
        let c = method("p/C", "m", "()V", MethodAccessFlags::empty());
        let d = method("D", "m", "()V", MethodAccessFlags::empty());

        assert_eq!(a.package(), b"p/q");
        assert!(a.same_package(&b));
        assert!(!a.same_package(&c));
        assert!(d.package().is_empty());
        assert!(a.same_signature(&c));
    }

    #[test]
    fn vtable_index_is_write_once() {
        let m = method("a/B", "run", "()V", MethodAccessFlags::PUBLIC);
        assert!(m.assign_vtable_index(3).is_ok());
        assert!(m.assign_vtable_index(4).is_err());
        assert_eq!(m.vtable_index(), Some(3));
    }

    #[test]
    fn replace_code_without_sites() {
        let m = method("a/B", "run", "()V", MethodAccessFlags::PUBLIC);
        assert!(m.entry_point().is_none());
        assert_eq!(m.replace_code(CodeAddress::new(0x40)).unwrap(), 0);
        assert_eq!(m.entry_point(), Some(CodeAddress::new(0x40)));
    }
}
