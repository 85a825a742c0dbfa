//! Collaborator seams of the linker.
//!
//! Class preparation depends on a handful of subsystems that are not part of this crate: the
//! garbage collector (allocation and write barriers), the code generator (compiled code and
//! throw-on-first-use stubs), the bytecode verifier and the static-initializer runner. Each of
//! them is consumed through a narrow trait; [`Services`] bundles one implementation of each.
//!
//! The default implementations ([`SimpleHeap`], [`StubCodeGenerator`], [`TrustingVerifier`],
//! [`NoopInitializer`]) are small but complete, so a [`crate::ClassLoader`] is usable out of
//! the box and the linking pipeline can be exercised without a real runtime behind it.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use classlink::{ClassLoader, LinkerConfig};
//! use classlink::services::{Services, SimpleHeap};
//!
//! // A heap that refuses to hand out more than 1 KiB
//! let services = Services::default().with_heap(Arc::new(SimpleHeap::with_budget(1024)));
//! let loader = ClassLoader::with_services(LinkerConfig::default(), services)?;
//! # Ok::<(), classlink::Error>(())
//! ```

mod codegen;
mod heap;
mod region;

use std::{fmt, num::NonZeroU64, sync::Arc};

pub use codegen::{CodeKind, StubCodeGenerator};
pub use heap::SimpleHeap;
pub use region::NoGcRegion;

use crate::{
    class::{ClassEntity, ClassId, ClassRc, Method},
    Result,
};

/// Opaque handle of a managed object owned by the garbage collector
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(NonZeroU64);

impl ObjectRef {
    /// Wraps a raw handle, `None` for the null handle
    #[must_use]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(ObjectRef)
    }

    /// Returns the raw handle value
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(0x{:x})", self.0)
    }
}

/// Address of executable code; `0` is never handed out by a code generator
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeAddress(pub u64);

impl CodeAddress {
    /// Creates a new code address from a raw value
    #[must_use]
    pub fn new(value: u64) -> Self {
        CodeAddress(value)
    }

    /// Returns the raw address
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeAddress(0x{:x})", self.0)
    }
}

impl fmt::Display for CodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// The storage a reference slot lives in, as reported to the write barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotHolder {
    /// A field of a heap object
    Object(ObjectRef),
    /// A slot in the static block of a class
    Statics(ClassId),
}

/// Allocation and barrier primitives of the garbage collector
pub trait Heap: Send + Sync {
    /// Allocates an object of `size` bytes whose runtime type is `class`.
    ///
    /// Returns `None` when the heap is exhausted. Must not be called from inside a
    /// [`NoGcRegion`].
    fn allocate(&self, size: usize, class: ClassId) -> Option<ObjectRef>;

    /// Reserves native memory for linker tables (static blocks, dispatch tables).
    ///
    /// Returns `false` when the request cannot be satisfied.
    fn reserve(&self, bytes: usize) -> bool;

    /// Records the store of `value` into the reference slot at `offset` of `holder`
    fn write_barrier(&self, holder: SlotHolder, offset: u32, value: ObjectRef);
}

/// Code generation entry points used while filling dispatch tables
///
/// From the linker's point of view these are pure functions: it only ever looks at the
/// returned address.
pub trait CodeGenerator: Send + Sync {
    /// Returns the current entry point of `method`, typically a stub that compiles on first call
    fn compile_or_stub(&self, method: &Method) -> CodeAddress;

    /// Returns a stub that raises an abstract-method error when `method` is invoked on `class`
    fn abstract_method_error_stub(&self, class: &ClassEntity, method: &Method) -> CodeAddress;

    /// Returns a stub that raises an illegal-access error when `method` is invoked on `class`
    fn illegal_access_error_stub(&self, class: &ClassEntity, method: &Method) -> CodeAddress;
}

/// Bytecode verification; must have succeeded before a class is prepared
pub trait Verifier: Send + Sync {
    /// Verifies the bytecode of `class`
    ///
    /// # Errors
    /// Returns [`crate::Error::Verify`] when the class is rejected.
    fn verify(&self, class: &ClassEntity) -> Result<()>;
}

/// Runs the user-level static initializer of a class
pub trait StaticInitializer: Send + Sync {
    /// Executes the static initializer of `class`, if it has one
    ///
    /// # Errors
    /// Returns [`crate::Error::Initializer`] when the initializer throws.
    fn run(&self, class: &ClassRc) -> Result<()>;
}

/// A verifier that accepts every class
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustingVerifier;

impl Verifier for TrustingVerifier {
    fn verify(&self, _class: &ClassEntity) -> Result<()> {
        Ok(())
    }
}

/// A static-initializer runner that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInitializer;

impl StaticInitializer for NoopInitializer {
    fn run(&self, _class: &ClassRc) -> Result<()> {
        Ok(())
    }
}

/// The set of collaborators a [`crate::ClassLoader`] links against
#[derive(Clone)]
pub struct Services {
    /// Allocation and write barriers
    pub heap: Arc<dyn Heap>,
    /// Code addresses and error stubs
    pub codegen: Arc<dyn CodeGenerator>,
    /// Bytecode verification
    pub verifier: Arc<dyn Verifier>,
    /// Static initializer execution
    pub initializer: Arc<dyn StaticInitializer>,
}

impl Default for Services {
    fn default() -> Self {
        Services {
            heap: Arc::new(SimpleHeap::new()),
            codegen: Arc::new(StubCodeGenerator::new()),
            verifier: Arc::new(TrustingVerifier),
            initializer: Arc::new(NoopInitializer),
        }
    }
}

impl Services {
    /// Replaces the heap
    #[must_use]
    pub fn with_heap(mut self, heap: Arc<dyn Heap>) -> Self {
        self.heap = heap;
        self
    }

    /// Replaces the code generator
    #[must_use]
    pub fn with_codegen(mut self, codegen: Arc<dyn CodeGenerator>) -> Self {
        self.codegen = codegen;
        self
    }

    /// Replaces the verifier
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replaces the static initializer runner
    #[must_use]
    pub fn with_initializer(mut self, initializer: Arc<dyn StaticInitializer>) -> Self {
        self.initializer = initializer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ref_rejects_null() {
        assert!(ObjectRef::new(0).is_none());
        assert_eq!(ObjectRef::new(42).map(|o| o.value()), Some(42));
    }

    #[test]
    fn code_address_display() {
        assert_eq!(CodeAddress::new(0x1000).to_string(), "0x1000");
        assert_eq!(format!("{:?}", CodeAddress::new(0x20)), "CodeAddress(0x20)");
    }
}
