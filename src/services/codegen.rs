use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::{
    class::{ClassEntity, Method},
    services::{CodeAddress, CodeGenerator},
};

/// What a code address handed out by [`StubCodeGenerator`] stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeKind {
    /// Compile-on-first-call stub of a method
    CompileStub(String),
    /// Compiled code of a method
    Compiled(String),
    /// Stub raising an abstract-method error
    AbstractMethodError(String),
    /// Stub raising an illegal-access error
    IllegalAccessError(String),
}

/// A code generator that hands out unique, distinguishable addresses
///
/// No machine code is produced; every address is remembered together with what it stands for,
/// which is enough for the linker (it only stores addresses) and for inspecting the result.
pub struct StubCodeGenerator {
    next: AtomicU64,
    kinds: DashMap<CodeAddress, CodeKind>,
}

impl StubCodeGenerator {
    /// Alignment of handed out addresses
    const CODE_ALIGNMENT: u64 = 16;

    /// Creates a new generator
    #[must_use]
    pub fn new() -> Self {
        StubCodeGenerator {
            next: AtomicU64::new(0x1_0000),
            kinds: DashMap::new(),
        }
    }

    fn emit(&self, kind: CodeKind) -> CodeAddress {
        let address = CodeAddress::new(self.next.fetch_add(Self::CODE_ALIGNMENT, Ordering::Relaxed));
        self.kinds.insert(address, kind);
        address
    }

    /// Produces "compiled" code for `method`, to be installed with [`Method::replace_code`]
    pub fn compile(&self, method: &Method) -> CodeAddress {
        self.emit(CodeKind::Compiled(method.to_string()))
    }

    /// Returns what `address` stands for, if it was handed out by this generator
    #[must_use]
    pub fn kind_of(&self, address: CodeAddress) -> Option<CodeKind> {
        self.kinds.get(&address).map(|entry| entry.value().clone())
    }

    /// Number of addresses handed out so far
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.kinds.len()
    }
}

impl Default for StubCodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for StubCodeGenerator {
    fn compile_or_stub(&self, method: &Method) -> CodeAddress {
        self.emit(CodeKind::CompileStub(method.to_string()))
    }

    fn abstract_method_error_stub(&self, class: &ClassEntity, method: &Method) -> CodeAddress {
        self.emit(CodeKind::AbstractMethodError(format!(
            "{}.{}{}",
            class.name(),
            method.name(),
            method.descriptor()
        )))
    }

    fn illegal_access_error_stub(&self, class: &ClassEntity, method: &Method) -> CodeAddress {
        self.emit(CodeKind::IllegalAccessError(format!(
            "{}.{}{}",
            class.name(),
            method.name(),
            method.descriptor()
        )))
    }
}
