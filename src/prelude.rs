//! # classlink Prelude
//!
//! The types needed to define classes, link them and inspect the result. Import with
//! `use classlink::prelude::*;`.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classlink operations
pub use crate::Error;

/// The result type used throughout classlink
pub use crate::Result;

/// Layout configuration
pub use crate::LinkerConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Registry and linking driver
pub use crate::loader::{
    ClassLoader, LinkStats, CLASS_CLASS, CLONEABLE_INTERFACE, SERIALIZABLE_INTERFACE,
    STRING_CLASS,
};

// ================================================================================================
// Class Definitions
// ================================================================================================

/// Input model
pub use crate::classfile::{
    ClassAccessFlags, ClassDefinition, ClassDefinitionBuilder, Constant, FieldAccessFlags,
    FieldDefinition, FieldType, MethodAccessFlags, MethodDefinition, MethodDescriptor,
    PrimitiveKind, Visibility, ROOT_CLASS,
};

// ================================================================================================
// Runtime Class Model
// ================================================================================================

/// Classes, members and their state
pub use crate::class::{
    ClassEntity, ClassId, ClassKind, ClassRc, ClassState, ConstantPool, ConstantValue, Field,
    FieldRc, Method, MethodRc, Resolved, StaticBlock,
};

/// Linking results
pub use crate::link::{
    ClassProperties, InstanceLayout, InterfaceEntry, PreparedClass, SlotTarget, VTable,
    VTableSlot,
};

// ================================================================================================
// Strings and Collaborators
// ================================================================================================

/// Interned strings
pub use crate::strings::{InternedRef, InternedString, StringPool};

/// Collaborator traits and defaults
pub use crate::services::{
    CodeAddress, CodeGenerator, Heap, NoGcRegion, ObjectRef, Services, SimpleHeap,
    StaticInitializer, StubCodeGenerator, Verifier,
};
