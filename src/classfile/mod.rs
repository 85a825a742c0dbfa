//! Linker input: parsed class definitions.
//!
//! Everything in this module is plain immutable data produced by a class-file parser (or by
//! [`ClassDefinitionBuilder`] in tests and embedders). None of it carries runtime state.
//!
//! # Key Components
//!
//! - [`ClassDefinition`] - One parsed class with its fields, methods and constant pool
//! - [`ClassDefinitionBuilder`] - Fluent construction of definitions
//! - [`FieldType`], [`MethodDescriptor`] - Parsed type descriptors
//! - [`Constant`] - Constant pool entries
//! - [`ClassAccessFlags`], [`FieldAccessFlags`], [`MethodAccessFlags`] - Access flags
//! - [`PrimitiveKind`] - The primitive types

mod constant;
mod definition;
mod descriptor;
mod flags;
mod primitive;

pub use constant::Constant;
pub use definition::{
    ClassDefinition, ClassDefinitionBuilder, FieldDefinition, MethodDefinition, ROOT_CLASS,
};
pub use descriptor::{FieldType, MethodDescriptor, MAX_ARRAY_DIMENSIONS};
pub use flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, Visibility};
pub use primitive::PrimitiveKind;
