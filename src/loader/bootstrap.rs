//! The classes every loader starts out with.
//!
//! Primitive classes are created directly in their final state. The root class, the two marker
//! interfaces every array implements, the string class and the class of type objects are
//! registered as definitions and linked on first use like any other class.

use std::sync::Arc;

use strum::IntoEnumIterator;
use tracing::debug;

use crate::{
    class::{ClassEntity, ClassId},
    classfile::{
        ClassDefinition, FieldAccessFlags, MethodAccessFlags, PrimitiveKind, ROOT_CLASS,
    },
    link::PreparedClass,
    loader::ClassLoader,
    Result,
};

/// Marker interface implemented by every array class
pub const CLONEABLE_INTERFACE: &str = "java/lang/Cloneable";
/// Marker interface implemented by every array class
pub const SERIALIZABLE_INTERFACE: &str = "java/io/Serializable";
/// Class of string constants
pub const STRING_CLASS: &str = "java/lang/String";
/// Class of runtime type objects
pub const CLASS_CLASS: &str = "java/lang/Class";

fn root_definition() -> Result<ClassDefinition> {
    ClassDefinition::builder(ROOT_CLASS)
        .method("<init>", "()V", MethodAccessFlags::PUBLIC)
        .method(
            "hashCode",
            "()I",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
        )
        .method("equals", "(Ljava/lang/Object;)Z", MethodAccessFlags::PUBLIC)
        .method("toString", "()Ljava/lang/String;", MethodAccessFlags::PUBLIC)
        .method(
            "getClass",
            "()Ljava/lang/Class;",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL | MethodAccessFlags::NATIVE,
        )
        .method(
            "clone",
            "()Ljava/lang/Object;",
            MethodAccessFlags::PROTECTED | MethodAccessFlags::NATIVE,
        )
        .method("finalize", "()V", MethodAccessFlags::PROTECTED)
        .build()
}

fn marker_definition(name: &str) -> Result<ClassDefinition> {
    ClassDefinition::builder(name).interface().build()
}

fn string_definition() -> Result<ClassDefinition> {
    ClassDefinition::builder(STRING_CLASS)
        .final_class()
        .implements(SERIALIZABLE_INTERFACE)
        .field(
            "value",
            "[C",
            FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
        )
        .field("hash", "I", FieldAccessFlags::PRIVATE)
        .method("<init>", "()V", MethodAccessFlags::PUBLIC)
        .method("length", "()I", MethodAccessFlags::PUBLIC)
        .method("hashCode", "()I", MethodAccessFlags::PUBLIC)
        .method(
            "intern",
            "()Ljava/lang/String;",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
        )
        .build()
}

fn class_definition() -> Result<ClassDefinition> {
    ClassDefinition::builder(CLASS_CLASS)
        .final_class()
        .implements(SERIALIZABLE_INTERFACE)
        .field(
            "vmClass",
            "J",
            FieldAccessFlags::PRIVATE | FieldAccessFlags::TRANSIENT,
        )
        .method(
            "getName",
            "()Ljava/lang/String;",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
        )
        .build()
}

/// Registers the primitive classes and the core definitions with a fresh loader
pub(crate) fn install(loader: &ClassLoader) -> Result<()> {
    for kind in PrimitiveKind::iter() {
        let class = Arc::new(ClassEntity::new_primitive(
            kind,
            ClassId::next(),
            loader.strings(),
            PreparedClass::primitive(kind, loader.config()),
        ));
        loader.register(&class);
    }

    loader.define(root_definition()?)?;
    loader.define(marker_definition(CLONEABLE_INTERFACE)?)?;
    loader.define(marker_definition(SERIALIZABLE_INTERFACE)?)?;
    loader.define(string_definition()?)?;
    loader.define(class_definition()?)?;

    debug!(classes = loader.len(), "bootstrap classes installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassState;

    #[test]
    fn primitives_are_ready() {
        let loader = ClassLoader::new().unwrap();
        for kind in PrimitiveKind::iter() {
            let class = loader.primitive_class(kind).unwrap();
            assert!(class.is_primitive());
            assert_eq!(class.state(), ClassState::Initialized);
            assert_eq!(class.instance_size(), Some(kind.size()));
        }
    }

    #[test]
    fn core_classes_link() {
        let loader = ClassLoader::new().unwrap();
        for name in [ROOT_CLASS, CLONEABLE_INTERFACE, SERIALIZABLE_INTERFACE, STRING_CLASS, CLASS_CLASS] {
            let class = loader.resolve_and_prepare(name).unwrap();
            assert!(class.state().is_at_least(ClassState::Prepared), "{name}");
        }

        let root = loader.get(ROOT_CLASS).unwrap();
        assert_eq!(root.depth(), Some(0));
        assert!(root.super_class().is_none());
        // hashCode, equals, toString, getClass, clone, finalize
        assert_eq!(root.vtable().unwrap().num_virtual_methods(), 6);

        let string = loader.get(STRING_CLASS).unwrap();
        assert!(string.is_final());
        assert_eq!(string.depth(), Some(1));
    }
}
