//! Parsed class definitions and a fluent builder for them.
//!
//! A [`ClassDefinition`] is the input of the linker: the already-parsed content of one class
//! file. It is immutable data; all runtime state lives on [`crate::class::ClassEntity`].
//!
//! # Example
//!
//! ```rust
//! use classlink::classfile::{ClassDefinition, Constant, FieldAccessFlags, MethodAccessFlags};
//!
//! let point = ClassDefinition::builder("geo/Point")
//!     .implements("java/io/Serializable")
//!     .field("x", "I", FieldAccessFlags::PRIVATE)
//!     .field("y", "I", FieldAccessFlags::PRIVATE)
//!     .constant_field("ORIGIN_NAME", "Ljava/lang/String;", Constant::Utf8("origin".into()))
//!     .method("length", "()D", MethodAccessFlags::PUBLIC)
//!     .build()?;
//!
//! assert_eq!(point.super_name.as_deref(), Some("java/lang/Object"));
//! assert_eq!(point.fields.len(), 3);
//! # Ok::<(), classlink::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    classfile::{
        ClassAccessFlags, Constant, FieldAccessFlags, FieldType, MethodAccessFlags,
        MethodDescriptor,
    },
    Result,
};

/// Internal name of the root class every other class descends from
pub const ROOT_CLASS: &str = "java/lang/Object";

/// A field as declared in a class definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Simple field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Access flags
    pub flags: FieldAccessFlags,
    /// Constant pool index of the initial value of a static field
    pub constant_value: Option<u16>,
    /// Overrides the storage size derived from the descriptor
    pub size_override: Option<u32>,
}

/// A method as declared in a class definition
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    /// Simple method name, `<init>` and `<clinit>` included
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Access flags
    pub flags: MethodAccessFlags,
    /// Bytecode, absent for abstract and native methods
    pub code: Option<Vec<u8>>,
}

impl MethodDefinition {
    /// Creates a method definition; concrete non-native methods get a trivial `return` body
    #[must_use]
    pub fn new(name: &str, descriptor: &str, flags: MethodAccessFlags) -> Self {
        let code = if flags.intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE) {
            None
        } else {
            // return
            Some(vec![0xB1])
        };
        MethodDefinition {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags,
            code,
        }
    }
}

/// The parsed content of one class file
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    /// Internal name (`java/lang/String`)
    pub name: String,
    /// Internal name of the superclass; `None` only for the root class
    pub super_name: Option<String>,
    /// Internal names of the directly implemented (or extended) interfaces
    pub interfaces: Vec<String>,
    /// Class access flags
    pub flags: ClassAccessFlags,
    /// Declared fields
    pub fields: Vec<FieldDefinition>,
    /// Declared methods
    pub methods: Vec<MethodDefinition>,
    /// Constant pool, entry `i` has index `i + 1`
    pub constants: Vec<Constant>,
    /// Instances must never be moved by the collector
    pub pinned: bool,
    /// Required instance alignment, a power of two
    pub alignment: Option<u32>,
}

impl ClassDefinition {
    /// Starts building a public class named `name` that extends the root class
    #[must_use]
    pub fn builder(name: &str) -> ClassDefinitionBuilder {
        ClassDefinitionBuilder::new(name)
    }

    /// `true` if this defines an interface
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Returns the constant at the 1-based `index`
    #[must_use]
    pub fn constant(&self, index: u16) -> Option<&Constant> {
        if index == 0 {
            return None;
        }
        self.constants.get(usize::from(index) - 1)
    }

    /// Checks descriptors, flags and constant pool references for consistency
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.starts_with('[') || self.name.contains('.') {
            return Err(malformed_error!("Invalid class name - {:?}", self.name));
        }
        if let Some(alignment) = self.alignment {
            if !alignment.is_power_of_two() {
                return Err(malformed_error!(
                    "Alignment of {} is not a power of two - {}",
                    self.name,
                    alignment
                ));
            }
        }
        if self.is_interface() && !self.flags.contains(ClassAccessFlags::ABSTRACT) {
            return Err(malformed_error!(
                "Interface {} is not marked abstract",
                self.name
            ));
        }
        if self.constants.len() >= usize::from(u16::MAX) {
            return Err(malformed_error!(
                "Constant pool of {} has too many entries",
                self.name
            ));
        }

        for field in &self.fields {
            FieldType::parse(&field.descriptor)?;
            if field.size_override == Some(0) {
                return Err(malformed_error!(
                    "Field {}.{} has a storage size of zero",
                    self.name,
                    field.name
                ));
            }
            if let Some(index) = field.constant_value {
                let constant = self.constant(index).ok_or_else(|| {
                    malformed_error!(
                        "Field {}.{} references missing constant #{}",
                        self.name,
                        field.name,
                        index
                    )
                })?;
                if !constant.is_loadable_value() {
                    return Err(malformed_error!(
                        "Field {}.{} has a {} as constant value",
                        self.name,
                        field.name,
                        constant.kind()
                    ));
                }
            }
        }

        for method in &self.methods {
            MethodDescriptor::parse(&method.descriptor)?;
            let body_expected = !method
                .flags
                .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE);
            if body_expected != method.code.is_some() {
                return Err(malformed_error!(
                    "Method {}.{}{} has inconsistent code presence",
                    self.name,
                    method.name,
                    method.descriptor
                ));
            }
        }

        Ok(())
    }
}

/// Fluent builder for [`ClassDefinition`]
///
/// Constant pool helpers ([`ClassDefinitionBuilder::utf8`], [`ClassDefinitionBuilder::class_ref`],
/// ...) deduplicate their entries and return the 1-based index.
pub struct ClassDefinitionBuilder {
    definition: ClassDefinition,
    utf8_index: HashMap<String, u16>,
}

impl ClassDefinitionBuilder {
    /// Creates a builder for a public class named `name` extending the root class
    ///
    /// ## Arguments
    /// * 'name' - The internal name of the class
    #[must_use]
    pub fn new(name: &str) -> Self {
        let super_name = if name == ROOT_CLASS {
            None
        } else {
            Some(ROOT_CLASS.to_string())
        };
        ClassDefinitionBuilder {
            definition: ClassDefinition {
                name: name.to_string(),
                super_name,
                interfaces: Vec::new(),
                flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
                fields: Vec::new(),
                methods: Vec::new(),
                constants: Vec::new(),
                pinned: false,
                alignment: None,
            },
            utf8_index: HashMap::new(),
        }
    }

    /// Sets the superclass
    #[must_use]
    pub fn extends(mut self, super_name: &str) -> Self {
        self.definition.super_name = Some(super_name.to_string());
        self
    }

    /// Removes the superclass; only legal for the root class
    #[must_use]
    pub fn no_super(mut self) -> Self {
        self.definition.super_name = None;
        self
    }

    /// Adds a directly implemented interface (or super-interface, for interfaces)
    #[must_use]
    pub fn implements(mut self, interface: &str) -> Self {
        self.definition.interfaces.push(interface.to_string());
        self
    }

    /// Replaces the class flags
    #[must_use]
    pub fn flags(mut self, flags: ClassAccessFlags) -> Self {
        self.definition.flags = flags;
        self
    }

    /// Turns the definition into a public interface
    #[must_use]
    pub fn interface(mut self) -> Self {
        self.definition.flags = ClassAccessFlags::PUBLIC
            | ClassAccessFlags::INTERFACE
            | ClassAccessFlags::ABSTRACT;
        self.definition.super_name = Some(ROOT_CLASS.to_string());
        self
    }

    /// Marks the class abstract
    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.definition.flags |= ClassAccessFlags::ABSTRACT;
        self
    }

    /// Marks the class final
    #[must_use]
    pub fn final_class(mut self) -> Self {
        self.definition.flags |= ClassAccessFlags::FINAL;
        self
    }

    /// Requests that instances are never moved
    #[must_use]
    pub fn pinned(mut self) -> Self {
        self.definition.pinned = true;
        self
    }

    /// Requests a custom instance alignment
    #[must_use]
    pub fn aligned(mut self, alignment: u32) -> Self {
        self.definition.alignment = Some(alignment);
        self
    }

    /// Adds a field
    #[must_use]
    pub fn field(mut self, name: &str, descriptor: &str, flags: FieldAccessFlags) -> Self {
        self.definition.fields.push(FieldDefinition {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags,
            constant_value: None,
            size_override: None,
        });
        self
    }

    /// Adds an instance field with an explicit storage size
    #[must_use]
    pub fn sized_field(mut self, name: &str, descriptor: &str, size: u32) -> Self {
        self.definition.fields.push(FieldDefinition {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags: FieldAccessFlags::PRIVATE,
            constant_value: None,
            size_override: Some(size),
        });
        self
    }

    /// Adds a `public static final` field initialized from `value`
    ///
    /// A [`Constant::Utf8`] value is stored as a string literal.
    #[must_use]
    pub fn constant_field(mut self, name: &str, descriptor: &str, value: Constant) -> Self {
        let index = match value {
            Constant::Utf8(text) => self.string(&text),
            other => self.push_constant(other),
        };
        self.definition.fields.push(FieldDefinition {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags: FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            constant_value: Some(index),
            size_override: None,
        });
        self
    }

    /// Adds a method; concrete non-native methods get a trivial body
    #[must_use]
    pub fn method(mut self, name: &str, descriptor: &str, flags: MethodAccessFlags) -> Self {
        self.definition
            .methods
            .push(MethodDefinition::new(name, descriptor, flags));
        self
    }

    /// Adds a `public abstract` method
    #[must_use]
    pub fn abstract_method(self, name: &str, descriptor: &str) -> Self {
        self.method(
            name,
            descriptor,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        )
    }

    /// Appends a raw constant and returns its index
    pub fn push_constant(&mut self, constant: Constant) -> u16 {
        self.definition.constants.push(constant);
        u16::try_from(self.definition.constants.len()).unwrap_or(u16::MAX)
    }

    /// Returns the index of a `Utf8` entry holding `text`, adding it if needed
    pub fn utf8(&mut self, text: &str) -> u16 {
        if let Some(index) = self.utf8_index.get(text) {
            return *index;
        }
        let index = self.push_constant(Constant::Utf8(text.to_string()));
        self.utf8_index.insert(text.to_string(), index);
        index
    }

    /// Adds a class reference and returns its index
    pub fn class_ref(&mut self, class: &str) -> u16 {
        let name = self.utf8(class);
        self.push_constant(Constant::Class { name })
    }

    /// Adds a string literal and returns its index
    pub fn string(&mut self, text: &str) -> u16 {
        let utf8 = self.utf8(text);
        self.push_constant(Constant::String { utf8 })
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.push_constant(Constant::NameAndType { name, descriptor })
    }

    /// Adds a field reference and returns its index
    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class_ref(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.push_constant(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Adds a class-method reference and returns its index
    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class_ref(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.push_constant(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    /// Adds an interface-method reference and returns its index
    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class_ref(class);
        let name_and_type = self.name_and_type(name, descriptor);
        self.push_constant(Constant::InterfaceMethodRef {
            class,
            name_and_type,
        })
    }

    /// Validates and returns the definition
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if [`ClassDefinition::validate`] fails.
    pub fn build(self) -> Result<ClassDefinition> {
        self.definition.validate()?;
        Ok(self.definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn builder_defaults() {
        let def = ClassDefinition::builder("a/B").build().unwrap();
        assert_eq!(def.super_name.as_deref(), Some(ROOT_CLASS));
        assert!(def.flags.contains(ClassAccessFlags::PUBLIC));
        assert!(!def.is_interface());

        let root = ClassDefinition::builder(ROOT_CLASS).build().unwrap();
        assert!(root.super_name.is_none());

        let iface = ClassDefinition::builder("a/I")
            .interface()
            .abstract_method("run", "()V")
            .build()
            .unwrap();
        assert!(iface.is_interface());
        assert!(iface.methods[0].code.is_none());
    }

    #[test]
    fn constant_pool_helpers() {
        let mut builder = ClassDefinition::builder("a/B");
        let first = builder.utf8("hello");
        let again = builder.utf8("hello");
        assert_eq!(first, again);

        let string = builder.string("hello");
        let method = builder.method_ref("a/C", "run", "()V");
        let def = builder.build().unwrap();

        assert_eq!(def.constant(first), Some(&Constant::Utf8("hello".to_string())));
        assert_eq!(def.constant(string), Some(&Constant::String { utf8: first }));
        assert!(matches!(def.constant(method), Some(Constant::MethodRef { .. })));
        assert!(def.constant(0).is_none());
    }

    #[test]
    fn constant_fields() {
        let def = ClassDefinition::builder("a/B")
            .constant_field("MAX", "I", Constant::Integer(42))
            .constant_field("NAME", "Ljava/lang/String;", Constant::Utf8("b".into()))
            .build()
            .unwrap();

        let max = &def.fields[0];
        assert!(max.flags.contains(FieldAccessFlags::STATIC));
        assert_eq!(
            def.constant(max.constant_value.unwrap()),
            Some(&Constant::Integer(42))
        );
        assert!(matches!(
            def.constant(def.fields[1].constant_value.unwrap()),
            Some(Constant::String { .. })
        ));
    }

    #[test]
    fn validation_failures() {
        let bad_desc = ClassDefinition::builder("a/B").field("x", "Q", FieldAccessFlags::PUBLIC);
        assert!(matches!(bad_desc.build(), Err(Error::Malformed { .. })));

        let bad_align = ClassDefinition::builder("a/B").aligned(24);
        assert!(bad_align.build().is_err());

        let mut def = ClassDefinition::builder("a/B").build().unwrap();
        def.fields.push(FieldDefinition {
            name: "x".into(),
            descriptor: "I".into(),
            flags: FieldAccessFlags::STATIC,
            constant_value: Some(9),
            size_override: None,
        });
        assert!(def.validate().is_err());

        assert!(ClassDefinition::builder("").build().is_err());
    }

    #[test]
    fn zero_sized_field_rejected() {
        let empty = ClassDefinition::builder("a/B")
            .sized_field("a", "I", 0)
            .sized_field("b", "I", 0);
        assert!(matches!(empty.build(), Err(Error::Malformed { .. })));

        assert!(ClassDefinition::builder("a/B").sized_field("a", "I", 1).build().is_ok());
    }
}
