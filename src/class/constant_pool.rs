//! Runtime constant pool with lazily cached symbolic resolution.
//!
//! Every entry resolves at most once. The outcome, success or failure, is cached on the entry
//! and handed to every later caller; failed entries are additionally recorded in an errored
//! list so they can be enumerated.

use std::{fmt, sync::OnceLock};

use tracing::debug;

use crate::{
    class::{ClassRc, ClassRef, FieldRc, MethodRc},
    classfile::Constant,
    loader::ClassLoader,
    services::ObjectRef,
    strings::{InternedRef, StringPool},
    Error, Result,
};

/// A successfully resolved constant pool entry
#[derive(Debug, Clone)]
pub enum Resolved {
    /// A class reference
    Class(ClassRef),
    /// A field reference
    Field(FieldRc),
    /// A method or interface-method reference
    Method(MethodRc),
    /// A string literal, bound to its interned runtime object
    String(ObjectRef),
}

/// The initial value of a constant static field
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    /// `int`, `short`, `char`, `byte` and `boolean` constants
    Int(i32),
    /// `long` constants
    Long(i64),
    /// `float` constants
    Float(f32),
    /// `double` constants
    Double(f64),
    /// String literals
    String(InternedRef),
}

/// The constant pool of a runtime class
pub struct ConstantPool {
    constants: Vec<Constant>,
    utf8: Vec<Option<InternedRef>>,
    resolved: Vec<OnceLock<Result<Resolved>>>,
    errors: boxcar::Vec<u16>,
}

impl ConstantPool {
    pub(crate) fn new(constants: &[Constant], strings: &StringPool) -> Self {
        let utf8 = constants
            .iter()
            .map(|constant| match constant {
                Constant::Utf8(text) => Some(strings.intern_str(text)),
                _ => None,
            })
            .collect();

        ConstantPool {
            constants: constants.to_vec(),
            utf8,
            resolved: constants.iter().map(|_| OnceLock::new()).collect(),
            errors: boxcar::Vec::new(),
        }
    }

    pub(crate) fn empty() -> Self {
        ConstantPool {
            constants: Vec::new(),
            utf8: Vec::new(),
            resolved: Vec::new(),
            errors: boxcar::Vec::new(),
        }
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// `true` if the pool has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    fn slot(index: u16, len: usize) -> Result<usize> {
        let slot = usize::from(index).wrapping_sub(1);
        if slot < len {
            Ok(slot)
        } else {
            Err(Error::InvalidConstantIndex(index))
        }
    }

    /// Returns the entry at the 1-based `index`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConstantIndex`] for `0` and out-of-range indices.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        Ok(&self.constants[Self::slot(index, self.constants.len())?])
    }

    /// Returns the interned text of a `Utf8` entry
    ///
    /// # Errors
    /// Returns [`Error::ConstantTypeMismatch`] if the entry is not `Utf8`.
    pub fn utf8(&self, index: u16) -> Result<&InternedRef> {
        self.utf8[Self::slot(index, self.utf8.len())?]
            .as_ref()
            .ok_or(Error::ConstantTypeMismatch {
                index,
                expected: "Utf8",
            })
    }

    /// Returns the class name referenced by a `Class` entry
    ///
    /// # Errors
    /// Returns [`Error::ConstantTypeMismatch`] if the entry is not a `Class`.
    pub fn class_name(&self, index: u16) -> Result<&InternedRef> {
        match self.get(index)? {
            Constant::Class { name } => self.utf8(*name),
            _ => Err(Error::ConstantTypeMismatch {
                index,
                expected: "Class",
            }),
        }
    }

    fn name_and_type(&self, index: u16) -> Result<(&InternedRef, &InternedRef)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::ConstantTypeMismatch {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Returns the loadable value of an `Integer`, `Long`, `Float`, `Double` or `String` entry
    ///
    /// # Errors
    /// Returns [`Error::ConstantTypeMismatch`] for any other kind of entry.
    pub fn value(&self, index: u16) -> Result<ConstantValue> {
        match self.get(index)? {
            Constant::Integer(value) => Ok(ConstantValue::Int(*value)),
            Constant::Long(value) => Ok(ConstantValue::Long(*value)),
            Constant::Float(value) => Ok(ConstantValue::Float(*value)),
            Constant::Double(value) => Ok(ConstantValue::Double(*value)),
            Constant::String { utf8 } => Ok(ConstantValue::String(self.utf8(*utf8)?.clone())),
            _ => Err(Error::ConstantTypeMismatch {
                index,
                expected: "loadable value",
            }),
        }
    }

    /// `true` if the entry at `index` has been resolved, successfully or not
    #[must_use]
    pub fn is_resolved(&self, index: u16) -> bool {
        Self::slot(index, self.resolved.len())
            .map(|slot| self.resolved[slot].get().is_some())
            .unwrap_or(false)
    }

    /// Indices of entries whose resolution failed, in failure order
    #[must_use]
    pub fn errors(&self) -> Vec<u16> {
        self.errors.iter().map(|(_, index)| *index).collect()
    }

    fn resolve_with<F>(&self, index: u16, resolve: F) -> Result<Resolved>
    where
        F: FnOnce() -> Result<Resolved>,
    {
        let slot = Self::slot(index, self.resolved.len())?;
        self.resolved[slot]
            .get_or_init(|| {
                let outcome = resolve();
                if let Err(error) = &outcome {
                    debug!(index, %error, "constant pool resolution failed");
                    self.errors.push(index);
                }
                outcome
            })
            .clone()
    }

    /// Resolves a `Class` entry, loading the class if needed
    ///
    /// # Errors
    /// Returns the loading error of the referenced class; the error is cached on the entry.
    pub fn resolve_class(&self, index: u16, loader: &ClassLoader) -> Result<ClassRc> {
        let resolved = self.resolve_with(index, || {
            let name = self.class_name(index)?;
            let class = loader.load_class(&name.to_string())?;
            Ok(Resolved::Class(ClassRc::downgrade(&class)))
        })?;

        match resolved {
            Resolved::Class(class) => class.upgrade().ok_or_else(|| {
                Error::ClassNotFound(
                    self.class_name(index)
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                )
            }),
            _ => Err(Error::ConstantTypeMismatch {
                index,
                expected: "Class",
            }),
        }
    }

    /// Resolves a `Fieldref` entry
    ///
    /// # Errors
    /// Returns [`Error::NoSuchField`] if the class has no such field, or the class loading
    /// error.
    pub fn resolve_field(&self, index: u16, loader: &ClassLoader) -> Result<FieldRc> {
        let resolved = self.resolve_with(index, || {
            let (class, name_and_type) = match self.get(index)? {
                Constant::FieldRef {
                    class,
                    name_and_type,
                } => (*class, *name_and_type),
                _ => {
                    return Err(Error::ConstantTypeMismatch {
                        index,
                        expected: "Fieldref",
                    })
                }
            };
            self.class_name(class)?;
            let class = self.resolve_class(class, loader)?;
            let (name, descriptor) = self.name_and_type(name_and_type)?;
            let field = class
                .find_field(&name.to_string(), &descriptor.to_string())
                .ok_or_else(|| Error::NoSuchField {
                    class: class.name().to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })?;
            Ok(Resolved::Field(field))
        })?;

        match resolved {
            Resolved::Field(field) => Ok(field),
            _ => Err(Error::ConstantTypeMismatch {
                index,
                expected: "Fieldref",
            }),
        }
    }

    /// Resolves a `Methodref` or `InterfaceMethodref` entry
    ///
    /// # Errors
    /// Returns [`Error::NoSuchMethod`] if no matching method exists, or
    /// [`Error::IncompatibleClassChange`] if the reference kind does not match the class kind.
    pub fn resolve_method(&self, index: u16, loader: &ClassLoader) -> Result<MethodRc> {
        let resolved = self.resolve_with(index, || {
            let (class, name_and_type, interface) = match self.get(index)? {
                Constant::MethodRef {
                    class,
                    name_and_type,
                } => (*class, *name_and_type, false),
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => (*class, *name_and_type, true),
                _ => {
                    return Err(Error::ConstantTypeMismatch {
                        index,
                        expected: "Methodref",
                    })
                }
            };
            self.class_name(class)?;
            let class = self.resolve_class(class, loader)?;
            if class.is_interface() != interface {
                return Err(Error::IncompatibleClassChange {
                    class: class.name().to_string(),
                    message: format!("method reference #{index} has the wrong class kind"),
                });
            }

            let (name, descriptor) = self.name_and_type(name_and_type)?;
            let method = class
                .find_method(&name.to_string(), &descriptor.to_string())
                .ok_or_else(|| Error::NoSuchMethod {
                    class: class.name().to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })?;
            Ok(Resolved::Method(method))
        })?;

        match resolved {
            Resolved::Method(method) => Ok(method),
            _ => Err(Error::ConstantTypeMismatch {
                index,
                expected: "Methodref",
            }),
        }
    }

    /// Resolves a `String` entry to its interned runtime object
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the string object cannot be allocated.
    pub fn resolve_string(&self, index: u16, loader: &ClassLoader) -> Result<ObjectRef> {
        let resolved = self.resolve_with(index, || match self.get(index)? {
            Constant::String { utf8 } => {
                let record = self.utf8(*utf8)?;
                Ok(Resolved::String(loader.string_object(record)?))
            }
            _ => Err(Error::ConstantTypeMismatch {
                index,
                expected: "String",
            }),
        })?;

        match resolved {
            Resolved::String(object) => Ok(object),
            _ => Err(Error::ConstantTypeMismatch {
                index,
                expected: "String",
            }),
        }
    }
}

impl fmt::Debug for ConstantPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantPool")
            .field("len", &self.constants.len())
            .field("errors", &self.errors.count())
            .finish()
    }
}
