use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{
    class::ClassId,
    classfile::{FieldAccessFlags, FieldDefinition, FieldType},
    strings::{InternedRef, StringPool},
    Result,
};

/// Shared reference to a [`Field`]
pub type FieldRc = Arc<Field>;

/// A field of a runtime class
///
/// The byte offset is assigned exactly once while the declaring class is prepared: relative to
/// the object start for instance fields, relative to the static block for static fields.
pub struct Field {
    name: InternedRef,
    descriptor: InternedRef,
    field_type: FieldType,
    flags: FieldAccessFlags,
    class_id: ClassId,
    constant_value: Option<u16>,
    size_override: Option<u32>,
    offset: OnceLock<u32>,
}

impl Field {
    pub(crate) fn new(
        definition: &FieldDefinition,
        class_id: ClassId,
        strings: &StringPool,
    ) -> Result<Field> {
        Ok(Field {
            name: strings.intern_str(&definition.name),
            descriptor: strings.intern_str(&definition.descriptor),
            field_type: FieldType::parse(&definition.descriptor)?,
            flags: definition.flags,
            class_id,
            constant_value: definition.constant_value,
            size_override: definition.size_override,
            offset: OnceLock::new(),
        })
    }

    /// Simple name
    #[must_use]
    pub fn name(&self) -> &InternedRef {
        &self.name
    }

    /// Field descriptor
    #[must_use]
    pub fn descriptor(&self) -> &InternedRef {
        &self.descriptor
    }

    /// Parsed field type
    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Access flags
    #[must_use]
    pub fn flags(&self) -> FieldAccessFlags {
        self.flags
    }

    /// Id of the declaring class
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Constant pool index of the initial value, for constant statics
    #[must_use]
    pub fn constant_value(&self) -> Option<u16> {
        self.constant_value
    }

    /// `true` for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAccessFlags::STATIC)
    }

    /// `true` if the field holds an object reference
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.field_type.is_reference()
    }

    /// Storage size before any widening: the explicit size if one was given, else the natural
    /// size of the type
    #[must_use]
    pub fn natural_size(&self, reference_size: u32) -> u32 {
        self.size_override
            .unwrap_or_else(|| self.field_type.natural_size(reference_size))
    }

    /// Assigned offset, `None` until the declaring class is prepared
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        self.offset.get().copied()
    }

    pub(crate) fn assign_offset(&self, offset: u32) -> Result<()> {
        self.offset.set(offset).map_err(|_| {
            malformed_error!("Offset of field {} assigned twice", self.name)
        })
    }

    /// `true` if `name` and `descriptor` match this field
    #[must_use]
    pub fn matches(&self, name: &str, descriptor: &str) -> bool {
        *self.name == name && *self.descriptor == descriptor
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("flags", &self.flags)
            .field("offset", &self.offset())
            .finish()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.descriptor)
    }
}
