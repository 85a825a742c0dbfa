use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// The primitive types of the managed language
///
/// Every kind has a runtime class of its own (named by its keyword), which is what array
/// classes of primitives use as element type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `F`
    Float,
    /// `J`
    Long,
    /// `D`
    Double,
    /// `V`, only valid as a method return type
    Void,
}

impl PrimitiveKind {
    /// Maps a descriptor character to its primitive kind
    #[must_use]
    pub fn from_descriptor(tag: u8) -> Option<Self> {
        match tag {
            b'Z' => Some(PrimitiveKind::Boolean),
            b'B' => Some(PrimitiveKind::Byte),
            b'C' => Some(PrimitiveKind::Char),
            b'S' => Some(PrimitiveKind::Short),
            b'I' => Some(PrimitiveKind::Int),
            b'F' => Some(PrimitiveKind::Float),
            b'J' => Some(PrimitiveKind::Long),
            b'D' => Some(PrimitiveKind::Double),
            b'V' => Some(PrimitiveKind::Void),
            _ => None,
        }
    }

    /// The descriptor character of this kind
    #[must_use]
    pub fn descriptor(&self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Double => 'D',
            PrimitiveKind::Void => 'V',
        }
    }

    /// The keyword naming the runtime class of this kind (`int`, `boolean`, ...)
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        self.into()
    }

    /// Storage size in bytes
    #[must_use]
    pub fn size(&self) -> u32 {
        match self {
            PrimitiveKind::Void => 0,
            PrimitiveKind::Boolean | PrimitiveKind::Byte => 1,
            PrimitiveKind::Char | PrimitiveKind::Short => 2,
            PrimitiveKind::Int | PrimitiveKind::Float => 4,
            PrimitiveKind::Long | PrimitiveKind::Double => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn descriptor_roundtrip() {
        for kind in PrimitiveKind::iter() {
            let tag = kind.descriptor() as u8;
            assert_eq!(PrimitiveKind::from_descriptor(tag), Some(kind));
        }
        assert_eq!(PrimitiveKind::from_descriptor(b'L'), None);
        assert_eq!(PrimitiveKind::COUNT, 9);
    }

    #[test]
    fn names_and_sizes() {
        assert_eq!(PrimitiveKind::Int.class_name(), "int");
        assert_eq!(PrimitiveKind::Boolean.to_string(), "boolean");
        assert_eq!(PrimitiveKind::Double.size(), 8);
        assert_eq!(PrimitiveKind::Char.size(), 2);
        assert_eq!(PrimitiveKind::Void.size(), 0);
    }
}
