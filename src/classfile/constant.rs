use std::fmt;

/// One entry of a class definition's constant pool
///
/// Indices into the pool are 1-based; index `0` is never valid. Every entry occupies exactly
/// one index, including `Long` and `Double`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Modified UTF-8 text, used by names, descriptors and string literals
    Utf8(String),
    /// 32-bit integer literal
    Integer(i32),
    /// 32-bit float literal
    Float(f32),
    /// 64-bit integer literal
    Long(i64),
    /// 64-bit float literal
    Double(f64),
    /// Symbolic class reference
    Class {
        /// Index of the `Utf8` entry holding the internal class name
        name: u16,
    },
    /// String literal
    String {
        /// Index of the `Utf8` entry holding the text
        utf8: u16,
    },
    /// Symbolic field reference
    FieldRef {
        /// Index of the `Class` entry of the declaring class
        class: u16,
        /// Index of the `NameAndType` entry
        name_and_type: u16,
    },
    /// Symbolic class-method reference
    MethodRef {
        /// Index of the `Class` entry of the declaring class
        class: u16,
        /// Index of the `NameAndType` entry
        name_and_type: u16,
    },
    /// Symbolic interface-method reference
    InterfaceMethodRef {
        /// Index of the `Class` entry of the declaring interface
        class: u16,
        /// Index of the `NameAndType` entry
        name_and_type: u16,
    },
    /// Member name and descriptor pair
    NameAndType {
        /// Index of the `Utf8` entry holding the member name
        name: u16,
        /// Index of the `Utf8` entry holding the descriptor
        descriptor: u16,
    },
}

impl Constant {
    /// Short name of the entry kind, as used in error messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class { .. } => "Class",
            Constant::String { .. } => "String",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef { .. } => "Methodref",
            Constant::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
        }
    }

    /// `true` for entries that may serve as the initial value of a static field
    #[must_use]
    pub fn is_loadable_value(&self) -> bool {
        matches!(
            self,
            Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::String { .. }
        )
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Utf8(text) => write!(f, "Utf8 {text:?}"),
            Constant::Integer(value) => write!(f, "Integer {value}"),
            Constant::Float(value) => write!(f, "Float {value}"),
            Constant::Long(value) => write!(f, "Long {value}"),
            Constant::Double(value) => write!(f, "Double {value}"),
            Constant::Class { name } => write!(f, "Class #{name}"),
            Constant::String { utf8 } => write!(f, "String #{utf8}"),
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => write!(f, "{} #{class}.#{name_and_type}", self.kind()),
            Constant::NameAndType { name, descriptor } => {
                write!(f, "NameAndType #{name}:#{descriptor}")
            }
        }
    }
}
