//! Access flags of classes, fields and methods.
//!
//! The bit values follow the class-file format, so flag words taken from a parsed class file
//! can be wrapped with `from_bits_truncate` directly.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Class access and property flags
    pub struct ClassAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// No subclasses allowed
        const FINAL = 0x0010;
        /// Treat superclass methods specially on `invokespecial`
        const SUPER = 0x0020;
        /// Is an interface, not a class
        const INTERFACE = 0x0200;
        /// Must not be instantiated
        const ABSTRACT = 0x0400;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation type
        const ANNOTATION = 0x2000;
        /// Declared as an enum type
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Field access and property flags
    pub struct FieldAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// One copy per class instead of per instance
        const STATIC = 0x0008;
        /// Never directly assigned to after construction
        const FINAL = 0x0010;
        /// Cannot be cached
        const VOLATILE = 0x0040;
        /// Not written or read by a persistent object manager
        const TRANSIENT = 0x0080;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Element of an enum
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method access and property flags
    pub struct MethodAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Must not be overridden
        const FINAL = 0x0010;
        /// Invocation is wrapped by a monitor
        const SYNCHRONIZED = 0x0020;
        /// Compiler-generated bridge
        const BRIDGE = 0x0040;
        /// Variable number of arguments
        const VARARGS = 0x0080;
        /// Implemented in native code
        const NATIVE = 0x0100;
        /// No implementation provided
        const ABSTRACT = 0x0400;
        /// Strict floating point
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
    }
}

/// Member visibility, derived from the access flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Visibility {
    /// Only the declaring class
    Private,
    /// Default access, the declaring package only
    Package,
    /// The declaring package and subclasses
    Protected,
    /// Everyone
    Public,
}

macro_rules! impl_visibility {
    ($flags:ty) => {
        impl $flags {
            /// Visibility of the member carrying these flags
            #[must_use]
            pub fn visibility(&self) -> Visibility {
                if self.contains(Self::PUBLIC) {
                    Visibility::Public
                } else if self.contains(Self::PROTECTED) {
                    Visibility::Protected
                } else if self.contains(Self::PRIVATE) {
                    Visibility::Private
                } else {
                    Visibility::Package
                }
            }
        }
    };
}

impl_visibility!(FieldAccessFlags);
impl_visibility!(MethodAccessFlags);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_from_flags() {
        assert_eq!(
            MethodAccessFlags::PUBLIC.visibility(),
            Visibility::Public
        );
        assert_eq!(
            (MethodAccessFlags::PROTECTED | MethodAccessFlags::FINAL).visibility(),
            Visibility::Protected
        );
        assert_eq!(
            MethodAccessFlags::STATIC.visibility(),
            Visibility::Package
        );
        assert_eq!(FieldAccessFlags::PRIVATE.visibility(), Visibility::Private);
    }

    #[test]
    fn raw_bits_truncate() {
        let flags = ClassAccessFlags::from_bits_truncate(0x0621 | 0x8000);
        assert!(flags.contains(ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT));
        assert_eq!(flags.bits(), 0x0621);
    }
}
