//! Field and method descriptor parsing.
//!
//! Descriptors are the textual type encoding of the class-file format: `I` for `int`,
//! `Ljava/lang/String;` for a class type, `[J` for `long[]`, and `(ILjava/lang/Object;)V` for
//! a method taking an `int` and an object and returning nothing.
//!
//! # Examples
//!
//! ```rust
//! use classlink::classfile::{FieldType, MethodDescriptor, PrimitiveKind};
//!
//! let field = FieldType::parse("[[Ljava/lang/String;")?;
//! assert_eq!(field.array_dimensions(), 2);
//! assert!(field.is_reference());
//!
//! let method = MethodDescriptor::parse("(IJ)Z")?;
//! assert_eq!(method.params.len(), 2);
//! assert_eq!(method.ret, Some(FieldType::Primitive(PrimitiveKind::Boolean)));
//! # Ok::<(), classlink::Error>(())
//! ```

use std::fmt;

use crate::{classfile::PrimitiveKind, Result};

/// Maximum number of array dimensions a descriptor may carry
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// The type of a field, a parameter or a return value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A primitive type, never [`PrimitiveKind::Void`]
    Primitive(PrimitiveKind),
    /// A class or interface, by internal name (`java/lang/Object`)
    Object(String),
    /// An array of the inner type
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parses a complete field descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is empty, malformed, has trailing
    /// data or names `void`.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut parser = DescriptorParser::new(descriptor);
        let field = parser.parse_field()?;
        if !parser.at_end() {
            return Err(malformed_error!(
                "Trailing data in field descriptor - {}",
                descriptor
            ));
        }
        Ok(field)
    }

    /// `true` for class types and arrays
    #[must_use]
    pub fn is_reference(&self) -> bool {
        !matches!(self, FieldType::Primitive(_))
    }

    /// Returns the primitive kind, if this is a primitive type
    #[must_use]
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self {
            FieldType::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Number of array dimensions, `0` for non-arrays
    #[must_use]
    pub fn array_dimensions(&self) -> usize {
        match self {
            FieldType::Array(inner) => 1 + inner.array_dimensions(),
            _ => 0,
        }
    }

    /// Storage size of a value of this type
    #[must_use]
    pub fn natural_size(&self, reference_size: u32) -> u32 {
        match self {
            FieldType::Primitive(kind) => kind.size(),
            FieldType::Object(_) | FieldType::Array(_) => reference_size,
        }
    }

    /// The class name a value of this type is an instance of
    ///
    /// `Object` types yield their internal name, arrays their descriptor (`[I`), primitives
    /// their keyword.
    #[must_use]
    pub fn class_name(&self) -> String {
        match self {
            FieldType::Primitive(kind) => kind.class_name().to_string(),
            FieldType::Object(name) => name.clone(),
            FieldType::Array(_) => self.to_string(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Primitive(kind) => write!(f, "{}", kind.descriptor()),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(inner) => write!(f, "[{inner}"),
        }
    }
}

/// Parameter and return types of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `void`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parses a complete method descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is malformed or has trailing data.
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        let mut parser = DescriptorParser::new(descriptor);
        let method = parser.parse_method()?;
        if !parser.at_end() {
            return Err(malformed_error!(
                "Trailing data in method descriptor - {}",
                descriptor
            ));
        }
        Ok(method)
    }

    /// Number of argument slots, counting `long` and `double` twice
    #[must_use]
    pub fn argument_slots(&self) -> usize {
        self.params
            .iter()
            .map(|param| match param {
                FieldType::Primitive(PrimitiveKind::Long | PrimitiveKind::Double) => 2,
                _ => 1,
            })
            .sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        match &self.ret {
            Some(ret) => write!(f, "){ret}"),
            None => write!(f, ")V"),
        }
    }
}

struct DescriptorParser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> DescriptorParser<'a> {
    fn new(text: &'a str) -> Self {
        DescriptorParser { text, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn next(&mut self) -> Result<u8> {
        let byte = self
            .peek()
            .ok_or_else(|| malformed_error!("Unexpected end of descriptor - {}", self.text))?;
        self.pos += 1;
        Ok(byte)
    }

    fn parse_field(&mut self) -> Result<FieldType> {
        let mut dimensions = 0;
        while self.peek() == Some(b'[') {
            self.pos += 1;
            dimensions += 1;
        }
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(malformed_error!(
                "Descriptor exceeds {} array dimensions - {}",
                MAX_ARRAY_DIMENSIONS,
                self.text
            ));
        }

        let tag = self.next()?;
        let mut field = match tag {
            b'L' => {
                let rest = &self.text[self.pos..];
                let end = rest.find(';').ok_or_else(|| {
                    malformed_error!("Unterminated class name in descriptor - {}", self.text)
                })?;
                let name = &rest[..end];
                if name.is_empty() || name.contains(['.', '[']) {
                    return Err(malformed_error!(
                        "Invalid class name in descriptor - {}",
                        self.text
                    ));
                }
                self.pos += end + 1;
                FieldType::Object(name.to_string())
            }
            _ => match PrimitiveKind::from_descriptor(tag) {
                Some(PrimitiveKind::Void) | None => {
                    return Err(malformed_error!(
                        "Invalid type tag '{}' in descriptor - {}",
                        char::from(tag),
                        self.text
                    ))
                }
                Some(kind) => FieldType::Primitive(kind),
            },
        };

        for _ in 0..dimensions {
            field = FieldType::Array(Box::new(field));
        }
        Ok(field)
    }

    fn parse_method(&mut self) -> Result<MethodDescriptor> {
        if self.next()? != b'(' {
            return Err(malformed_error!(
                "Method descriptor must start with '(' - {}",
                self.text
            ));
        }

        let mut params = Vec::new();
        loop {
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => params.push(self.parse_field()?),
                None => {
                    return Err(malformed_error!(
                        "Unterminated parameter list - {}",
                        self.text
                    ))
                }
            }
        }

        let ret = if self.peek() == Some(b'V') {
            self.pos += 1;
            None
        } else {
            Some(self.parse_field()?)
        };

        Ok(MethodDescriptor { params, ret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn parse_primitives_and_objects() {
        assert_eq!(
            FieldType::parse("I").unwrap(),
            FieldType::Primitive(PrimitiveKind::Int)
        );
        assert_eq!(
            FieldType::parse("Ljava/lang/Object;").unwrap(),
            FieldType::Object("java/lang/Object".to_string())
        );

        let array = FieldType::parse("[[D").unwrap();
        assert_eq!(array.array_dimensions(), 2);
        assert_eq!(array.to_string(), "[[D");
        assert_eq!(array.class_name(), "[[D");
        assert!(array.is_reference());
        assert_eq!(array.natural_size(4), 4);
    }

    #[test]
    fn reject_malformed_fields() {
        for bad in ["", "V", "Q", "Ljava/lang/Object", "L;", "II", "[", "La.b;"] {
            assert!(
                matches!(FieldType::parse(bad), Err(Error::Malformed { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn parse_methods() {
        let desc = MethodDescriptor::parse("(IJ[Ljava/lang/String;D)V").unwrap();
        assert_eq!(desc.params.len(), 4);
        assert_eq!(desc.ret, None);
        assert_eq!(desc.argument_slots(), 6);
        assert_eq!(desc.to_string(), "(IJ[Ljava/lang/String;D)V");

        let desc = MethodDescriptor::parse("()Ljava/lang/Object;").unwrap();
        assert!(desc.params.is_empty());
        assert_eq!(
            desc.ret,
            Some(FieldType::Object("java/lang/Object".to_string()))
        );
    }

    #[test]
    fn reject_malformed_methods() {
        for bad in ["", "V", "()", "(I", "(V)V", "()VV", "I)V"] {
            assert!(
                MethodDescriptor::parse(bad).is_err(),
                "accepted {bad:?}"
            );
        }
    }
}
