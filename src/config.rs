//! Linker configuration
//!
//! This module provides the knobs that change how classes are laid out and how large the
//! runtime tables are. None of them change linking semantics; they only trade memory for
//! simplicity of native access.

use crate::Result;

/// Default maximum class depth covered by the fast subtype check
pub const DEFAULT_MAX_FAST_SUBTYPE_DEPTH: u32 = 5;

/// Configuration for class preparation
///
/// # Examples
///
/// ```rust
/// use classlink::LinkerConfig;
///
/// let config = LinkerConfig {
///     max_fast_subtype_depth: 3,
///     ..LinkerConfig::compatible()
/// };
/// assert!(config.validate().is_ok());
/// assert!(!config.compact_fields);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct LinkerConfig {
    /// Lay instance fields out with their natural size instead of widening sub-word fields to
    /// a full word, and track the padding bytes that alignment inserts
    pub compact_fields: bool,

    /// Sort instance fields by descending size (references first on ties) before assigning
    /// offsets
    pub sort_fields: bool,

    /// Size in bytes of an object reference slot
    pub reference_size: u32,

    /// Instance sizes are padded up to a multiple of this value (power of two)
    pub object_alignment: u32,

    /// Size in bytes of the object header that precedes the first instance field
    pub header_size: u32,

    /// Number of ancestor entries embedded in every virtual method table
    pub max_fast_subtype_depth: u32,

    /// Number of buckets in the interned-string table (power of two)
    pub string_pool_buckets: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            compact_fields: true,
            sort_fields: true,
            reference_size: 8,
            object_alignment: 8,
            header_size: 16,
            max_fast_subtype_depth: DEFAULT_MAX_FAST_SUBTYPE_DEPTH,
            string_pool_buckets: 1 << 12,
        }
    }
}

impl LinkerConfig {
    /// Creates a configuration that keeps declaration order and widens sub-word fields
    ///
    /// Every field lands on a word boundary, which keeps native access to instances trivial.
    #[must_use]
    pub fn compatible() -> Self {
        Self {
            compact_fields: false,
            sort_fields: false,
            ..Self::default()
        }
    }

    /// Creates a configuration that packs fields with their natural size but keeps declaration
    /// order
    #[must_use]
    pub fn compact() -> Self {
        Self {
            compact_fields: true,
            sort_fields: false,
            ..Self::default()
        }
    }

    /// Checks the configuration for values the linker cannot work with
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] describing the first offending value.
    pub fn validate(&self) -> Result<()> {
        if !self.object_alignment.is_power_of_two() {
            return Err(malformed_error!(
                "Object alignment must be a power of two - {}",
                self.object_alignment
            ));
        }
        if self.reference_size != 4 && self.reference_size != 8 {
            return Err(malformed_error!(
                "Reference size must be 4 or 8 - {}",
                self.reference_size
            ));
        }
        if self.header_size % self.reference_size != 0 {
            return Err(malformed_error!(
                "Header size {} is not a multiple of the reference size",
                self.header_size
            ));
        }
        if self.max_fast_subtype_depth == 0 {
            return Err(malformed_error!("Fast subtype depth must be at least 1"));
        }
        if !self.string_pool_buckets.is_power_of_two() {
            return Err(malformed_error!(
                "String pool bucket count must be a power of two - {}",
                self.string_pool_buckets
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let default = LinkerConfig::default();
        assert!(default.compact_fields);
        assert!(default.sort_fields);
        assert_eq!(default.max_fast_subtype_depth, 5);

        let compatible = LinkerConfig::compatible();
        assert!(!compatible.compact_fields);
        assert!(!compatible.sort_fields);
        assert_eq!(compatible.reference_size, default.reference_size);

        let compact = LinkerConfig::compact();
        assert!(compact.compact_fields);
        assert!(!compact.sort_fields);

        for config in [default, compatible, compact] {
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn rejects_bad_values() {
        let bad_alignment = LinkerConfig {
            object_alignment: 12,
            ..LinkerConfig::default()
        };
        assert!(bad_alignment.validate().is_err());

        let bad_depth = LinkerConfig {
            max_fast_subtype_depth: 0,
            ..LinkerConfig::default()
        };
        assert!(bad_depth.validate().is_err());

        let bad_buckets = LinkerConfig {
            string_pool_buckets: 1000,
            ..LinkerConfig::default()
        };
        assert!(bad_buckets.validate().is_err());

        let bad_header = LinkerConfig {
            header_size: 12,
            ..LinkerConfig::default()
        };
        assert!(bad_header.validate().is_err());
    }
}
