//! Field layout.
//!
//! Instance fields extend the layout inherited from the superclass; static fields get their
//! own block. In compact mode sub-word fields keep their natural size and the bytes skipped
//! for alignment are counted as padding. With sorting enabled fields are ordered by
//! descending size (references first on ties), and when both modes are on the alignment gap
//! in front of the first field is back-filled with smaller fields that fit it.

use crate::{class::FieldRc, config::LinkerConfig, Result};

/// Running state of an instance layout, handed from superclass to subclass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceLayout {
    /// Bytes used by header and fields, before padding to the object alignment
    pub unpadded_size: u32,
    /// Number of reference fields, inherited ones included
    pub reference_fields: u32,
    /// Bytes skipped to align fields, inherited ones included
    pub padding_bytes: u32,
}

impl InstanceLayout {
    /// The layout of an object with a header and no fields
    #[must_use]
    pub fn root(config: &LinkerConfig) -> Self {
        InstanceLayout {
            unpadded_size: config.header_size,
            reference_fields: 0,
            padding_bytes: 0,
        }
    }
}

/// Offsets computed for the fields of one class, indexed like the class's field list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    /// Layout after this class's instance fields
    pub instance: InstanceLayout,
    /// Offset of every field; instance offsets are object-relative, static ones
    /// block-relative
    pub offsets: Vec<u32>,
    /// Field indices in the order instance offsets were assigned
    pub instance_order: Vec<usize>,
    /// Size of the static block
    pub static_size: u32,
}

/// Largest power of two dividing `size`, capped at 8
#[must_use]
pub fn natural_alignment(size: u32) -> u32 {
    if size == 0 {
        1
    } else {
        (1 << size.trailing_zeros()).min(8)
    }
}

/// Rounds `value` up to a multiple of the power of two `alignment`
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the rounded value does not fit in 32 bits.
pub fn align_up(value: u32, alignment: u32) -> Result<u32> {
    let mask = alignment - 1;
    value
        .checked_add(mask)
        .map(|bumped| bumped & !mask)
        .ok_or_else(|| malformed_error!("Offset {} overflows when aligned to {}", value, alignment))
}

/// Storage size of an instance field under `config`
#[must_use]
pub fn instance_field_size(field: &FieldRc, config: &LinkerConfig) -> u32 {
    let size = field.natural_size(config.reference_size);
    if config.compact_fields {
        size
    } else {
        size.max(4)
    }
}

/// Storage size of a static field; statics are never narrower than a word
#[must_use]
pub fn static_field_size(field: &FieldRc, config: &LinkerConfig) -> u32 {
    field.natural_size(config.reference_size).max(4)
}

/// Orders instance fields for offset assignment
fn order_instance_fields(
    fields: &[FieldRc],
    mut order: Vec<usize>,
    start: u32,
    config: &LinkerConfig,
) -> Result<Vec<usize>> {
    if !config.sort_fields || order.is_empty() {
        return Ok(order);
    }

    let size = |index: usize| instance_field_size(&fields[index], config);
    order.sort_by(|a, b| {
        size(*b)
            .cmp(&size(*a))
            .then_with(|| fields[*b].is_reference().cmp(&fields[*a].is_reference()))
    });

    if !config.compact_fields {
        return Ok(order);
    }

    // Fill the gap in front of the first (largest) field with the largest fields that fit
    let aligned = align_up(start, natural_alignment(size(order[0])))?;
    let mut filled = Vec::new();
    let mut cursor = start;
    while cursor < aligned {
        let candidate = order.iter().skip(1).position(|index| {
            let field_size = size(*index);
            field_size <= aligned - cursor && cursor % natural_alignment(field_size) == 0
        });
        match candidate {
            Some(position) => {
                let index = order.remove(position + 1);
                cursor += size(index);
                filled.push(index);
            }
            None => break,
        }
    }

    filled.extend(order);
    Ok(filled)
}

/// Computes offsets for all fields of a class
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the layout overflows the 32-bit offset range.
pub fn compute_field_layout(
    fields: &[FieldRc],
    inherited: InstanceLayout,
    config: &LinkerConfig,
) -> Result<FieldLayout> {
    let mut offsets = vec![0; fields.len()];
    let mut instance = inherited;

    let candidates: Vec<usize> = (0..fields.len())
        .filter(|index| !fields[*index].is_static())
        .collect();
    let order = order_instance_fields(fields, candidates, instance.unpadded_size, config)?;

    for &index in &order {
        let field = &fields[index];
        let size = instance_field_size(field, config);
        let offset = align_up(instance.unpadded_size, natural_alignment(size))?;
        if config.compact_fields {
            instance.padding_bytes += offset - instance.unpadded_size;
        }
        instance.unpadded_size = offset.checked_add(size).ok_or_else(|| {
            malformed_error!("Instance layout overflows at field {}", field.name())
        })?;
        if field.is_reference() {
            instance.reference_fields += 1;
        }
        offsets[index] = offset;
    }

    let mut static_size: u32 = 0;
    for (index, field) in fields.iter().enumerate() {
        if !field.is_static() {
            continue;
        }
        let size = static_field_size(field, config);
        let offset = align_up(static_size, natural_alignment(size).max(4))?;
        static_size = offset.checked_add(size).ok_or_else(|| {
            malformed_error!("Static layout overflows at field {}", field.name())
        })?;
        offsets[index] = offset;
    }

    Ok(FieldLayout {
        instance,
        offsets,
        instance_order: order,
        static_size,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        class::{ClassId, Field},
        classfile::{FieldAccessFlags, FieldDefinition},
        strings::StringPool,
        Error,
    };

    fn fields(spec: &[(&str, &str, bool)]) -> Vec<FieldRc> {
        let pool = StringPool::new(16);
        spec.iter()
            .map(|(name, desc, is_static)| {
                let flags = if *is_static {
                    FieldAccessFlags::STATIC
                } else {
                    FieldAccessFlags::PRIVATE
                };
                let def = FieldDefinition {
                    name: (*name).to_string(),
                    descriptor: (*desc).to_string(),
                    flags,
                    constant_value: None,
                    size_override: None,
                };
                Arc::new(Field::new(&def, ClassId::new(1), &pool).unwrap())
            })
            .collect()
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(natural_alignment(1), 1);
        assert_eq!(natural_alignment(2), 2);
        assert_eq!(natural_alignment(12), 4);
        assert_eq!(natural_alignment(16), 8);
        assert_eq!(align_up(13, 8).unwrap(), 16);
        assert_eq!(align_up(16, 8).unwrap(), 16);
        assert_eq!(align_up(u32::MAX - 7, 8).unwrap(), u32::MAX - 7);
        assert!(matches!(align_up(u32::MAX - 6, 8), Err(Error::Malformed { .. })));
    }

    #[test]
    fn compatible_widens_and_keeps_order() {
        let config = LinkerConfig::compatible();
        let fields = fields(&[("b", "B", false), ("l", "J", false), ("c", "C", false)]);
        let layout = compute_field_layout(&fields, InstanceLayout::root(&config), &config).unwrap();

        assert_eq!(layout.offsets, vec![16, 24, 32]);
        assert_eq!(layout.instance.unpadded_size, 36);
        assert_eq!(layout.instance.padding_bytes, 0);
        assert_eq!(layout.instance_order, vec![0, 1, 2]);
    }

    #[test]
    fn sorted_compact_backfills() {
        let config = LinkerConfig {
            header_size: 12,
            reference_size: 4,
            ..LinkerConfig::default()
        };
        // header ends at 12, the long needs 16; the int fills the gap
        let fields = fields(&[("b", "B", false), ("i", "I", false), ("l", "J", false)]);
        let layout = compute_field_layout(&fields, InstanceLayout::root(&config), &config).unwrap();

        assert_eq!(layout.instance_order, vec![1, 2, 0]);
        assert_eq!(layout.offsets, vec![24, 12, 16]);
        assert_eq!(layout.instance.unpadded_size, 25);
        assert_eq!(layout.instance.padding_bytes, 0);
    }

    #[test]
    fn compact_tracks_padding() {
        let config = LinkerConfig::compact();
        let fields = fields(&[("b", "Z", false), ("d", "D", false), ("o", "Ljava/lang/Object;", false)]);
        let layout = compute_field_layout(&fields, InstanceLayout::root(&config), &config).unwrap();

        assert_eq!(layout.offsets, vec![16, 24, 32]);
        assert_eq!(layout.instance.padding_bytes, 7);
        assert_eq!(layout.instance.reference_fields, 1);
    }

    #[test]
    fn statics_have_their_own_block() {
        let config = LinkerConfig::default();
        let fields = fields(&[("s", "S", true), ("x", "I", false), ("d", "D", true)]);
        let layout = compute_field_layout(&fields, InstanceLayout::root(&config), &config).unwrap();

        assert_eq!(layout.offsets[0], 0);
        assert_eq!(layout.offsets[2], 8);
        assert_eq!(layout.static_size, 16);
        assert_eq!(layout.offsets[1], 16);
        assert_eq!(layout.instance_order, vec![1]);
    }
}
