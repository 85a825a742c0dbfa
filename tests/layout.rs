//! Integration tests for field layout.
//!
//! Checks the layout invariants over a spread of field mixes under every configuration preset:
//! offsets increase in allocation order, every field is naturally aligned, subclasses never
//! overlap their superclass, and reference counts are exact.

use classlink::{
    link::layout::{instance_field_size, natural_alignment},
    prelude::*,
    Result,
};

const DESCRIPTORS: &[&str] = &["Z", "B", "C", "S", "I", "F", "J", "D", "Ljava/lang/Object;", "[I"];

fn presets() -> Vec<(&'static str, LinkerConfig)> {
    vec![
        ("default", LinkerConfig::default()),
        ("compatible", LinkerConfig::compatible()),
        ("compact", LinkerConfig::compact()),
        (
            "narrow",
            LinkerConfig {
                reference_size: 4,
                header_size: 12,
                ..LinkerConfig::default()
            },
        ),
    ]
}

/// Builds a two-level hierarchy whose fields cycle through all descriptor kinds.
fn define_hierarchy(loader: &ClassLoader, seed: usize) -> Result<()> {
    let mut base = ClassDefinition::builder("layout/Base");
    for i in 0..5 {
        let descriptor = DESCRIPTORS[(seed + i * 3) % DESCRIPTORS.len()];
        base = base.field(&format!("b{i}"), descriptor, FieldAccessFlags::PRIVATE);
    }
    base = base.field("shared", "J", FieldAccessFlags::STATIC);

    let mut derived = ClassDefinition::builder("layout/Derived").extends("layout/Base");
    for i in 0..7 {
        let descriptor = DESCRIPTORS[(seed * 7 + i) % DESCRIPTORS.len()];
        derived = derived.field(&format!("d{i}"), descriptor, FieldAccessFlags::PROTECTED);
    }

    loader.define(base.build()?)?;
    loader.define(derived.build()?)?;
    Ok(())
}

fn check_class(class: &ClassEntity, config: &LinkerConfig, floor: u32) {
    let prepared = class.prepared().unwrap();
    let fields = class.fields();

    let mut previous_end = floor;
    let mut previous_offset = None;
    for &index in &prepared.instance_field_order {
        let field = &fields[index];
        assert!(!field.is_static());
        let offset = field.offset().unwrap();
        let size = instance_field_size(field, config);

        assert_eq!(offset % natural_alignment(size), 0, "{} misaligned", field.name());
        assert!(offset >= previous_end, "{} overlaps", field.name());
        if let Some(previous) = previous_offset {
            assert!(offset > previous, "{} not increasing", field.name());
        }
        previous_offset = Some(offset);
        previous_end = offset + size;
    }

    assert_eq!(prepared.instance.unpadded_size, previous_end);
    assert_eq!(prepared.instance_size % prepared.alignment, 0);
    assert!(prepared.instance_size >= prepared.instance.unpadded_size);
}

#[test]
fn test_offsets_monotonic_and_aligned() -> Result<()> {
    for (name, config) in presets() {
        for seed in 0..DESCRIPTORS.len() {
            let loader = ClassLoader::with_config(config)?;
            define_hierarchy(&loader, seed)?;

            let derived = loader.resolve_and_prepare("layout/Derived")?;
            let base = loader.get("layout/Base").unwrap();

            check_class(&base, &config, config.header_size);
            let base_end = base.prepared().unwrap().instance.unpadded_size;
            check_class(&derived, &config, base_end);

            let references = |class: &ClassEntity| {
                class
                    .fields()
                    .iter()
                    .filter(|field| !field.is_static() && field.is_reference())
                    .count() as u32
            };
            assert_eq!(
                derived.prepared().unwrap().instance.reference_fields,
                references(&base) + references(&derived),
                "{name}/{seed}"
            );
            if !config.compact_fields {
                assert_eq!(derived.prepared().unwrap().instance.padding_bytes, 0);
            }
        }
    }
    Ok(())
}

#[test]
fn test_compatible_layout_widens_sub_word_fields() -> Result<()> {
    let loader = ClassLoader::with_config(LinkerConfig::compatible())?;
    loader.define(
        ClassDefinition::builder("layout/Flags")
            .field("a", "Z", FieldAccessFlags::PRIVATE)
            .field("b", "B", FieldAccessFlags::PRIVATE)
            .field("c", "C", FieldAccessFlags::PRIVATE)
            .build()?,
    )?;

    let flags = loader.resolve_and_prepare("layout/Flags")?;
    let offsets: Vec<u32> = flags
        .fields()
        .iter()
        .map(|field| field.offset().unwrap())
        .collect();
    assert_eq!(offsets, vec![16, 20, 24]);
    assert_eq!(flags.instance_size(), Some(32));
    Ok(())
}

#[test]
fn test_compact_layout_packs_and_backfills() -> Result<()> {
    let loader = ClassLoader::with_config(LinkerConfig {
        reference_size: 4,
        header_size: 12,
        ..LinkerConfig::default()
    })?;
    loader.define(
        ClassDefinition::builder("layout/Packed")
            .field("flag", "Z", FieldAccessFlags::PRIVATE)
            .field("count", "I", FieldAccessFlags::PRIVATE)
            .field("stamp", "J", FieldAccessFlags::PRIVATE)
            .field("next", "Ljava/lang/Object;", FieldAccessFlags::PRIVATE)
            .build()?,
    )?;

    let packed = loader.resolve_and_prepare("layout/Packed")?;
    let offset = |name: &str| packed.declared_field(name).unwrap().offset().unwrap();

    // The long needs 8-byte alignment; the gap after the header takes the reference, which
    // sorts ahead of the int of the same size
    assert_eq!(offset("next"), 12);
    assert_eq!(offset("stamp"), 16);
    assert_eq!(offset("count"), 24);
    assert_eq!(offset("flag"), 28);
    assert_eq!(packed.prepared().unwrap().instance.padding_bytes, 0);
    assert_eq!(packed.instance_size(), Some(32));
    Ok(())
}

#[test]
fn test_size_override_and_static_block() -> Result<()> {
    let loader = ClassLoader::new()?;
    loader.define(
        ClassDefinition::builder("layout/Special")
            .sized_field("vector", "J", 16)
            .field("tag", "I", FieldAccessFlags::PRIVATE)
            .field("flag", "Z", FieldAccessFlags::STATIC)
            .field("total", "D", FieldAccessFlags::STATIC)
            .build()?,
    )?;

    let special = loader.resolve_and_prepare("layout/Special")?;
    let offset = |name: &str| special.declared_field(name).unwrap().offset().unwrap();

    assert_eq!(offset("vector"), 16);
    assert_eq!(offset("tag"), 32);
    assert_eq!(special.instance_size(), Some(40));

    // Statics: the boolean takes a word, the double moves to the next 8-byte boundary
    assert_eq!(offset("flag"), 0);
    assert_eq!(offset("total"), 8);
    assert_eq!(special.prepared().unwrap().static_size, 16);
    Ok(())
}

#[test]
fn test_zero_storage_size_rejected() -> Result<()> {
    let loader = ClassLoader::new()?;
    let built = ClassDefinition::builder("layout/Empty")
        .sized_field("a", "I", 0)
        .sized_field("b", "I", 0)
        .build();
    assert!(matches!(built, Err(Error::Malformed { .. })));

    // Definitions assembled by hand are checked again on define
    let mut definition = ClassDefinition::builder("layout/Empty")
        .sized_field("a", "I", 4)
        .build()?;
    definition.fields[0].size_override = Some(0);
    assert!(matches!(loader.define(definition), Err(Error::Malformed { .. })));
    assert!(loader.get("layout/Empty").is_none());
    Ok(())
}

#[test]
fn test_layout_overflow_fails_class() -> Result<()> {
    let loader = ClassLoader::new()?;
    loader.define(
        ClassDefinition::builder("layout/Huge")
            .sized_field("a", "I", 0xFFFF_FFE9)
            .field("b", "J", FieldAccessFlags::PRIVATE)
            .build()?,
    )?;

    let error = loader.resolve_and_prepare("layout/Huge").unwrap_err();
    assert!(matches!(error.root_cause(), Error::Malformed { .. }));
    assert_eq!(loader.get("layout/Huge").unwrap().state(), ClassState::Error);
    Ok(())
}
