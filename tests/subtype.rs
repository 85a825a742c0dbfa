//! Integration tests for subtype checks.
//!
//! The ancestor-array fast path must agree with the hierarchy walk for every pair of classes,
//! including chains deeper than the array, interfaces, arrays and primitives.

use classlink::{prelude::*, Result};

/// A single-inheritance chain `chain/L1 .. chain/L8`, a side branch, interfaces and arrays.
fn build_universe() -> Result<(ClassLoader, Vec<ClassRc>)> {
    let loader = ClassLoader::new()?;

    loader.define(
        ClassDefinition::builder("chain/Named")
            .interface()
            .abstract_method("name", "()Ljava/lang/String;")
            .build()?,
    )?;
    loader.define(
        ClassDefinition::builder("chain/Labeled")
            .interface()
            .implements("chain/Named")
            .build()?,
    )?;

    for level in 1..=8 {
        let mut builder = ClassDefinition::builder(&format!("chain/L{level}"));
        if level > 1 {
            builder = builder.extends(&format!("chain/L{}", level - 1));
        }
        if level == 3 {
            builder = builder
                .implements("chain/Labeled")
                .method("name", "()Ljava/lang/String;", MethodAccessFlags::PUBLIC);
        }
        loader.define(builder.build()?)?;
    }
    loader.define(
        ClassDefinition::builder("chain/Side")
            .extends("chain/L2")
            .build()?,
    )?;

    let mut classes = Vec::new();
    for name in [
        "chain/L8",
        "chain/Side",
        "chain/Labeled",
        "[Lchain/L4;",
        "[Lchain/L2;",
        "[[Lchain/L3;",
        "[Ljava/lang/Object;",
        "[I",
        "[J",
    ] {
        loader.resolve_and_prepare(name)?;
    }
    for class in loader.classes() {
        class.prepare(&loader)?;
        classes.push(class);
    }
    Ok((loader, classes))
}

#[test]
fn test_fast_and_slow_checks_agree() -> Result<()> {
    let (_loader, classes) = build_universe()?;

    let mut fast_answers = 0;
    for a in &classes {
        for b in &classes {
            let slow = a.slow_instanceof(b);
            assert_eq!(a.is_instanceof(b), slow, "{} <: {}", a.name(), b.name());
            if let Some(fast) = a.fast_instanceof(b) {
                fast_answers += 1;
                assert_eq!(fast, slow, "{} <: {} (fast)", a.name(), b.name());
            }
        }
    }
    assert!(fast_answers > 0);
    Ok(())
}

#[test]
fn test_fast_path_eligibility() -> Result<()> {
    let (loader, _classes) = build_universe()?;
    let class = |name: &str| loader.get(name).unwrap();

    for level in 1..=4 {
        let entity = class(&format!("chain/L{level}"));
        assert_eq!(entity.depth(), Some(level));
        assert!(entity.is_fast_subtype_target(), "L{level}");
    }
    for level in 5..=8 {
        assert!(!class(&format!("chain/L{level}")).is_fast_subtype_target(), "L{level}");
    }
    assert!(!class(ROOT_CLASS).is_fast_subtype_target());
    assert!(!class("chain/Named").is_fast_subtype_target());
    assert!(!class("[Lchain/L4;").is_fast_subtype_target());

    // The ancestor array of a deep class still records its shallow ancestors
    let deep = class("chain/L8");
    let ancestors = deep.vtable().unwrap().ancestors();
    assert_eq!(ancestors.len(), 5);
    for level in 1..=4 {
        assert_eq!(ancestors[level - 1], Some(class(&format!("chain/L{level}")).id()));
    }
    assert_eq!(ancestors[4], None);
    Ok(())
}

#[test]
fn test_hierarchy_answers() -> Result<()> {
    let (loader, _classes) = build_universe()?;
    let class = |name: &str| loader.get(name).unwrap();

    let l8 = class("chain/L8");
    let side = class("chain/Side");
    let root = class(ROOT_CLASS);

    assert!(l8.is_instanceof(&class("chain/L1")));
    assert!(l8.is_instanceof(&class("chain/L6")));
    assert!(l8.is_instanceof(&root));
    assert!(l8.is_instanceof(&class("chain/Named")));
    assert!(!class("chain/L2").is_instanceof(&class("chain/Named")));
    assert!(side.is_instanceof(&class("chain/L2")));
    assert!(!side.is_instanceof(&class("chain/L3")));
    assert!(!class("chain/L1").is_instanceof(&l8));
    assert!(class("chain/Labeled").is_instanceof(&class("chain/Named")));
    assert!(class("chain/Labeled").is_instanceof(&root));

    // Fast path answers without walking
    assert_eq!(side.fast_instanceof(&class("chain/L2")), Some(true));
    assert_eq!(side.fast_instanceof(&class("chain/L3")), Some(false));
    assert_eq!(side.fast_instanceof(&class("chain/L6")), None);
    Ok(())
}

#[test]
fn test_array_covariance() -> Result<()> {
    let (loader, _classes) = build_universe()?;
    let class = |name: &str| loader.get(name).unwrap();

    let l4s = class("[Lchain/L4;");
    let l2s = class("[Lchain/L2;");
    let objects = class("[Ljava/lang/Object;");
    let ints = class("[I");
    let longs = class("[J");
    let matrix = class("[[Lchain/L3;");

    assert!(l4s.is_instanceof(&l2s));
    assert!(!l2s.is_instanceof(&l4s));
    assert!(l4s.is_instanceof(&objects));
    assert!(matrix.is_instanceof(&objects));
    assert!(!ints.is_instanceof(&objects));
    assert!(!ints.is_instanceof(&longs));

    for array in [&l4s, &ints, &matrix] {
        assert!(array.is_instanceof(&class(ROOT_CLASS)));
        assert!(array.is_instanceof(&class(CLONEABLE_INTERFACE)));
        assert!(array.is_instanceof(&class(SERIALIZABLE_INTERFACE)));
        assert!(!array.is_instanceof(&class("chain/L1")));
    }

    let int = loader.primitive_class(PrimitiveKind::Int).unwrap();
    assert!(!int.is_instanceof(&class(ROOT_CLASS)));
    assert!(int.is_instanceof(&int));
    Ok(())
}
