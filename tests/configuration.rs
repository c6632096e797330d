//! Building run configurations: output modes, input validation and the marker scan.

use std::sync::Arc;

use classfold::{
    config::{AccessorKind, RecipeKind, CONSTANT, CONSTANT_TYPE, RECONSTRUCTOR},
    prelude::*,
};

const PUBLIC: AccessFlags = AccessFlags::PUBLIC;
const STATIC_FINAL: AccessFlags = AccessFlags::PUBLIC
    .union(AccessFlags::STATIC)
    .union(AccessFlags::FINAL);

fn input(class: ClassFile) -> Result<BytesInput> {
    let bytes = class.to_bytes()?;
    Ok(BytesInput::for_class(&class.name, bytes))
}

fn configure(classes: Vec<ClassFile>) -> Result<RunConfiguration> {
    let mut builder = RunConfiguration::builder().output_sink(Arc::new(CollectingSink::new()));
    for class in classes {
        builder = builder.input(input(class)?);
    }
    builder.build()
}

/// `final class Point { Point(int x, int y) }` with the given getters.
fn point(getters: &[&str], constructor_marker: Option<&str>, names: bool) -> Result<ClassFile> {
    let mut builder = ClassBuilder::new("demo/Point")
        .field(AccessFlags::PRIVATE | AccessFlags::FINAL, "x", "I")
        .field(AccessFlags::PRIVATE | AccessFlags::FINAL, "y", "I")
        .method(PUBLIC, "<init>", "(II)V", |m| {
            let m = match constructor_marker {
                Some(marker) => m.annotate(marker),
                None => m,
            };
            let m = if names { m.parameter_names(&["x", "y"]) } else { m };
            m.load(Opcode::Aload, 0)
                .invokespecial("java/lang/Object", "<init>", "()V")
                .load(Opcode::Aload, 0)
                .load(Opcode::Iload, 1)
                .putfield("demo/Point", "x", "I")
                .load(Opcode::Aload, 0)
                .load(Opcode::Iload, 2)
                .putfield("demo/Point", "y", "I")
                .op(Opcode::Return)
        });
    for getter in getters {
        let field = if getter.to_ascii_lowercase().ends_with('x') { "x" } else { "y" };
        builder = builder.method(PUBLIC, getter, "()I", |m| {
            m.load(Opcode::Aload, 0)
                .getfield("demo/Point", field, "I")
                .op(Opcode::Ireturn)
        });
    }
    builder.build()
}

#[test]
fn test_output_modes_conflict() -> Result<()> {
    let result = RunConfiguration::builder()
        .output_directory("out")
        .in_place()
        .build();
    assert!(matches!(
        result,
        Err(Error::ConflictingOutputModes("output directory", "in-place"))
    ));

    let result = RunConfiguration::builder()
        .output_sink(Arc::new(CollectingSink::new()))
        .output_sink(Arc::new(CollectingSink::new()))
        .build();
    assert!(matches!(result, Err(Error::ConflictingOutputModes(..))));
    Ok(())
}

#[test]
fn test_primary_inputs_need_an_output() -> Result<()> {
    let holder = ClassBuilder::new("demo/Holder").default_constructor().build()?;
    let result = RunConfiguration::builder().input(input(holder.clone())?).build();
    assert!(matches!(result, Err(Error::MissingOutput)));

    // A classpath alone is fine: there is nothing to write.
    let config = RunConfiguration::builder().classpath(input(holder)?).build()?;
    assert!(config.output().is_none());
    assert!(config.universe().class("demo/Holder").is_some());
    Ok(())
}

#[test]
fn test_multi_release_inputs_are_rejected() -> Result<()> {
    let bytes = ClassBuilder::new("demo/Holder").build()?.to_bytes()?;
    let result = RunConfiguration::builder()
        .input(BytesInput::new("lib/META-INF/versions/17/demo/Holder.class", bytes))
        .output_sink(Arc::new(CollectingSink::new()))
        .build();
    match result {
        Err(Error::MultiReleaseInput { key }) => assert!(key.contains("versions/17")),
        other => panic!("expected a multi-release rejection, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_duplicate_primary_classes_are_rejected() -> Result<()> {
    let bytes = ClassBuilder::new("demo/Holder").build()?.to_bytes()?;
    let result = RunConfiguration::builder()
        .input(BytesInput::new("a/demo/Holder.class", bytes.clone()))
        .input(BytesInput::new("b/demo/Holder.class", bytes.clone()))
        .output_sink(Arc::new(CollectingSink::new()))
        .build();
    assert!(matches!(result, Err(Error::DuplicateClass { .. })));

    // The primary copy wins over a classpath copy.
    let config = RunConfiguration::builder()
        .input(BytesInput::new("a/demo/Holder.class", bytes.clone()))
        .classpath(BytesInput::new("b/demo/Holder.class", bytes))
        .output_sink(Arc::new(CollectingSink::new()))
        .build()?;
    let entry = config
        .universe()
        .get("demo/Holder")
        .ok_or_else(|| Error::Error("class missing".into()))?;
    assert!(entry.is_primary());
    assert_eq!(entry.input().key(), "a/demo/Holder.class");
    Ok(())
}

#[test]
fn test_markers_are_collected() -> Result<()> {
    let constants = ClassBuilder::new("demo/Constants")
        .field_with(STATIC_FINAL, "LIMIT", "I", |f| f.annotate_visible(CONSTANT))
        .method(PUBLIC | AccessFlags::STATIC, "twice", "(I)I", |m| {
            m.annotate(CONSTANT)
                .load(Opcode::Iload, 0)
                .int(2)
                .op(Opcode::Imul)
                .op(Opcode::Ireturn)
        })
        .method(PUBLIC, "size", "()I", |m| {
            m.annotate(CONSTANT).int(1).op(Opcode::Ireturn)
        })
        .build()?;
    let codec = ClassBuilder::new("demo/Codec").annotate(CONSTANT_TYPE).build()?;

    let config = configure(vec![constants, codec])?;
    assert!(config.constant_types().contains("demo/Codec"));
    assert!(config.is_constant_field(&MemberReference::new("demo/Constants", "LIMIT", "I")));
    assert!(matches!(
        config
            .constant_methods()
            .get(&MemberReference::new("demo/Constants", "twice", "(I)I")),
        Some(ReconstructorPredicate::AllowAll)
    ));
    assert!(matches!(
        config
            .constant_methods()
            .get(&MemberReference::new("demo/Constants", "size", "()I")),
        Some(ReconstructorPredicate::InstanceOf(owner)) if owner == "demo/Constants"
    ));
    Ok(())
}

#[test]
fn test_constructor_reconstructor_matches_getters() -> Result<()> {
    let config = configure(vec![point(&["getX", "y"], Some(RECONSTRUCTOR), true)?])?;
    let selector = config
        .selector_for("demo/Point")
        .ok_or_else(|| Error::Error("no selector".into()))?;
    let recipes = selector.executable_recipes();
    assert_eq!(recipes.len(), 1);

    let recipe = recipes[0];
    assert_eq!(recipe.kind(), RecipeKind::Constructor);
    assert_eq!(recipe.member(), &MemberReference::new("demo/Point", "<init>", "(II)V"));
    let getters: Vec<&str> = recipe
        .accessors()
        .iter()
        .inspect(|a| assert_eq!(a.kind, AccessorKind::Getter))
        .map(|a| a.member.name.as_str())
        .collect();
    assert_eq!(getters, vec!["getX", "y"]);
    Ok(())
}

#[test]
fn test_missing_parameter_names() -> Result<()> {
    let result = configure(vec![point(&["getX", "getY"], Some(RECONSTRUCTOR), false)?]);
    assert!(matches!(result, Err(Error::MissingParameterNames(ref executable)) if executable.contains("<init>")));
    Ok(())
}

#[test]
fn test_missing_accessor() -> Result<()> {
    let result = configure(vec![point(&["getX"], Some(RECONSTRUCTOR), true)?]);
    assert!(matches!(
        result,
        Err(Error::MissingAccessor { index: 1, ref parameter, .. }) if parameter == "y"
    ));
    Ok(())
}

#[test]
fn test_ambiguous_accessor() -> Result<()> {
    let result = configure(vec![point(&["x", "getX", "getY"], Some(RECONSTRUCTOR), true)?]);
    match result {
        Err(Error::AmbiguousAccessor { index, candidates, .. }) => {
            assert_eq!(index, 0);
            assert_eq!(candidates.len(), 2);
            assert!(candidates.contains(&"x".to_string()));
            assert!(candidates.contains(&"getX".to_string()));
        }
        other => panic!("expected an ambiguous accessor, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_duplicate_reconstructors() -> Result<()> {
    let factories = ClassBuilder::new("demo/Boxes")
        .method(PUBLIC | AccessFlags::STATIC, "empty", "()Ldemo/Box;", |m| {
            m.annotate(RECONSTRUCTOR).op(Opcode::AconstNull).op(Opcode::Areturn)
        })
        .method(PUBLIC | AccessFlags::STATIC, "none", "()Ldemo/Box;", |m| {
            m.annotate(RECONSTRUCTOR).op(Opcode::AconstNull).op(Opcode::Areturn)
        })
        .build()?;
    let result = configure(vec![factories]);
    match result {
        Err(Error::DuplicateReconstructor { value_type, existing, duplicate }) => {
            assert_eq!(value_type, "demo.Box");
            assert!(existing.contains("empty"));
            assert!(duplicate.contains("none"));
        }
        other => panic!("expected a duplicate reconstructor, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_invalid_marker_placements() -> Result<()> {
    let instance_field = ClassBuilder::new("demo/A")
        .field_with(PUBLIC, "shared", "Ldemo/A;", |f| f.annotate(RECONSTRUCTOR))
        .build()?;
    let primitive_field = ClassBuilder::new("demo/B")
        .field_with(STATIC_FINAL, "ZERO", "I", |f| f.annotate(RECONSTRUCTOR))
        .build()?;
    let initializer = ClassBuilder::new("demo/C")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.annotate(CONSTANT).op(Opcode::Return)
        })
        .build()?;
    let primitive_factory = ClassBuilder::new("demo/D")
        .method(PUBLIC | AccessFlags::STATIC, "zero", "()I", |m| {
            m.annotate(RECONSTRUCTOR).op(Opcode::Iconst0).op(Opcode::Ireturn)
        })
        .build()?;

    for class in [instance_field, primitive_field, initializer, primitive_factory] {
        let name = class.name.clone();
        let result = configure(vec![class]);
        assert!(
            matches!(result, Err(Error::InvalidMarker { .. })),
            "{name}: {result:?}"
        );
    }
    Ok(())
}

#[test]
fn test_transient_reusable_instance_is_skipped() -> Result<()> {
    let class = ClassBuilder::new("demo/Cache")
        .field_with(STATIC_FINAL | AccessFlags::TRANSIENT, "EMPTY", "Ldemo/Cache;", |f| {
            f.annotate(RECONSTRUCTOR)
        })
        .build()?;
    let config = configure(vec![class])?;
    assert!(config.selector_for("demo/Cache").is_none());
    assert!(config.events().has(EventKind::Warning));
    Ok(())
}

#[test]
fn test_enum_recipes() -> Result<()> {
    let enumerator = STATIC_FINAL | AccessFlags::ENUM;
    let level = ClassBuilder::new("demo/Level")
        .enumeration()
        .field(enumerator, "LOW", "Ldemo/Level;")
        .field(enumerator, "HIGH", "Ldemo/Level;")
        .method(PUBLIC | AccessFlags::STATIC, "valueOf", "(Ljava/lang/String;)Ldemo/Level;", |m| {
            m.class_literal("demo/Level")
                .load(Opcode::Aload, 0)
                .invokestatic(
                    "java/lang/Enum",
                    "valueOf",
                    "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;",
                )
                .type_op(Opcode::Checkcast, "demo/Level")
                .op(Opcode::Areturn)
        })
        .build()?;

    let config = configure(vec![level])?;
    let low = MemberReference::new("demo/Level", "LOW", "Ldemo/Level;");
    assert!(config.is_constant_field(&low));

    let selector = config
        .selector_for("demo/Level")
        .ok_or_else(|| Error::Error("no selector".into()))?;
    let alternatives = selector.alternatives();
    assert!(matches!(
        alternatives[0],
        DeconstructionSelector::StaticFieldEquality(fields) if fields.len() == 2 && fields[0] == low
    ));
    let recipes = selector.executable_recipes();
    assert_eq!(recipes.len(), 1);
    assert_eq!(recipes[0].member().name, "valueOf");
    Ok(())
}

#[test]
fn test_programmatic_entries_merge_with_markers() -> Result<()> {
    let zero = MemberReference::new("demo/BigNum", "ZERO", "Ldemo/BigNum;");
    let one = MemberReference::new("demo/BigNum", "ONE", "Ldemo/BigNum;");
    let big_num = ClassBuilder::new("demo/BigNum")
        .field_with(STATIC_FINAL, "ZERO", "Ldemo/BigNum;", |f| f.annotate(RECONSTRUCTOR))
        .field(STATIC_FINAL, "ONE", "Ldemo/BigNum;")
        .build()?;

    let config = RunConfiguration::builder()
        .input(input(big_num)?)
        .selector("demo/BigNum", DeconstructionSelector::StaticFieldEquality(vec![one.clone()]))
        .output_sink(Arc::new(CollectingSink::new()))
        .build()?;
    let selector = config
        .selector_for("demo/BigNum")
        .ok_or_else(|| Error::Error("no selector".into()))?;
    match selector {
        DeconstructionSelector::StaticFieldEquality(fields) => {
            assert_eq!(fields.len(), 2);
            assert!(fields.contains(&zero));
            assert!(fields.contains(&one));
        }
        other => panic!("expected a merged equality list, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_platform_defaults() -> Result<()> {
    let config = RunConfiguration::builder().platform_defaults().build()?;
    let parse_int = MemberReference::new("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I");
    assert!(matches!(
        config.constant_predicate(&parse_int, true),
        Some(ReconstructorPredicate::AllowAll)
    ));
    assert!(config.selector_for("java/lang/Integer").is_some());

    let bare = RunConfiguration::builder().build()?;
    assert!(bare.constant_predicate(&parse_int, true).is_none());
    Ok(())
}
