//! End-to-end folding runs over synthesized class files.
//!
//! Every test builds its input classes with [`ClassBuilder`], runs the [`Optimizer`] against a
//! [`CollectingSink`] (or a temporary directory) and inspects the emitted bytes.

use std::sync::Arc;

use classfold::{
    config::{CONSTANT, RECONSTRUCTOR},
    emulation::{ClassUniverse, EmulationLimits, ExecutionContext, InvokeKind, Value},
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

fn emitted(sink: &CollectingSink, class: &str) -> Result<ClassFile> {
    let bytes = sink
        .get(&format!("{class}.class"))
        .ok_or_else(|| Error::Error(format!("{class} was not emitted")))?;
    ClassFile::parse(&bytes, ParseMode::Full)
}

fn real_code(class: &ClassFile, name: &str, descriptor: &str) -> Vec<Instruction> {
    class
        .find_method(name, descriptor)
        .and_then(|m| m.code.as_ref())
        .map(|code| code.real_instructions().cloned().collect())
        .unwrap_or_default()
}

/// `static final int X = Integer.parseInt("10")`
fn parse_int_holder() -> Result<ClassFile> {
    parse_int_class("demo/Holder")
}

fn parse_int_class(name: &str) -> Result<ClassFile> {
    ClassBuilder::new(name)
        .field(STATIC_FINAL, "X", "I")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.string("10")
                .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
                .putstatic(name, "X", "I")
                .op(Opcode::Return)
        })
        .build()
}

/// A value class with an `int` component, a constructor, a getter and `equals`.
fn value_class(
    name: &str,
    configure: impl FnOnce(ClassBuilder) -> ClassBuilder,
    constructor_markers: &[&str],
) -> Result<ClassFile> {
    let owner = name.to_string();
    let builder = ClassBuilder::new(name)
        .field(AccessFlags::PRIVATE | AccessFlags::FINAL, "v", "I")
        .method(PUBLIC, "<init>", "(I)V", |m| {
            let m = constructor_markers
                .iter()
                .fold(m, |m, marker| m.annotate(marker))
                .parameter_names(&["v"]);
            m.load(Opcode::Aload, 0)
                .invokespecial("java/lang/Object", "<init>", "()V")
                .load(Opcode::Aload, 0)
                .load(Opcode::Iload, 1)
                .putfield(&owner, "v", "I")
                .op(Opcode::Return)
        })
        .method(PUBLIC, "getV", "()I", |m| {
            m.load(Opcode::Aload, 0).getfield(&owner, "v", "I").op(Opcode::Ireturn)
        })
        .method(PUBLIC, "equals", "(Ljava/lang/Object;)Z", |mut m| {
            let differ = m.new_label();
            m.load(Opcode::Aload, 0)
                .getfield(&owner, "v", "I")
                .load(Opcode::Aload, 1)
                .type_op(Opcode::Checkcast, &owner)
                .getfield(&owner, "v", "I")
                .jump(Opcode::IfIcmpne, differ)
                .op(Opcode::Iconst1)
                .op(Opcode::Ireturn)
                .place(differ)
                .op(Opcode::Iconst0)
                .op(Opcode::Ireturn)
        });
    configure(builder).build()
}

/// `BigNum` with a reusable `ZERO` and a constant constructor.
fn big_num() -> Result<ClassFile> {
    value_class(
        "demo/BigNum",
        |b| {
            b.field_with(STATIC_FINAL, "ZERO", "Ldemo/BigNum;", |f| f.annotate(RECONSTRUCTOR))
                .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
                    m.new_object("demo/BigNum")
                        .op(Opcode::Dup)
                        .int(0)
                        .invokespecial("demo/BigNum", "<init>", "(I)V")
                        .putstatic("demo/BigNum", "ZERO", "Ldemo/BigNum;")
                        .op(Opcode::Return)
                })
        },
        &[CONSTANT],
    )
}

/// `static final BigNum Z = new BigNum(0)`
fn big_num_holder() -> Result<ClassFile> {
    ClassBuilder::new("demo/Holder")
        .field(STATIC_FINAL, "Z", "Ldemo/BigNum;")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.new_object("demo/BigNum")
                .op(Opcode::Dup)
                .int(0)
                .invokespecial("demo/BigNum", "<init>", "(I)V")
                .putstatic("demo/Holder", "Z", "Ldemo/BigNum;")
                .op(Opcode::Return)
        })
        .build()
}

/// `enum Color { RED, BLUE }`
fn color() -> Result<ClassFile> {
    let enumerator = STATIC_FINAL | AccessFlags::ENUM;
    ClassBuilder::new("demo/Color")
        .enumeration()
        .field(enumerator, "RED", "Ldemo/Color;")
        .field(enumerator, "BLUE", "Ldemo/Color;")
        .method(AccessFlags::PRIVATE, "<init>", "(Ljava/lang/String;I)V", |m| {
            m.load(Opcode::Aload, 0)
                .load(Opcode::Aload, 1)
                .load(Opcode::Iload, 2)
                .invokespecial("java/lang/Enum", "<init>", "(Ljava/lang/String;I)V")
                .op(Opcode::Return)
        })
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.new_object("demo/Color")
                .op(Opcode::Dup)
                .string("RED")
                .int(0)
                .invokespecial("demo/Color", "<init>", "(Ljava/lang/String;I)V")
                .putstatic("demo/Color", "RED", "Ldemo/Color;")
                .new_object("demo/Color")
                .op(Opcode::Dup)
                .string("BLUE")
                .int(1)
                .invokespecial("demo/Color", "<init>", "(Ljava/lang/String;I)V")
                .putstatic("demo/Color", "BLUE", "Ldemo/Color;")
                .op(Opcode::Return)
        })
        .build()
}

/// `static boolean check() { return Color.RED.equals(Color.BLUE); }`
fn color_check() -> Result<ClassFile> {
    ClassBuilder::new("demo/Check")
        .method(PUBLIC | AccessFlags::STATIC, "check", "()Z", |m| {
            m.getstatic("demo/Color", "RED", "Ldemo/Color;")
                .getstatic("demo/Color", "BLUE", "Ldemo/Color;")
                .invokevirtual("demo/Color", "equals", "(Ljava/lang/Object;)Z")
                .op(Opcode::Ireturn)
        })
        .build()
}

#[test]
fn test_parse_int_becomes_constant_value() -> Result<()> {
    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(parse_int_holder()?)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    let holder = emitted(&sink, "demo/Holder")?;
    assert_eq!(
        holder.find_field("X", "I").and_then(|f| f.constant_value.clone()),
        Some(Constant::Integer(10))
    );
    assert!(holder.find_method("<clinit>", "()V").is_none());

    let stats = result.stats();
    assert_eq!(stats.constants_folded, 1);
    assert_eq!(stats.fields_resolved, 1);
    assert_eq!(stats.constant_values_inlined, 1);
    assert_eq!(stats.initializers_removed, 1);
    assert_eq!(stats.classes_emitted, 1);
    assert_eq!(result.passes, 2);
    assert_eq!(result.emitted, vec!["demo/Holder".to_string()]);
    Ok(())
}

#[test]
fn test_equal_instance_is_reused() -> Result<()> {
    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(big_num()?)?)
        .input(input(big_num_holder()?)?)
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    let holder = emitted(&sink, "demo/Holder")?;
    assert_eq!(
        real_code(&holder, "<clinit>", "()V"),
        vec![
            Instruction::Field {
                opcode: Opcode::Getstatic,
                member: MemberReference::new("demo/BigNum", "ZERO", "Ldemo/BigNum;"),
            },
            Instruction::Field {
                opcode: Opcode::Putstatic,
                member: MemberReference::new("demo/Holder", "Z", "Ldemo/BigNum;"),
            },
            Instruction::Simple(Opcode::Return),
        ]
    );
    assert_eq!(result.stats().instances_deconstructed, 1);

    // Markers are gone from the value class, everything else is kept.
    let big_num = emitted(&sink, "demo/BigNum")?;
    assert!(big_num.fields.iter().all(|f| f.annotations.is_empty()));
    assert!(big_num.methods.iter().all(|m| m.annotations.is_empty()));
    assert!(big_num.find_method("equals", "(Ljava/lang/Object;)Z").is_some());

    // The rewritten initializer yields the singleton itself.
    let mut universe = ClassUniverse::new();
    universe.insert(Arc::new(BytesInput::for_class("demo/Holder", holder.to_bytes()?)), true)?;
    universe.insert(Arc::new(BytesInput::for_class("demo/BigNum", big_num.to_bytes()?)), true)?;
    let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
    let z = ctx
        .get_static(&MemberReference::new("demo/Holder", "Z", "Ldemo/BigNum;"))
        .map_err(|e| Error::Error(e.to_string()))?;
    let zero = ctx
        .get_static(&MemberReference::new("demo/BigNum", "ZERO", "Ldemo/BigNum;"))
        .map_err(|e| Error::Error(e.to_string()))?;
    assert!(z.identical(&zero));
    Ok(())
}

#[test]
fn test_unmarked_method_is_left_alone() -> Result<()> {
    let helper = ClassBuilder::new("demo/Helper")
        .method(PUBLIC | AccessFlags::STATIC, "compute", "()I", |m| {
            m.int(7).op(Opcode::Ireturn)
        })
        .build()?;
    let holder = ClassBuilder::new("demo/Holder")
        .field(STATIC_FINAL, "Y", "I")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.invokestatic("demo/Helper", "compute", "()I")
                .putstatic("demo/Holder", "Y", "I")
                .op(Opcode::Return)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(helper)?)
        .input(input(holder)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    assert!(sink.is_empty());
    assert!(result.emitted.is_empty());
    assert_eq!(result.passes, 1);
    assert_eq!(result.stats().constants_folded, 0);
    Ok(())
}

#[test]
fn test_classpath_classes_are_never_emitted() -> Result<()> {
    let codes = ClassBuilder::new("lib/Codes")
        .method(PUBLIC | AccessFlags::STATIC, "triple", "(I)I", |m| {
            m.annotate(CONSTANT)
                .load(Opcode::Iload, 0)
                .int(3)
                .op(Opcode::Imul)
                .op(Opcode::Ireturn)
        })
        .build()?;
    let user = ClassBuilder::new("demo/User")
        .method(PUBLIC | AccessFlags::STATIC, "fifteen", "()I", |m| {
            m.int(5).invokestatic("lib/Codes", "triple", "(I)I").op(Opcode::Ireturn)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(user)?)
        .classpath(input(codes)?)
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    assert_eq!(sink.len(), 1);
    assert!(sink.get("lib/Codes.class").is_none());
    let user = emitted(&sink, "demo/User")?;
    assert_eq!(
        real_code(&user, "fifteen", "()I"),
        vec![Instruction::int(15), Instruction::Simple(Opcode::Ireturn)]
    );
    assert_eq!(result.emitted, vec!["demo/User".to_string()]);
    Ok(())
}

#[test]
fn test_enum_equality_folds_to_literal() -> Result<()> {
    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(color()?)?)
        .input(input(color_check()?)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    let check = emitted(&sink, "demo/Check")?;
    assert_eq!(
        real_code(&check, "check", "()Z"),
        vec![Instruction::Simple(Opcode::Iconst0), Instruction::Simple(Opcode::Ireturn)]
    );
    assert!(sink.get("demo/Color.class").is_none());
    assert_eq!(result.stats().instances_deconstructed, 0);
    Ok(())
}

#[test]
fn test_recipe_reproduces_the_value() -> Result<()> {
    let money = value_class(
        "demo/Money",
        |b| {
            b.method(PUBLIC | AccessFlags::STATIC, "of", "(I)Ldemo/Money;", |m| {
                m.annotate(CONSTANT)
                    .new_object("demo/Money")
                    .op(Opcode::Dup)
                    .load(Opcode::Iload, 0)
                    .invokespecial("demo/Money", "<init>", "(I)V")
                    .op(Opcode::Areturn)
            })
        },
        &[RECONSTRUCTOR],
    )?;
    let prices = ClassBuilder::new("demo/Prices")
        .field(STATIC_FINAL, "PRICE", "Ldemo/Money;")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.int(250)
                .invokestatic("demo/Money", "of", "(I)Ldemo/Money;")
                .putstatic("demo/Prices", "PRICE", "Ldemo/Money;")
                .op(Opcode::Return)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(money)?)
        .input(input(prices)?)
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;
    assert_eq!(result.stats().instances_deconstructed, 1);

    let prices = emitted(&sink, "demo/Prices")?;
    let clinit = prices
        .find_method("<clinit>", "()V")
        .and_then(|m| m.code.as_ref())
        .ok_or_else(|| Error::Error("initializer missing".into()))?;
    assert_eq!(
        clinit.real_instructions().take(4).cloned().collect::<Vec<_>>(),
        vec![
            Instruction::Type {
                opcode: Opcode::New,
                class: "demo/Money".into(),
            },
            Instruction::Simple(Opcode::Dup),
            Instruction::int(250),
            Instruction::Invoke {
                opcode: Opcode::Invokespecial,
                member: MemberReference::new("demo/Money", "<init>", "(I)V"),
                interface: false,
            },
        ]
    );
    assert!(clinit.max_stack >= 3);

    // Running the rewritten initializer produces an equal value.
    let money = emitted(&sink, "demo/Money")?;
    let mut universe = ClassUniverse::new();
    universe.insert(Arc::new(BytesInput::for_class("demo/Prices", prices.to_bytes()?)), true)?;
    universe.insert(Arc::new(BytesInput::for_class("demo/Money", money.to_bytes()?)), true)?;
    let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
    let price = ctx
        .get_static(&MemberReference::new("demo/Prices", "PRICE", "Ldemo/Money;"))
        .map_err(|e| Error::Error(e.to_string()))?;
    let amount = ctx
        .invoke(InvokeKind::Virtual, &MemberReference::new("demo/Money", "getV", "()I"), vec![price])
        .map_err(|e| Error::Error(e.to_string()))?;
    assert_eq!(amount, Some(Value::Int(250)));
    Ok(())
}

#[test]
fn test_static_initializer_never_reads_unassigned_fields() -> Result<()> {
    // UNIT is computed before ONE is assigned, so ONE must not replace it.
    let units = value_class(
        "demo/Unit",
        |b| {
            b.field(STATIC_FINAL, "UNIT", "Ldemo/Unit;")
                .field_with(STATIC_FINAL, "ONE", "Ldemo/Unit;", |f| f.annotate(RECONSTRUCTOR))
                .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
                    m.new_object("demo/Unit")
                        .op(Opcode::Dup)
                        .int(1)
                        .invokespecial("demo/Unit", "<init>", "(I)V")
                        .putstatic("demo/Unit", "UNIT", "Ldemo/Unit;")
                        .new_object("demo/Unit")
                        .op(Opcode::Dup)
                        .int(1)
                        .invokespecial("demo/Unit", "<init>", "(I)V")
                        .putstatic("demo/Unit", "ONE", "Ldemo/Unit;")
                        .op(Opcode::Return)
                })
        },
        &[CONSTANT],
    )?;
    let original = real_code(&units, "<clinit>", "()V");

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(units)?)
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    let units = emitted(&sink, "demo/Unit")?;
    assert_eq!(real_code(&units, "<clinit>", "()V"), original);
    assert_eq!(result.stats().instances_deconstructed, 0);
    assert!(result
        .events
        .filter_kind(EventKind::FoldSkipped)
        .any(|e| e.message.contains("not yet assigned")));
    Ok(())
}

#[test]
fn test_cyclic_graph_fails_deconstruction() -> Result<()> {
    let node = ClassBuilder::new("demo/Node")
        .field(AccessFlags::PRIVATE, "next", "Ldemo/Node;")
        .method(PUBLIC, "<init>", "(Ldemo/Node;)V", |m| {
            m.annotate(RECONSTRUCTOR)
                .parameter_names(&["next"])
                .load(Opcode::Aload, 0)
                .invokespecial("java/lang/Object", "<init>", "()V")
                .load(Opcode::Aload, 0)
                .load(Opcode::Aload, 1)
                .putfield("demo/Node", "next", "Ldemo/Node;")
                .op(Opcode::Return)
        })
        .method(PUBLIC, "getNext", "()Ldemo/Node;", |m| {
            m.load(Opcode::Aload, 0)
                .getfield("demo/Node", "next", "Ldemo/Node;")
                .op(Opcode::Areturn)
        })
        .method(PUBLIC | AccessFlags::STATIC, "loop", "()Ldemo/Node;", |m| {
            m.annotate(CONSTANT)
                .new_object("demo/Node")
                .op(Opcode::Dup)
                .op(Opcode::AconstNull)
                .invokespecial("demo/Node", "<init>", "(Ldemo/Node;)V")
                .store(Opcode::Astore, 0)
                .load(Opcode::Aload, 0)
                .load(Opcode::Aload, 0)
                .putfield("demo/Node", "next", "Ldemo/Node;")
                .load(Opcode::Aload, 0)
                .op(Opcode::Areturn)
        })
        .build()?;
    let user = ClassBuilder::new("demo/Ring")
        .method(PUBLIC | AccessFlags::STATIC, "get", "()Ldemo/Node;", |m| {
            m.invokestatic("demo/Node", "loop", "()Ldemo/Node;").op(Opcode::Areturn)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(node)?)
        .input(input(user)?)
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    assert!(sink.get("demo/Ring.class").is_none());
    assert!(result
        .events
        .filter_kind(EventKind::FoldSkipped)
        .any(|e| e.message.contains("cyclic")));
    Ok(())
}

#[test]
fn test_second_run_changes_nothing() -> Result<()> {
    let big_num_init = MemberReference::new("demo/BigNum", "<init>", "(I)V");
    let zero = MemberReference::new("demo/BigNum", "ZERO", "Ldemo/BigNum;");
    let configure = |builder: RunConfigurationBuilder| {
        builder
            .platform_defaults()
            .constant_method(big_num_init.clone(), ReconstructorPredicate::AllowAll)
            .selector("demo/BigNum", DeconstructionSelector::StaticFieldEquality(vec![zero.clone()]))
    };
    let unmarked_big_num = value_class(
        "demo/BigNum",
        |b| {
            b.field(STATIC_FINAL, "ZERO", "Ldemo/BigNum;")
                .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
                    m.new_object("demo/BigNum")
                        .op(Opcode::Dup)
                        .int(0)
                        .invokespecial("demo/BigNum", "<init>", "(I)V")
                        .putstatic("demo/BigNum", "ZERO", "Ldemo/BigNum;")
                        .op(Opcode::Return)
                })
        },
        &[],
    )?;

    let first_inputs = vec![
        input(unmarked_big_num)?,
        input(big_num_holder()?)?,
        input(parse_int_class("demo/Parsed")?)?,
        input(color()?)?,
        input(color_check()?)?,
    ];
    let first = Arc::new(CollectingSink::new());
    let config = configure(RunConfiguration::builder())
        .inputs(first_inputs.clone())
        .output_sink(first.clone())
        .build()?;
    Optimizer::new(config).run()?;
    assert_eq!(first.len(), 3);

    // Feed the outputs back in place of their inputs.
    let second_inputs: Vec<BytesInput> = first_inputs
        .into_iter()
        .map(|original| match first.get(original.key()) {
            Some(bytes) => BytesInput::new(original.key(), bytes),
            None => original,
        })
        .collect();
    let second = Arc::new(CollectingSink::new());
    let config = configure(RunConfiguration::builder())
        .inputs(second_inputs)
        .output_sink(second.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    assert!(second.is_empty());
    assert_eq!(result.stats().constants_folded, 0);
    assert_eq!(result.stats().instances_deconstructed, 0);
    Ok(())
}

#[test]
fn test_directory_output() -> Result<()> {
    let out = tempfile::tempdir()?;
    let config = RunConfiguration::builder()
        .input(input(parse_int_holder()?)?)
        .platform_defaults()
        .output_directory(out.path())
        .build()?;
    Optimizer::new(config).run()?;

    let bytes = std::fs::read(out.path().join("demo/Holder.class"))?;
    let holder = ClassFile::parse(&bytes, ParseMode::Full)?;
    assert_eq!(
        holder.find_field("X", "I").and_then(|f| f.constant_value.clone()),
        Some(Constant::Integer(10))
    );
    Ok(())
}

#[test]
fn test_in_place_output_replaces_the_input_file() -> Result<()> {
    let root = tempfile::tempdir()?;
    std::fs::create_dir_all(root.path().join("demo"))?;
    let path = root.path().join("demo/Holder.class");
    std::fs::write(&path, parse_int_holder()?.to_bytes()?)?;

    let config = RunConfiguration::builder()
        .inputs(PathInput::scan_directory(root.path())?)
        .platform_defaults()
        .in_place()
        .build()?;
    let result = Optimizer::new(config).run()?;
    assert_eq!(result.emitted, vec!["demo/Holder".to_string()]);

    let holder = ClassFile::parse(&std::fs::read(&path)?, ParseMode::Full)?;
    assert!(holder.find_method("<clinit>", "()V").is_none());
    Ok(())
}

#[test]
fn test_shared_instance_keeps_its_identity() -> Result<()> {
    let point = value_class("demo/Point", |b| b, &[CONSTANT, RECONSTRUCTOR])?;
    let a = ClassBuilder::new("demo/A")
        .field_with(STATIC_FINAL, "P", "Ldemo/Point;", |f| f.annotate(CONSTANT))
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.new_object("demo/Point")
                .op(Opcode::Dup)
                .int(1)
                .invokespecial("demo/Point", "<init>", "(I)V")
                .putstatic("demo/A", "P", "Ldemo/Point;")
                .op(Opcode::Return)
        })
        .build()?;
    let b = ClassBuilder::new("demo/B")
        .field(STATIC_FINAL, "N", "I")
        .field(STATIC_FINAL, "Q", "Ldemo/Point;")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.string("3")
                .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
                .putstatic("demo/B", "N", "I")
                .getstatic("demo/A", "P", "Ldemo/Point;")
                .putstatic("demo/B", "Q", "Ldemo/Point;")
                .op(Opcode::Return)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(point)?)
        .input(input(a)?)
        .input(input(b)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    Optimizer::new(config).run()?;

    let b = emitted(&sink, "demo/B")?;
    assert_eq!(
        real_code(&b, "<clinit>", "()V"),
        vec![
            Instruction::Field {
                opcode: Opcode::Getstatic,
                member: MemberReference::new("demo/A", "P", "Ldemo/Point;"),
            },
            Instruction::Field {
                opcode: Opcode::Putstatic,
                member: MemberReference::new("demo/B", "Q", "Ldemo/Point;"),
            },
            Instruction::Simple(Opcode::Return),
        ]
    );

    let mut universe = ClassUniverse::new();
    for class in ["demo/Point", "demo/A", "demo/B"] {
        let bytes = emitted(&sink, class)?.to_bytes()?;
        universe.insert(Arc::new(BytesInput::for_class(class, bytes)), true)?;
    }
    let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
    let q = ctx
        .get_static(&MemberReference::new("demo/B", "Q", "Ldemo/Point;"))
        .map_err(|e| Error::Error(e.to_string()))?;
    let p = ctx
        .get_static(&MemberReference::new("demo/A", "P", "Ldemo/Point;"))
        .map_err(|e| Error::Error(e.to_string()))?;
    assert!(q.identical(&p));
    Ok(())
}

/// `static final StringBuilder SB = new StringBuilder(); static String next() { return SB.append("x").toString(); }`
fn log_class(name: &str, markers: &[&str]) -> Result<ClassFile> {
    ClassBuilder::new(name)
        .field_with(STATIC_FINAL, "SB", "Ljava/lang/StringBuilder;", |f| {
            markers.iter().fold(f, |f, marker| f.annotate(marker))
        })
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.new_object("java/lang/StringBuilder")
                .op(Opcode::Dup)
                .invokespecial("java/lang/StringBuilder", "<init>", "()V")
                .putstatic(name, "SB", "Ljava/lang/StringBuilder;")
                .op(Opcode::Return)
        })
        .method(PUBLIC | AccessFlags::STATIC, "next", "()Ljava/lang/String;", |m| {
            m.getstatic(name, "SB", "Ljava/lang/StringBuilder;")
                .string("x")
                .invokevirtual(
                    "java/lang/StringBuilder",
                    "append",
                    "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
                )
                .invokevirtual("java/lang/StringBuilder", "toString", "()Ljava/lang/String;")
                .op(Opcode::Areturn)
        })
        .build()
}

#[test]
fn test_shared_mutable_state_is_never_folded() -> Result<()> {
    let log = log_class("demo/Log", &[])?;
    let marked = log_class("demo/MarkedLog", &[CONSTANT])?;
    let original = real_code(&marked, "next", "()Ljava/lang/String;");

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(log)?)
        .input(input(marked)?)
        .input(input(parse_int_holder()?)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    // Holder.X forces a second pass; neither pass appends to the builders.
    assert_eq!(result.passes, 2);
    assert!(sink.get("demo/Log.class").is_none());
    let marked = emitted(&sink, "demo/MarkedLog")?;
    assert_eq!(real_code(&marked, "next", "()Ljava/lang/String;"), original);
    // Only Holder.X is resolved, the builders stay in their fields.
    assert_eq!(result.stats().fields_resolved, 1);
    Ok(())
}

#[test]
fn test_failed_evaluation_leaves_code_untouched() -> Result<()> {
    let holder = ClassBuilder::new("demo/Holder")
        .field(STATIC_FINAL, "X", "I")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.string("x1")
                .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
                .putstatic("demo/Holder", "X", "I")
                .op(Opcode::Return)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(holder)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    assert!(sink.is_empty());
    assert_eq!(result.stats().constants_folded, 0);
    let skipped: Vec<&Event> = result.events.filter_kind(EventKind::FoldSkipped).collect();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].message.contains("java.lang.NumberFormatException"));
    assert_eq!(
        skipped[0].member,
        Some(MemberReference::new("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I"))
    );
    Ok(())
}

#[test]
fn test_predicates_decide_per_call() -> Result<()> {
    let mut codes = ClassBuilder::new("lib/Codes");
    for (name, factor) in [("twice", 2), ("triple", 3), ("quad", 4)] {
        codes = codes.method(PUBLIC | AccessFlags::STATIC, name, "(I)I", |m| {
            m.load(Opcode::Iload, 0).int(factor).op(Opcode::Imul).op(Opcode::Ireturn)
        });
    }
    let codes = codes.build()?;
    let user = ClassBuilder::new("demo/User")
        .method(PUBLIC | AccessFlags::STATIC, "a", "()I", |m| {
            m.int(5).invokestatic("lib/Codes", "twice", "(I)I").op(Opcode::Ireturn)
        })
        .method(PUBLIC | AccessFlags::STATIC, "b", "()I", |m| {
            m.int(5).invokestatic("lib/Codes", "triple", "(I)I").op(Opcode::Ireturn)
        })
        .method(PUBLIC | AccessFlags::STATIC, "c", "()I", |m| {
            m.int(5).invokestatic("lib/Codes", "quad", "(I)I").op(Opcode::Ireturn)
        })
        .build()?;
    let original_a = real_code(&user, "a", "()I");
    let original_b = real_code(&user, "b", "()I");

    let member = |name: &str| MemberReference::new("lib/Codes", name, "(I)I");
    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(user)?)
        .classpath(input(codes)?)
        // Type predicates need a receiver, so a static call never passes them.
        .constant_method(member("twice"), ReconstructorPredicate::ExactType("lib/Codes".into()))
        .constant_method(member("triple"), ReconstructorPredicate::custom(|call| call.arguments.is_empty()))
        .constant_method(member("quad"), ReconstructorPredicate::custom(|call| call.member.name == "quad"))
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    let user = emitted(&sink, "demo/User")?;
    assert_eq!(real_code(&user, "a", "()I"), original_a);
    assert_eq!(real_code(&user, "b", "()I"), original_b);
    assert_eq!(
        real_code(&user, "c", "()I"),
        vec![Instruction::int(20), Instruction::Simple(Opcode::Ireturn)]
    );

    let rejected: Vec<&Event> = result
        .events
        .filter_kind(EventKind::FoldSkipped)
        .filter(|e| e.message.contains("rejected"))
        .collect();
    assert_eq!(rejected.len(), 2);
    assert_eq!(result.stats().constants_folded, 1);
    Ok(())
}

#[test]
fn test_folding_stops_at_block_boundaries() -> Result<()> {
    // return Integer.parseInt(flag ? "1" : "2") + Integer.parseInt("9");
    let choice = ClassBuilder::new("demo/Choice")
        .method(PUBLIC | AccessFlags::STATIC, "pick", "(Z)I", |mut m| {
            let other = m.new_label();
            let join = m.new_label();
            m.load(Opcode::Iload, 0)
                .jump(Opcode::Ifeq, other)
                .string("1")
                .jump(Opcode::Goto, join)
                .place(other)
                .string("2")
                .place(join)
                .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
                .string("9")
                .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
                .op(Opcode::Iadd)
                .op(Opcode::Ireturn)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(choice)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;
    assert_eq!(result.stats().constants_folded, 1);

    let choice = emitted(&sink, "demo/Choice")?;
    let code = real_code(&choice, "pick", "(Z)I");
    let parses = code
        .iter()
        .filter(|i| matches!(i, Instruction::Invoke { member, .. } if member.name == "parseInt"))
        .count();
    assert_eq!(parses, 1);
    assert!(code.contains(&Instruction::Ldc(Constant::String("1".into()))));
    assert!(code.contains(&Instruction::Ldc(Constant::String("2".into()))));
    assert_eq!(
        &code[code.len() - 3..],
        &[Instruction::int(9), Instruction::Simple(Opcode::Iadd), Instruction::Simple(Opcode::Ireturn)]
    );
    Ok(())
}

#[test]
fn test_operands_fold_when_the_result_cannot_be_written() -> Result<()> {
    // return new StringBuilder().append(Integer.parseInt("7"));
    let builder = ClassBuilder::new("demo/Builder")
        .method(PUBLIC | AccessFlags::STATIC, "make", "()Ljava/lang/Object;", |m| {
            m.new_object("java/lang/StringBuilder")
                .op(Opcode::Dup)
                .invokespecial("java/lang/StringBuilder", "<init>", "()V")
                .string("7")
                .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
                .invokevirtual("java/lang/StringBuilder", "append", "(I)Ljava/lang/StringBuilder;")
                .op(Opcode::Areturn)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(builder)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    let builder = emitted(&sink, "demo/Builder")?;
    let code = real_code(&builder, "make", "()Ljava/lang/Object;");
    assert_eq!(code.len(), 6);
    assert_eq!(code[3], Instruction::int(7));
    assert!(result
        .events
        .filter_kind(EventKind::FoldSkipped)
        .any(|e| e.message.contains("no recipe for java.lang.StringBuilder")));
    Ok(())
}

#[test]
fn test_class_initialization_runs_once_per_run() -> Result<()> {
    // The initializer counts its runs; a second run would show up in the folded value.
    let init = ClassBuilder::new("demo/Init")
        .field(PUBLIC | AccessFlags::STATIC, "runs", "I")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.getstatic("demo/Init", "runs", "I")
                .op(Opcode::Iconst1)
                .op(Opcode::Iadd)
                .putstatic("demo/Init", "runs", "I")
                .op(Opcode::Return)
        })
        .method(PUBLIC | AccessFlags::STATIC, "runs", "()I", |m| {
            m.annotate(CONSTANT).getstatic("demo/Init", "runs", "I").op(Opcode::Ireturn)
        })
        .build()?;
    let reader = |name: &str| {
        ClassBuilder::new(name)
            .method(PUBLIC | AccessFlags::STATIC, "read", "()I", |m| {
                m.invokestatic("demo/Init", "runs", "()I").op(Opcode::Ireturn)
            })
            .build()
    };

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(init)?)
        .input(input(reader("demo/First")?)?)
        .input(input(reader("demo/Second")?)?)
        .input(input(parse_int_holder()?)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;
    assert_eq!(result.passes, 2);

    for name in ["demo/First", "demo/Second"] {
        let reader = emitted(&sink, name)?;
        assert_eq!(
            real_code(&reader, "read", "()I"),
            vec![Instruction::Simple(Opcode::Iconst1), Instruction::Simple(Opcode::Ireturn)]
        );
    }
    Ok(())
}

#[test]
fn test_blank_final_without_fold_is_not_emitted() -> Result<()> {
    // static final int X; static { X = 5; }
    let blank = ClassBuilder::new("demo/Blank")
        .field(STATIC_FINAL, "X", "I")
        .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
            m.int(5).putstatic("demo/Blank", "X", "I").op(Opcode::Return)
        })
        .build()?;

    let sink = Arc::new(CollectingSink::new());
    let config = RunConfiguration::builder()
        .input(input(blank)?)
        .platform_defaults()
        .output_sink(sink.clone())
        .build()?;
    let result = Optimizer::new(config).run()?;

    assert!(sink.is_empty());
    assert!(result.emitted.is_empty());
    assert_eq!(result.stats().constant_values_inlined, 0);
    assert_eq!(result.stats().initializers_removed, 0);
    Ok(())
}
