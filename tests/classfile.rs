//! Reading, editing and writing class files through the public model.

use classfold::{
    classfile::{Attribute, Code},
    config::CONSTANT,
    prelude::*,
};

fn sample() -> Result<ClassFile> {
    ClassBuilder::new("demo/Sample")
        .field(AccessFlags::PRIVATE, "count", "I")
        .default_constructor()
        .method(AccessFlags::PUBLIC, "bump", "(I)I", |m| {
            m.annotate_visible(CONSTANT)
                .parameter_names(&["by"])
                .line(7)
                .load(Opcode::Aload, 0)
                .getfield("demo/Sample", "count", "I")
                .load(Opcode::Iload, 1)
                .op(Opcode::Iadd)
                .op(Opcode::Ireturn)
        })
        .build()
}

#[test]
fn test_structure_mode_defers_bodies() -> Result<()> {
    let bytes = sample()?.to_bytes()?;
    let full = ClassFile::parse(&bytes, ParseMode::Full)?;
    let mut structure = ClassFile::parse(&bytes, ParseMode::Structure)?;

    let bump = structure
        .find_method("bump", "(I)I")
        .ok_or_else(|| Error::Error("bump missing".into()))?;
    assert!(bump.code.is_none());
    assert!(bump.raw_code.is_some());

    structure.decode_bodies()?;
    let decoded: Vec<Instruction> = structure
        .find_method("bump", "(I)I")
        .and_then(|m| m.code.as_ref())
        .map(|c| c.real_instructions().cloned().collect())
        .unwrap_or_default();
    let expected: Vec<Instruction> = full
        .find_method("bump", "(I)I")
        .and_then(|m| m.code.as_ref())
        .map(|c| c.real_instructions().cloned().collect())
        .unwrap_or_default();
    assert_eq!(decoded.len(), 5);
    assert_eq!(decoded, expected);
    Ok(())
}

#[test]
fn test_untouched_class_is_written_back_unchanged() -> Result<()> {
    let bytes = sample()?.to_bytes()?;
    let class = ClassFile::parse(&bytes, ParseMode::Full)?;
    assert_eq!(class.to_bytes()?, bytes);
    Ok(())
}

#[test]
fn test_unknown_attributes_survive_edits() -> Result<()> {
    let mut class = sample()?;
    class.attributes.push(Attribute {
        name: "com.example.Stamp".into(),
        data: vec![1, 2, 3, 4],
    });
    let bytes = class.to_bytes()?;

    let mut class = ClassFile::parse(&bytes, ParseMode::Full)?;
    let index = class
        .methods
        .iter()
        .position(|m| m.name == "bump")
        .ok_or_else(|| Error::Error("bump missing".into()))?;
    let mut code = Code::new(1, 2);
    code.instructions = vec![Instruction::int(42), Instruction::Simple(Opcode::Ireturn)];
    class.methods[index].code = Some(code);

    let class = ClassFile::parse(&class.to_bytes()?, ParseMode::Full)?;
    assert!(class
        .attributes
        .iter()
        .any(|a| a.name == "com.example.Stamp" && a.data == [1, 2, 3, 4]));

    let bump = class
        .find_method("bump", "(I)I")
        .ok_or_else(|| Error::Error("bump missing".into()))?;
    assert!(bump.has_annotation(CONSTANT));
    assert_eq!(bump.parameter_names(&class.pool)?, Some(vec!["by".to_string()]));
    assert_eq!(
        bump.code
            .as_ref()
            .map(|c| c.real_instructions().cloned().collect::<Vec<_>>()),
        Some(vec![Instruction::Push { opcode: Opcode::Bipush, value: 42 }, Instruction::Simple(Opcode::Ireturn)])
    );
    Ok(())
}

#[test]
fn test_damaged_input_is_an_error() -> Result<()> {
    let bytes = sample()?.to_bytes()?;

    let truncated = ClassFile::parse(&bytes[..bytes.len() / 2], ParseMode::Full);
    assert!(matches!(truncated, Err(Error::OutOfBounds { .. }) | Err(Error::Malformed { .. })));

    let mut wrong_magic = bytes.clone();
    wrong_magic[0] = 0;
    assert!(ClassFile::parse(&wrong_magic, ParseMode::Structure).is_err());

    assert!(matches!(ClassFile::parse(&[], ParseMode::Full), Err(Error::Empty) | Err(Error::OutOfBounds { .. })));
    Ok(())
}
