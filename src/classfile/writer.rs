//! Class file writer.
//!
//! Everything after the constant pool is serialized into a scratch buffer first, because
//! encoding modified bodies and attribute names may append pool entries.

use crate::{
    classfile::{
        annotation::{write_annotations, Annotation},
        code::{self, MethodInfo},
        constantpool::ConstantPool,
        instruction::Constant,
        Attribute, ClassFile, FieldNode, MethodNode, MAGIC,
    },
    Error, Result,
};

pub(crate) fn write_class(class: &ClassFile) -> Result<Vec<u8>> {
    let mut pool = class.pool.clone();
    let mut body = Vec::new();

    body.extend_from_slice(&class.access.bits().to_be_bytes());
    body.extend_from_slice(&pool.add_class(&class.name)?.to_be_bytes());
    let super_index = match &class.super_name {
        Some(name) => pool.add_class(name)?,
        None => 0,
    };
    body.extend_from_slice(&super_index.to_be_bytes());

    write_count(&mut body, class.interfaces.len(), "interfaces")?;
    for interface in &class.interfaces {
        body.extend_from_slice(&pool.add_class(interface)?.to_be_bytes());
    }

    write_count(&mut body, class.fields.len(), "fields")?;
    for field in &class.fields {
        write_field(&mut body, &mut pool, field)?;
    }

    write_count(&mut body, class.methods.len(), "methods")?;
    for method in &class.methods {
        write_method(&mut body, &mut pool, &class.name, method)?;
    }

    let mut attributes = Vec::new();
    annotation_attributes(&mut attributes, &class.annotations);
    if !class.bootstrap_methods.is_empty() {
        let mut data = Vec::new();
        data.extend_from_slice(&(class.bootstrap_methods.len() as u16).to_be_bytes());
        for method in &class.bootstrap_methods {
            data.extend_from_slice(&method.handle.to_be_bytes());
            data.extend_from_slice(&(method.arguments.len() as u16).to_be_bytes());
            for argument in &method.arguments {
                data.extend_from_slice(&argument.to_be_bytes());
            }
        }
        attributes.push(("BootstrapMethods", data));
    }
    write_attributes(&mut body, &mut pool, attributes, &class.attributes)?;

    let mut out = Vec::with_capacity(body.len() + 1024);
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.extend_from_slice(&class.minor_version.to_be_bytes());
    out.extend_from_slice(&class.major_version.to_be_bytes());
    pool.write(&mut out);
    out.extend_from_slice(&body);
    Ok(out)
}

fn write_count(out: &mut Vec<u8>, count: usize, what: &str) -> Result<()> {
    let count = u16::try_from(count)
        .map_err(|_| Error::Error(format!("Too many {what} ({count}) for a class file")))?;
    out.extend_from_slice(&count.to_be_bytes());
    Ok(())
}

fn write_field(out: &mut Vec<u8>, pool: &mut ConstantPool, field: &FieldNode) -> Result<()> {
    out.extend_from_slice(&field.access.bits().to_be_bytes());
    out.extend_from_slice(&pool.add_utf8(&field.name)?.to_be_bytes());
    out.extend_from_slice(&pool.add_utf8(&field.descriptor)?.to_be_bytes());

    let mut attributes = Vec::new();
    if let Some(constant) = &field.constant_value {
        let index = match constant {
            Constant::Integer(value) => pool.add_integer(*value)?,
            Constant::Float(value) => pool.add_float(*value)?,
            Constant::Long(value) => pool.add_long(*value)?,
            Constant::Double(value) => pool.add_double(*value)?,
            Constant::String(text) => pool.add_string(text)?,
            other => {
                return Err(malformed_error!(
                    "{} is not a valid ConstantValue for field {}",
                    other,
                    field.name
                ))
            }
        };
        attributes.push(("ConstantValue", index.to_be_bytes().to_vec()));
    }
    annotation_attributes(&mut attributes, &field.annotations);
    write_attributes(out, pool, attributes, &field.attributes)
}

fn write_method(
    out: &mut Vec<u8>,
    pool: &mut ConstantPool,
    owner: &str,
    method: &MethodNode,
) -> Result<()> {
    out.extend_from_slice(&method.access.bits().to_be_bytes());
    out.extend_from_slice(&pool.add_utf8(&method.name)?.to_be_bytes());
    out.extend_from_slice(&pool.add_utf8(&method.descriptor)?.to_be_bytes());

    let mut attributes = Vec::new();
    match (&method.code, &method.raw_code) {
        (Some(code), _) if code.modified => {
            let info = MethodInfo {
                owner,
                name: &method.name,
                descriptor: &method.descriptor,
                is_static: method.access.is_static(),
            };
            attributes.push(("Code", code::encode(code, pool, info)?));
        }
        (_, Some(raw)) => attributes.push(("Code", raw.clone())),
        (Some(code), None) => {
            let info = MethodInfo {
                owner,
                name: &method.name,
                descriptor: &method.descriptor,
                is_static: method.access.is_static(),
            };
            attributes.push(("Code", code::encode(code, pool, info)?));
        }
        (None, None) => {}
    }
    annotation_attributes(&mut attributes, &method.annotations);
    write_attributes(out, pool, attributes, &method.attributes)
}

fn annotation_attributes(attributes: &mut Vec<(&'static str, Vec<u8>)>, annotations: &[Annotation]) {
    if annotations.iter().any(|a| a.visible) {
        attributes.push((
            "RuntimeVisibleAnnotations",
            write_annotations(annotations.iter().filter(|a| a.visible)),
        ));
    }
    if annotations.iter().any(|a| !a.visible) {
        attributes.push((
            "RuntimeInvisibleAnnotations",
            write_annotations(annotations.iter().filter(|a| !a.visible)),
        ));
    }
}

fn write_attributes(
    out: &mut Vec<u8>,
    pool: &mut ConstantPool,
    known: Vec<(&'static str, Vec<u8>)>,
    other: &[Attribute],
) -> Result<()> {
    write_count(out, known.len() + other.len(), "attributes")?;
    for (name, data) in known {
        write_attribute(out, pool, name, &data)?;
    }
    for attribute in other {
        write_attribute(out, pool, &attribute.name, &attribute.data)?;
    }
    Ok(())
}

fn write_attribute(out: &mut Vec<u8>, pool: &mut ConstantPool, name: &str, data: &[u8]) -> Result<()> {
    let length = u32::try_from(data.len())
        .map_err(|_| Error::Error(format!("Attribute {name} exceeds 4 GiB")))?;
    out.extend_from_slice(&pool.add_utf8(name)?.to_be_bytes());
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::classfile::{
        AccessFlags, ClassBuilder, ClassFile, Constant, Instruction, Opcode, ParseMode,
    };

    #[test]
    fn unmodified_class_round_trips_byte_for_byte() {
        let bytes = ClassBuilder::new("demo/Holder")
            .field_with(
                AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
                "NAME",
                "Ljava/lang/String;",
                |f| f.constant(Constant::String("holder".into())),
            )
            .method(AccessFlags::STATIC, "<clinit>", "()V", |m| m.op(Opcode::Return))
            .build()
            .unwrap()
            .to_bytes()
            .unwrap();

        let full = ClassFile::parse(&bytes, ParseMode::Full).unwrap();
        assert_eq!(full.to_bytes().unwrap(), bytes);
        let structure = ClassFile::parse(&bytes, ParseMode::Structure).unwrap();
        assert_eq!(structure.to_bytes().unwrap(), bytes);
        assert_eq!(
            structure.fields[0].constant_value,
            Some(Constant::String("holder".into()))
        );
    }

    #[test]
    fn modified_body_is_reencoded() {
        let bytes = ClassBuilder::new("demo/Answer")
            .method(AccessFlags::STATIC, "get", "()I", |m| m.int(1).op(Opcode::Ireturn))
            .build()
            .unwrap()
            .to_bytes()
            .unwrap();

        let mut class = ClassFile::parse(&bytes, ParseMode::Full).unwrap();
        let code = class.methods[0].code.as_mut().unwrap();
        code.instructions[0] = Instruction::int(1_000_000);
        code.modified = true;
        let rewritten = class.to_bytes().unwrap();

        let reparsed = ClassFile::parse(&rewritten, ParseMode::Full).unwrap();
        let code = reparsed.methods[0].code.as_ref().unwrap();
        assert_eq!(
            code.instructions[0],
            Instruction::Ldc(Constant::Integer(1_000_000))
        );
    }

    #[test]
    fn rejects_bad_magic_and_trailing_data() {
        assert!(ClassFile::parse(&[0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 52], ParseMode::Full).is_err());
        assert!(matches!(
            ClassFile::parse(&[], ParseMode::Full),
            Err(crate::Error::Empty)
        ));

        let mut bytes = ClassBuilder::new("demo/Empty").build().unwrap().to_bytes().unwrap();
        bytes.push(0);
        assert!(ClassFile::parse(&bytes, ParseMode::Structure).is_err());
    }
}
