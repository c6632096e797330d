//! Class file reader.

use crate::{
    classfile::{
        annotation::parse_annotations,
        code::{self, MethodInfo},
        constantpool::{ConstantPool, PoolEntry},
        instruction::Constant,
        parser::Parser,
        AccessFlags, Attribute, BootstrapMethod, ClassFile, FieldNode, MethodNode, ParseMode, MAGIC,
    },
    Error, Result,
};

pub(crate) fn read_class(data: &[u8], mode: ParseMode) -> Result<ClassFile> {
    if data.is_empty() {
        return Err(Error::Empty);
    }

    let mut parser = Parser::new(data);
    let magic = parser.read_u32()?;
    if magic != MAGIC {
        return Err(malformed_error!("Invalid magic 0x{:08X}", magic));
    }
    let minor_version = parser.read_u16()?;
    let major_version = parser.read_u16()?;
    let pool = ConstantPool::parse(&mut parser)?;

    let access = AccessFlags::from_bits_retain(parser.read_u16()?);
    let name = pool.get_class_name(parser.read_u16()?)?.to_string();
    let super_index = parser.read_u16()?;
    let super_name = if super_index == 0 {
        None
    } else {
        Some(pool.get_class_name(super_index)?.to_string())
    };

    let interface_count = parser.read_u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(pool.get_class_name(parser.read_u16()?)?.to_string());
    }

    let field_count = parser.read_u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(read_field(&mut parser, &pool)?);
    }

    let method_count = parser.read_u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(read_method(&mut parser, &pool, &name, mode)?);
    }

    let mut annotations = Vec::new();
    let mut bootstrap_methods = Vec::new();
    let mut attributes = Vec::new();
    let attribute_count = parser.read_u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.get_utf8(parser.read_u16()?)?;
        let body = parser.read_length_prefixed()?;
        match attribute_name {
            "RuntimeVisibleAnnotations" => {
                annotations.extend(parse_annotations(body, &pool, true)?);
            }
            "RuntimeInvisibleAnnotations" => {
                annotations.extend(parse_annotations(body, &pool, false)?);
            }
            "BootstrapMethods" => bootstrap_methods = read_bootstrap_methods(body)?,
            other => attributes.push(Attribute {
                name: other.to_string(),
                data: body.to_vec(),
            }),
        }
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after class {}",
            parser.len() - parser.pos(),
            name
        ));
    }

    Ok(ClassFile {
        minor_version,
        major_version,
        pool,
        access,
        name,
        super_name,
        interfaces,
        fields,
        methods,
        annotations,
        bootstrap_methods,
        attributes,
    })
}

fn read_field(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<FieldNode> {
    let access = AccessFlags::from_bits_retain(parser.read_u16()?);
    let name = pool.get_utf8(parser.read_u16()?)?.to_string();
    let descriptor = pool.get_utf8(parser.read_u16()?)?.to_string();

    let mut constant_value = None;
    let mut annotations = Vec::new();
    let mut attributes = Vec::new();
    let attribute_count = parser.read_u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.get_utf8(parser.read_u16()?)?;
        let body = parser.read_length_prefixed()?;
        match attribute_name {
            "ConstantValue" => {
                let index = Parser::new(body).read_u16()?;
                constant_value = Some(match pool.get(index)? {
                    PoolEntry::Integer(value) => Constant::Integer(*value),
                    PoolEntry::Float(value) => Constant::Float(*value),
                    PoolEntry::Long(value) => Constant::Long(*value),
                    PoolEntry::Double(value) => Constant::Double(*value),
                    PoolEntry::String(text) => Constant::String(pool.get_utf8(*text)?.to_string()),
                    other => {
                        return Err(malformed_error!(
                            "ConstantValue of field {} refers to {:?}",
                            name,
                            other
                        ))
                    }
                });
            }
            "RuntimeVisibleAnnotations" => {
                annotations.extend(parse_annotations(body, pool, true)?);
            }
            "RuntimeInvisibleAnnotations" => {
                annotations.extend(parse_annotations(body, pool, false)?);
            }
            other => attributes.push(Attribute {
                name: other.to_string(),
                data: body.to_vec(),
            }),
        }
    }

    Ok(FieldNode {
        access,
        name,
        descriptor,
        constant_value,
        annotations,
        attributes,
    })
}

fn read_method(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    owner: &str,
    mode: ParseMode,
) -> Result<MethodNode> {
    let access = AccessFlags::from_bits_retain(parser.read_u16()?);
    let name = pool.get_utf8(parser.read_u16()?)?.to_string();
    let descriptor = pool.get_utf8(parser.read_u16()?)?.to_string();

    let mut raw_code = None;
    let mut annotations = Vec::new();
    let mut attributes = Vec::new();
    let attribute_count = parser.read_u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.get_utf8(parser.read_u16()?)?;
        let body = parser.read_length_prefixed()?;
        match attribute_name {
            "Code" => raw_code = Some(body.to_vec()),
            "RuntimeVisibleAnnotations" => {
                annotations.extend(parse_annotations(body, pool, true)?);
            }
            "RuntimeInvisibleAnnotations" => {
                annotations.extend(parse_annotations(body, pool, false)?);
            }
            other => attributes.push(Attribute {
                name: other.to_string(),
                data: body.to_vec(),
            }),
        }
    }

    let code = match (&raw_code, mode) {
        (Some(raw), ParseMode::Full) => Some(code::decode(
            raw,
            pool,
            MethodInfo {
                owner,
                name: &name,
                descriptor: &descriptor,
                is_static: access.is_static(),
            },
        )?),
        _ => None,
    };

    Ok(MethodNode {
        access,
        name,
        descriptor,
        code,
        raw_code,
        annotations,
        attributes,
    })
}

fn read_bootstrap_methods(body: &[u8]) -> Result<Vec<BootstrapMethod>> {
    let mut parser = Parser::new(body);
    let count = parser.read_u16()?;
    let mut methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let handle = parser.read_u16()?;
        let argument_count = parser.read_u16()?;
        let mut arguments = Vec::with_capacity(argument_count as usize);
        for _ in 0..argument_count {
            arguments.push(parser.read_u16()?);
        }
        methods.push(BootstrapMethod { handle, arguments });
    }
    Ok(methods)
}
