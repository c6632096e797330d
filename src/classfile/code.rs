//! `Code` attribute decoding and encoding.
//!
//! [`decode`] turns the body of a `Code` attribute into a [`Code`] with symbolic operands and
//! labels, expanding the `StackMapTable` into one [`Frame`] per entry. [`encode`] performs the
//! inverse. Encoding chooses the shortest form of every instruction, writes every frame as a
//! `full_frame` and reports branches whose displacement no longer fits 16 bits.
//!
//! Attributes of the `Code` attribute other than `LineNumberTable`, `LocalVariableTable` and
//! `StackMapTable` are not carried over into re-encoded bodies.

use std::collections::BTreeMap;

use crate::{
    classfile::{
        constantpool::{ConstantPool, PoolEntry},
        descriptor::{FieldType, MethodDescriptor},
        instruction::{
            Code, Constant, Frame, Instruction, Label, LocalVariable, TryCatchBlock,
            VerificationType,
        },
        opcodes::Opcode,
        parser::Parser,
    },
    Error, Result,
};

/// The method a body belongs to, needed for the implicit initial frame and error messages.
#[derive(Debug, Clone, Copy)]
pub struct MethodInfo<'a> {
    /// Internal name of the declaring class
    pub owner: &'a str,
    /// Method name
    pub name: &'a str,
    /// Method descriptor
    pub descriptor: &'a str,
    /// True for static methods
    pub is_static: bool,
}

impl MethodInfo<'_> {
    fn display(&self) -> String {
        format!("{}.{} {}", self.owner.replace('/', "."), self.name, self.descriptor)
    }

    /// Locals of the implicit frame at offset 0.
    fn initial_locals(&self) -> Result<Vec<VerificationType>> {
        let descriptor = MethodDescriptor::parse(self.descriptor)?;
        let mut locals = Vec::with_capacity(descriptor.parameters.len() + 1);
        if !self.is_static {
            if self.name == "<init>" && self.owner != "java/lang/Object" {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::Object(self.owner.to_string()));
            }
        }
        for parameter in &descriptor.parameters {
            locals.push(verification_type_of(parameter));
        }
        Ok(locals)
    }
}

fn verification_type_of(field_type: &FieldType) -> VerificationType {
    match field_type {
        FieldType::Long => VerificationType::Long,
        FieldType::Double => VerificationType::Double,
        FieldType::Float => VerificationType::Float,
        FieldType::Object(name) => VerificationType::Object(name.clone()),
        FieldType::Array(_) => VerificationType::Object(field_type.descriptor()),
        _ => VerificationType::Integer,
    }
}

struct Labels {
    by_offset: BTreeMap<usize, Label>,
    next: u32,
}

impl Labels {
    fn at(&mut self, offset: usize) -> Label {
        let next = &mut self.next;
        *self.by_offset.entry(offset).or_insert_with(|| {
            let label = Label(*next);
            *next += 1;
            label
        })
    }

    fn relative(&mut self, base: usize, delta: i64) -> Result<Label> {
        let target = base as i64 + delta;
        if target < 0 {
            return Err(malformed_error!("Branch at {} targets negative offset", base));
        }
        Ok(self.at(target as usize))
    }
}

/// Decode the body of a `Code` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for invalid bytecode,
/// branches into the middle of an instruction and invalid pool references.
pub fn decode(data: &[u8], pool: &ConstantPool, method: MethodInfo<'_>) -> Result<Code> {
    let mut parser = Parser::new(data);
    let max_stack = parser.read_u16()?;
    let max_locals = parser.read_u16()?;
    let code_length = parser.read_u32()? as usize;
    let bytecode = parser.read_bytes(code_length)?;

    let mut labels = Labels {
        by_offset: BTreeMap::new(),
        next: 0,
    };
    let decoded = decode_instructions(bytecode, pool, &mut labels)?;

    let mut try_catch = Vec::new();
    let handler_count = parser.read_u16()?;
    for _ in 0..handler_count {
        let start = labels.at(parser.read_u16()? as usize);
        let end = labels.at(parser.read_u16()? as usize);
        let handler = labels.at(parser.read_u16()? as usize);
        let catch_index = parser.read_u16()?;
        let catch_type = if catch_index == 0 {
            None
        } else {
            Some(pool.get_class_name(catch_index)?.to_string())
        };
        try_catch.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type,
        });
    }

    let mut lines: BTreeMap<usize, Vec<u16>> = BTreeMap::new();
    let mut frames: BTreeMap<usize, Frame> = BTreeMap::new();
    let mut locals = Vec::new();

    let attribute_count = parser.read_u16()?;
    for _ in 0..attribute_count {
        let name = pool.get_utf8(parser.read_u16()?)?;
        let body = parser.read_length_prefixed()?;
        match name {
            "LineNumberTable" => {
                let mut table = Parser::new(body);
                let count = table.read_u16()?;
                for _ in 0..count {
                    let pc = table.read_u16()? as usize;
                    let line = table.read_u16()?;
                    labels.at(pc);
                    lines.entry(pc).or_default().push(line);
                }
            }
            "LocalVariableTable" => {
                let mut table = Parser::new(body);
                let count = table.read_u16()?;
                for _ in 0..count {
                    let start_pc = table.read_u16()? as usize;
                    let length = table.read_u16()? as usize;
                    let name = pool.get_utf8(table.read_u16()?)?.to_string();
                    let descriptor = pool.get_utf8(table.read_u16()?)?.to_string();
                    let index = table.read_u16()?;
                    locals.push(LocalVariable {
                        name,
                        descriptor,
                        start: labels.at(start_pc),
                        end: labels.at(start_pc + length),
                        index,
                    });
                }
            }
            "StackMapTable" => {
                decode_frames(body, pool, &method, &mut labels, &mut frames)?;
            }
            _ => {}
        }
    }

    let mut instructions = Vec::with_capacity(decoded.len() + labels.by_offset.len());
    let mut pending = labels.by_offset.iter().peekable();
    for (offset, instruction) in decoded {
        while let Some((&label_offset, _)) = pending.peek() {
            if label_offset > offset {
                break;
            }
            let (&label_offset, &label) = pending.next().ok_or_else(|| out_of_bounds_error!())?;
            if label_offset < offset {
                return Err(malformed_error!(
                    "Label at offset {} in {} is inside an instruction",
                    label_offset,
                    method.display()
                ));
            }
            instructions.push(Instruction::Label(label));
        }
        if let Some(entries) = lines.remove(&offset) {
            instructions.extend(entries.into_iter().map(Instruction::LineNumber));
        }
        if let Some(frame) = frames.remove(&offset) {
            instructions.push(Instruction::Frame(frame));
        }
        instructions.push(instruction);
    }
    for (&offset, &label) in pending {
        if offset != code_length {
            return Err(malformed_error!(
                "Label at offset {} in {} is outside the code",
                offset,
                method.display()
            ));
        }
        instructions.push(Instruction::Label(label));
    }

    let next_label = labels.next;
    Ok(Code {
        max_stack,
        max_locals,
        instructions,
        try_catch,
        locals,
        modified: false,
        ..Code::default()
    }
    .with_label_counter(next_label))
}

fn decode_instructions(
    bytecode: &[u8],
    pool: &ConstantPool,
    labels: &mut Labels,
) -> Result<Vec<(usize, Instruction)>> {
    let mut parser = Parser::new(bytecode);
    let mut out = Vec::new();

    while parser.has_more_data() {
        let pc = parser.pos();
        let opcode = Opcode::decode(parser.read_u8()?)?;
        let byte = opcode.byte();
        let instruction = match opcode {
            Opcode::Bipush => Instruction::Push {
                opcode,
                value: i32::from(parser.read_i8()?),
            },
            Opcode::Sipush => Instruction::Push {
                opcode,
                value: i32::from(parser.read_i16()?),
            },
            Opcode::Ldc => Instruction::Ldc(loadable(pool, u16::from(parser.read_u8()?))?),
            Opcode::LdcW | Opcode::Ldc2W => Instruction::Ldc(loadable(pool, parser.read_u16()?)?),
            Opcode::Iload
            | Opcode::Lload
            | Opcode::Fload
            | Opcode::Dload
            | Opcode::Aload
            | Opcode::Istore
            | Opcode::Lstore
            | Opcode::Fstore
            | Opcode::Dstore
            | Opcode::Astore
            | Opcode::Ret => Instruction::Var {
                opcode,
                index: u16::from(parser.read_u8()?),
            },
            _ if (0x1A..=0x2D).contains(&byte) => {
                let base = Opcode::decode(Opcode::Iload.byte() + (byte - 0x1A) / 4)?;
                Instruction::Var {
                    opcode: base,
                    index: u16::from((byte - 0x1A) % 4),
                }
            }
            _ if (0x3B..=0x4E).contains(&byte) => {
                let base = Opcode::decode(Opcode::Istore.byte() + (byte - 0x3B) / 4)?;
                Instruction::Var {
                    opcode: base,
                    index: u16::from((byte - 0x3B) % 4),
                }
            }
            Opcode::Iinc => Instruction::Iinc {
                index: u16::from(parser.read_u8()?),
                delta: i16::from(parser.read_i8()?),
            },
            Opcode::Ifeq
            | Opcode::Ifne
            | Opcode::Iflt
            | Opcode::Ifge
            | Opcode::Ifgt
            | Opcode::Ifle
            | Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple
            | Opcode::IfAcmpeq
            | Opcode::IfAcmpne
            | Opcode::Goto
            | Opcode::Jsr
            | Opcode::Ifnull
            | Opcode::Ifnonnull => Instruction::Jump {
                opcode,
                target: labels.relative(pc, i64::from(parser.read_i16()?))?,
            },
            Opcode::GotoW | Opcode::JsrW => Instruction::Jump {
                opcode,
                target: labels.relative(pc, i64::from(parser.read_i32()?))?,
            },
            Opcode::Tableswitch => {
                parser.advance_by((4 - (pc + 1) % 4) % 4)?;
                let default = labels.relative(pc, i64::from(parser.read_i32()?))?;
                let low = parser.read_i32()?;
                let high = parser.read_i32()?;
                if high < low {
                    return Err(malformed_error!("tableswitch at {} has high < low", pc));
                }
                let count = (i64::from(high) - i64::from(low) + 1) as usize;
                if count > bytecode.len() / 4 {
                    return Err(out_of_bounds_error!());
                }
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(labels.relative(pc, i64::from(parser.read_i32()?))?);
                }
                Instruction::TableSwitch {
                    default,
                    low,
                    high,
                    targets,
                }
            }
            Opcode::Lookupswitch => {
                parser.advance_by((4 - (pc + 1) % 4) % 4)?;
                let default = labels.relative(pc, i64::from(parser.read_i32()?))?;
                let count = parser.read_i32()?;
                if count < 0 || count as usize > bytecode.len() / 8 {
                    return Err(malformed_error!("lookupswitch at {} has {} pairs", pc, count));
                }
                let mut pairs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let key = parser.read_i32()?;
                    pairs.push((key, labels.relative(pc, i64::from(parser.read_i32()?))?));
                }
                Instruction::LookupSwitch { default, pairs }
            }
            Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => {
                let (member, _) = pool.get_member(parser.read_u16()?)?;
                Instruction::Field { opcode, member }
            }
            Opcode::Invokevirtual | Opcode::Invokespecial | Opcode::Invokestatic => {
                let (member, interface) = pool.get_member(parser.read_u16()?)?;
                Instruction::Invoke {
                    opcode,
                    member,
                    interface,
                }
            }
            Opcode::Invokeinterface => {
                let (member, _) = pool.get_member(parser.read_u16()?)?;
                parser.advance_by(2)?;
                Instruction::Invoke {
                    opcode,
                    member,
                    interface: true,
                }
            }
            Opcode::Invokedynamic => {
                let index = parser.read_u16()?;
                parser.advance_by(2)?;
                match pool.get(index)? {
                    PoolEntry::InvokeDynamic {
                        bootstrap,
                        name_and_type,
                    } => {
                        let (name, descriptor) = pool.get_name_and_type(*name_and_type)?;
                        Instruction::InvokeDynamic {
                            bootstrap: *bootstrap,
                            name: name.to_string(),
                            descriptor: descriptor.to_string(),
                        }
                    }
                    _ => {
                        return Err(malformed_error!(
                            "invokedynamic at {} refers to a non call site entry #{}",
                            pc,
                            index
                        ))
                    }
                }
            }
            Opcode::New | Opcode::Anewarray | Opcode::Checkcast | Opcode::Instanceof => {
                Instruction::Type {
                    opcode,
                    class: pool.get_class_name(parser.read_u16()?)?.to_string(),
                }
            }
            Opcode::Newarray => Instruction::NewArray(parser.read_u8()?),
            Opcode::Multianewarray => Instruction::MultiANewArray {
                class: pool.get_class_name(parser.read_u16()?)?.to_string(),
                dimensions: parser.read_u8()?,
            },
            Opcode::Wide => {
                let inner = Opcode::decode(parser.read_u8()?)?;
                match inner {
                    Opcode::Iinc => Instruction::Iinc {
                        index: parser.read_u16()?,
                        delta: parser.read_i16()?,
                    },
                    Opcode::Iload
                    | Opcode::Lload
                    | Opcode::Fload
                    | Opcode::Dload
                    | Opcode::Aload
                    | Opcode::Istore
                    | Opcode::Lstore
                    | Opcode::Fstore
                    | Opcode::Dstore
                    | Opcode::Astore
                    | Opcode::Ret => Instruction::Var {
                        opcode: inner,
                        index: parser.read_u16()?,
                    },
                    other => {
                        return Err(malformed_error!("wide cannot modify {} at {}", other, pc))
                    }
                }
            }
            other => Instruction::Simple(other),
        };
        out.push((pc, instruction));
    }

    Ok(out)
}

fn loadable(pool: &ConstantPool, index: u16) -> Result<Constant> {
    Ok(match pool.get(index)? {
        PoolEntry::Integer(value) => Constant::Integer(*value),
        PoolEntry::Float(value) => Constant::Float(*value),
        PoolEntry::Long(value) => Constant::Long(*value),
        PoolEntry::Double(value) => Constant::Double(*value),
        PoolEntry::String(text) => Constant::String(pool.get_utf8(*text)?.to_string()),
        PoolEntry::Class(name) => Constant::Class(pool.get_utf8(*name)?.to_string()),
        PoolEntry::MethodHandle { .. } | PoolEntry::MethodType(_) | PoolEntry::Dynamic { .. } => {
            Constant::Pool(index)
        }
        other => {
            return Err(malformed_error!(
                "Constant pool entry #{} ({:?}) is not loadable",
                index,
                other
            ))
        }
    })
}

fn decode_frames(
    body: &[u8],
    pool: &ConstantPool,
    method: &MethodInfo<'_>,
    labels: &mut Labels,
    frames: &mut BTreeMap<usize, Frame>,
) -> Result<()> {
    let mut parser = Parser::new(body);
    let count = parser.read_u16()?;
    let mut locals = method.initial_locals()?;
    let mut offset: Option<usize> = None;

    for _ in 0..count {
        let frame_type = parser.read_u8()?;
        let (delta, stack) = match frame_type {
            0..=63 => (u16::from(frame_type), Vec::new()),
            64..=127 => (
                u16::from(frame_type - 64),
                vec![read_verification_type(&mut parser, pool, labels)?],
            ),
            247 => {
                let delta = parser.read_u16()?;
                (delta, vec![read_verification_type(&mut parser, pool, labels)?])
            }
            248..=250 => {
                let delta = parser.read_u16()?;
                let chop = usize::from(251 - frame_type);
                if chop > locals.len() {
                    return Err(malformed_error!(
                        "chop_frame removes {} of {} locals in {}",
                        chop,
                        locals.len(),
                        method.display()
                    ));
                }
                locals.truncate(locals.len() - chop);
                (delta, Vec::new())
            }
            251 => (parser.read_u16()?, Vec::new()),
            252..=254 => {
                let delta = parser.read_u16()?;
                for _ in 0..(frame_type - 251) {
                    locals.push(read_verification_type(&mut parser, pool, labels)?);
                }
                (delta, Vec::new())
            }
            255 => {
                let delta = parser.read_u16()?;
                let local_count = parser.read_u16()?;
                locals.clear();
                for _ in 0..local_count {
                    locals.push(read_verification_type(&mut parser, pool, labels)?);
                }
                let stack_count = parser.read_u16()?;
                let mut stack = Vec::with_capacity(stack_count as usize);
                for _ in 0..stack_count {
                    stack.push(read_verification_type(&mut parser, pool, labels)?);
                }
                (delta, stack)
            }
            reserved => {
                return Err(malformed_error!(
                    "Reserved stack map frame type {} in {}",
                    reserved,
                    method.display()
                ))
            }
        };

        let position = match offset {
            None => usize::from(delta),
            Some(previous) => previous + usize::from(delta) + 1,
        };
        offset = Some(position);
        labels.at(position);
        frames.insert(
            position,
            Frame {
                locals: locals.clone(),
                stack,
            },
        );
    }

    Ok(())
}

fn read_verification_type(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    labels: &mut Labels,
) -> Result<VerificationType> {
    Ok(match parser.read_u8()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object(pool.get_class_name(parser.read_u16()?)?.to_string()),
        8 => VerificationType::Uninitialized(labels.at(parser.read_u16()? as usize)),
        tag => return Err(malformed_error!("Invalid verification type tag {}", tag)),
    })
}

/// Read `(slot, name)` of the `LocalVariableTable` entries that start at offset 0, without
/// decoding the instructions.
///
/// These are the parameter names of a method compiled with debug information.
///
/// # Errors
/// Returns an error if the attribute structure is damaged.
pub fn parameter_locals(data: &[u8], pool: &ConstantPool) -> Result<Vec<(u16, String)>> {
    let mut parser = Parser::new(data);
    parser.advance_by(4)?;
    let code_length = parser.read_u32()? as usize;
    parser.advance_by(code_length)?;
    let handlers = parser.read_u16()? as usize;
    parser.advance_by(handlers * 8)?;

    let mut names = Vec::new();
    let attribute_count = parser.read_u16()?;
    for _ in 0..attribute_count {
        let name = pool.get_utf8(parser.read_u16()?)?;
        let body = parser.read_length_prefixed()?;
        if name != "LocalVariableTable" {
            continue;
        }
        let mut table = Parser::new(body);
        let count = table.read_u16()?;
        for _ in 0..count {
            let start_pc = table.read_u16()?;
            table.advance_by(2)?;
            let name = pool.get_utf8(table.read_u16()?)?;
            table.advance_by(2)?;
            let index = table.read_u16()?;
            if start_pc == 0 {
                names.push((index, name.to_string()));
            }
        }
    }
    names.sort();
    names.dedup_by_key(|(index, _)| *index);
    Ok(names)
}

/// Encode a [`Code`] into the body of a `Code` attribute.
///
/// Pool entries for operands and attribute names are appended to `pool` as needed.
///
/// # Errors
/// * [`crate::Error::BranchOutOfRange`] if a 16-bit branch cannot reach its target
/// * [`crate::Error::CodeTooLarge`] if the bytecode exceeds 65535 bytes
/// * [`crate::Error::Malformed`] for labels that were never placed
/// * pool overflow errors from the constant pool
pub fn encode(code: &Code, pool: &mut ConstantPool, method: MethodInfo<'_>) -> Result<Vec<u8>> {
    // Pool indices first: `ldc` vs `ldc_w` depends on them.
    let mut indices = Vec::with_capacity(code.instructions.len());
    for instruction in &code.instructions {
        indices.push(pool_index(instruction, pool)?);
    }

    // Instruction sizes only depend on the offset of the instruction itself (switch padding),
    // so a single forward pass places every label.
    let mut offsets = Vec::with_capacity(code.instructions.len());
    let mut label_offsets: BTreeMap<Label, usize> = BTreeMap::new();
    let mut pc = 0usize;
    for (instruction, index) in code.instructions.iter().zip(&indices) {
        offsets.push(pc);
        if let Instruction::Label(label) = instruction {
            label_offsets.insert(*label, pc);
        }
        pc += instruction_size(instruction, *index, pc);
    }
    let code_length = pc;
    if code_length == 0 || code_length > 65535 {
        return Err(Error::CodeTooLarge(method.display()));
    }

    let resolve = |label: &Label| -> Result<usize> {
        label_offsets
            .get(label)
            .copied()
            .ok_or_else(|| malformed_error!("Label {} is not placed in {}", label, method.display()))
    };

    let mut bytes = Vec::with_capacity(code_length);
    let mut lines: Vec<(u16, u16)> = Vec::new();
    let mut frames: Vec<(usize, &Frame)> = Vec::new();

    for ((instruction, index), &pc) in code.instructions.iter().zip(&indices).zip(&offsets) {
        let branch = |target: &Label| -> Result<i64> { Ok(resolve(target)? as i64 - pc as i64) };
        match instruction {
            Instruction::Label(_) => {}
            Instruction::LineNumber(line) => lines.push((pc as u16, *line)),
            Instruction::Frame(frame) => {
                if frames.last().is_some_and(|(last, _)| *last == pc) {
                    frames.pop();
                }
                frames.push((pc, frame));
            }
            Instruction::Simple(opcode) => bytes.push(opcode.byte()),
            Instruction::Push { opcode, value } => {
                bytes.push(opcode.byte());
                if *opcode == Opcode::Bipush {
                    bytes.push(*value as i8 as u8);
                } else {
                    bytes.extend_from_slice(&(*value as i16).to_be_bytes());
                }
            }
            Instruction::NewArray(kind) => bytes.extend_from_slice(&[Opcode::Newarray.byte(), *kind]),
            Instruction::Var { opcode, index } => encode_var(&mut bytes, *opcode, *index),
            Instruction::Iinc { index, delta } => {
                if *index <= 255 && i8::try_from(*delta).is_ok() {
                    bytes.extend_from_slice(&[Opcode::Iinc.byte(), *index as u8, *delta as i8 as u8]);
                } else {
                    bytes.extend_from_slice(&[Opcode::Wide.byte(), Opcode::Iinc.byte()]);
                    bytes.extend_from_slice(&index.to_be_bytes());
                    bytes.extend_from_slice(&delta.to_be_bytes());
                }
            }
            Instruction::Type { opcode, .. } | Instruction::Field { opcode, .. } => {
                bytes.push(opcode.byte());
                bytes.extend_from_slice(&index.unwrap_or_default().to_be_bytes());
            }
            Instruction::Invoke { opcode, member, .. } => {
                bytes.push(opcode.byte());
                bytes.extend_from_slice(&index.unwrap_or_default().to_be_bytes());
                if *opcode == Opcode::Invokeinterface {
                    let descriptor = MethodDescriptor::parse(&member.descriptor)?;
                    bytes.push((descriptor.parameter_slots() + 1) as u8);
                    bytes.push(0);
                }
            }
            Instruction::InvokeDynamic { .. } => {
                bytes.push(Opcode::Invokedynamic.byte());
                bytes.extend_from_slice(&index.unwrap_or_default().to_be_bytes());
                bytes.extend_from_slice(&[0, 0]);
            }
            Instruction::Jump { opcode, target } => {
                let displacement = branch(target)?;
                bytes.push(opcode.byte());
                if matches!(opcode, Opcode::GotoW | Opcode::JsrW) {
                    bytes.extend_from_slice(&(displacement as i32).to_be_bytes());
                } else {
                    let short = i16::try_from(displacement).map_err(|_| Error::BranchOutOfRange {
                        method: method.display(),
                        offset: pc,
                    })?;
                    bytes.extend_from_slice(&short.to_be_bytes());
                }
            }
            Instruction::Ldc(constant) => {
                let index = index.unwrap_or_default();
                if is_wide_constant(constant, pool) {
                    bytes.push(Opcode::Ldc2W.byte());
                    bytes.extend_from_slice(&index.to_be_bytes());
                } else if index <= 255 {
                    bytes.extend_from_slice(&[Opcode::Ldc.byte(), index as u8]);
                } else {
                    bytes.push(Opcode::LdcW.byte());
                    bytes.extend_from_slice(&index.to_be_bytes());
                }
            }
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            } => {
                bytes.push(Opcode::Tableswitch.byte());
                bytes.resize(bytes.len() + (4 - (pc + 1) % 4) % 4, 0);
                bytes.extend_from_slice(&(branch(default)? as i32).to_be_bytes());
                bytes.extend_from_slice(&low.to_be_bytes());
                bytes.extend_from_slice(&high.to_be_bytes());
                for target in targets {
                    bytes.extend_from_slice(&(branch(target)? as i32).to_be_bytes());
                }
            }
            Instruction::LookupSwitch { default, pairs } => {
                bytes.push(Opcode::Lookupswitch.byte());
                bytes.resize(bytes.len() + (4 - (pc + 1) % 4) % 4, 0);
                bytes.extend_from_slice(&(branch(default)? as i32).to_be_bytes());
                bytes.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                for (key, target) in pairs {
                    bytes.extend_from_slice(&key.to_be_bytes());
                    bytes.extend_from_slice(&(branch(target)? as i32).to_be_bytes());
                }
            }
            Instruction::MultiANewArray { dimensions, .. } => {
                bytes.push(Opcode::Multianewarray.byte());
                bytes.extend_from_slice(&index.unwrap_or_default().to_be_bytes());
                bytes.push(*dimensions);
            }
        }
    }

    let mut out = Vec::with_capacity(bytes.len() + 64);
    out.extend_from_slice(&code.max_stack.to_be_bytes());
    out.extend_from_slice(&code.max_locals.to_be_bytes());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytes);

    out.extend_from_slice(&(code.try_catch.len() as u16).to_be_bytes());
    for block in &code.try_catch {
        out.extend_from_slice(&(resolve(&block.start)? as u16).to_be_bytes());
        out.extend_from_slice(&(resolve(&block.end)? as u16).to_be_bytes());
        out.extend_from_slice(&(resolve(&block.handler)? as u16).to_be_bytes());
        let catch_index = match &block.catch_type {
            Some(class) => pool.add_class(class)?,
            None => 0,
        };
        out.extend_from_slice(&catch_index.to_be_bytes());
    }

    let mut attributes: Vec<(u16, Vec<u8>)> = Vec::new();
    if !lines.is_empty() {
        let mut body = Vec::with_capacity(2 + lines.len() * 4);
        body.extend_from_slice(&(lines.len() as u16).to_be_bytes());
        for (pc, line) in &lines {
            body.extend_from_slice(&pc.to_be_bytes());
            body.extend_from_slice(&line.to_be_bytes());
        }
        attributes.push((pool.add_utf8("LineNumberTable")?, body));
    }
    if !code.locals.is_empty() {
        let mut body = Vec::with_capacity(2 + code.locals.len() * 10);
        body.extend_from_slice(&(code.locals.len() as u16).to_be_bytes());
        for local in &code.locals {
            let start = resolve(&local.start)?;
            let end = resolve(&local.end)?.max(start);
            body.extend_from_slice(&(start as u16).to_be_bytes());
            body.extend_from_slice(&((end - start) as u16).to_be_bytes());
            body.extend_from_slice(&pool.add_utf8(&local.name)?.to_be_bytes());
            body.extend_from_slice(&pool.add_utf8(&local.descriptor)?.to_be_bytes());
            body.extend_from_slice(&local.index.to_be_bytes());
        }
        attributes.push((pool.add_utf8("LocalVariableTable")?, body));
    }
    if !frames.is_empty() {
        let mut body = Vec::new();
        body.extend_from_slice(&(frames.len() as u16).to_be_bytes());
        let mut previous: Option<usize> = None;
        for (pc, frame) in &frames {
            let delta = match previous {
                None => *pc,
                Some(last) => pc - last - 1,
            };
            previous = Some(*pc);
            body.push(255);
            body.extend_from_slice(&(delta as u16).to_be_bytes());
            body.extend_from_slice(&(frame.locals.len() as u16).to_be_bytes());
            for vt in &frame.locals {
                write_verification_type(&mut body, vt, pool, &resolve)?;
            }
            body.extend_from_slice(&(frame.stack.len() as u16).to_be_bytes());
            for vt in &frame.stack {
                write_verification_type(&mut body, vt, pool, &resolve)?;
            }
        }
        attributes.push((pool.add_utf8("StackMapTable")?, body));
    }

    out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    for (name, body) in attributes {
        out.extend_from_slice(&name.to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
    }

    Ok(out)
}

fn pool_index(instruction: &Instruction, pool: &mut ConstantPool) -> Result<Option<u16>> {
    Ok(Some(match instruction {
        Instruction::Type { class, .. } | Instruction::MultiANewArray { class, .. } => {
            pool.add_class(class)?
        }
        Instruction::Field { member, .. } => pool.add_field_ref(member)?,
        Instruction::Invoke {
            member, interface, ..
        } => pool.add_method_ref(member, *interface)?,
        Instruction::InvokeDynamic {
            bootstrap,
            name,
            descriptor,
        } => pool.add_invoke_dynamic(*bootstrap, name, descriptor)?,
        Instruction::Ldc(constant) => match constant {
            Constant::Integer(value) => pool.add_integer(*value)?,
            Constant::Float(value) => pool.add_float(*value)?,
            Constant::Long(value) => pool.add_long(*value)?,
            Constant::Double(value) => pool.add_double(*value)?,
            Constant::String(text) => pool.add_string(text)?,
            Constant::Class(name) => pool.add_class(name)?,
            Constant::Pool(index) => *index,
        },
        _ => return Ok(None),
    }))
}

fn is_wide_constant(constant: &Constant, pool: &ConstantPool) -> bool {
    match constant {
        Constant::Long(_) | Constant::Double(_) => true,
        Constant::Pool(index) => match pool.get(*index) {
            Ok(PoolEntry::Dynamic { name_and_type, .. }) => pool
                .get_name_and_type(*name_and_type)
                .is_ok_and(|(_, descriptor)| descriptor == "J" || descriptor == "D"),
            _ => false,
        },
        _ => false,
    }
}

fn instruction_size(instruction: &Instruction, index: Option<u16>, pc: usize) -> usize {
    match instruction {
        Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame(_) => 0,
        Instruction::Simple(_) => 1,
        Instruction::Push { opcode, .. } => {
            if *opcode == Opcode::Bipush {
                2
            } else {
                3
            }
        }
        Instruction::NewArray(_) => 2,
        Instruction::Var { opcode, index } => match (opcode, index) {
            (Opcode::Ret, 0..=255) => 2,
            (_, 0..=3) => 1,
            (_, 4..=255) => 2,
            _ => 4,
        },
        Instruction::Iinc { index, delta } => {
            if *index <= 255 && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Instruction::Type { .. } | Instruction::Field { .. } => 3,
        Instruction::Invoke { opcode, .. } => {
            if *opcode == Opcode::Invokeinterface {
                5
            } else {
                3
            }
        }
        Instruction::InvokeDynamic { .. } => 5,
        Instruction::Jump { opcode, .. } => {
            if matches!(opcode, Opcode::GotoW | Opcode::JsrW) {
                5
            } else {
                3
            }
        }
        Instruction::Ldc(constant) => match constant {
            Constant::Long(_) | Constant::Double(_) => 3,
            _ if index.unwrap_or_default() <= 255 => 2,
            _ => 3,
        },
        Instruction::TableSwitch { targets, .. } => {
            1 + (4 - (pc + 1) % 4) % 4 + 12 + 4 * targets.len()
        }
        Instruction::LookupSwitch { pairs, .. } => 1 + (4 - (pc + 1) % 4) % 4 + 8 + 8 * pairs.len(),
        Instruction::MultiANewArray { .. } => 4,
    }
}

fn encode_var(bytes: &mut Vec<u8>, opcode: Opcode, index: u16) {
    let short_base = match opcode {
        Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
            Some(0x1A + (opcode.byte() - Opcode::Iload.byte()) * 4)
        }
        Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore | Opcode::Astore => {
            Some(0x3B + (opcode.byte() - Opcode::Istore.byte()) * 4)
        }
        _ => None,
    };
    match (short_base, index) {
        (Some(base), 0..=3) => bytes.push(base + index as u8),
        (_, 0..=255) => bytes.extend_from_slice(&[opcode.byte(), index as u8]),
        _ => {
            bytes.extend_from_slice(&[Opcode::Wide.byte(), opcode.byte()]);
            bytes.extend_from_slice(&index.to_be_bytes());
        }
    }
}

fn write_verification_type(
    out: &mut Vec<u8>,
    vt: &VerificationType,
    pool: &mut ConstantPool,
    resolve: &dyn Fn(&Label) -> Result<usize>,
) -> Result<()> {
    match vt {
        VerificationType::Top => out.push(0),
        VerificationType::Integer => out.push(1),
        VerificationType::Float => out.push(2),
        VerificationType::Double => out.push(3),
        VerificationType::Long => out.push(4),
        VerificationType::Null => out.push(5),
        VerificationType::UninitializedThis => out.push(6),
        VerificationType::Object(class) => {
            out.push(7);
            out.extend_from_slice(&pool.add_class(class)?.to_be_bytes());
        }
        VerificationType::Uninitialized(label) => {
            out.push(8);
            out.extend_from_slice(&(resolve(label)? as u16).to_be_bytes());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::member::MemberReference;

    const METHOD: MethodInfo<'static> = MethodInfo {
        owner: "demo/Sample",
        name: "run",
        descriptor: "(I)I",
        is_static: true,
    };

    fn round_trip(code: &Code) -> Code {
        let mut pool = ConstantPool::new();
        let bytes = encode(code, &mut pool, METHOD).unwrap();
        decode(&bytes, &pool, METHOD).unwrap()
    }

    #[test]
    fn short_forms_are_normalized() {
        let mut code = Code::new(2, 300);
        code.instructions = vec![
            Instruction::Var {
                opcode: Opcode::Iload,
                index: 0,
            },
            Instruction::Var {
                opcode: Opcode::Istore,
                index: 299,
            },
            Instruction::Iinc {
                index: 299,
                delta: 1000,
            },
            Instruction::Var {
                opcode: Opcode::Iload,
                index: 299,
            },
            Instruction::Simple(Opcode::Ireturn),
        ];
        let mut pool = ConstantPool::new();
        let bytes = encode(&code, &mut pool, METHOD).unwrap();
        // iload_0, wide istore, wide iinc, wide iload, ireturn
        assert_eq!(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 1 + 4 + 6 + 4 + 1);
        assert_eq!(bytes[8], 0x1A);

        let decoded = decode(&bytes, &pool, METHOD).unwrap();
        assert_eq!(decoded.instructions, code.instructions);
        assert!(!decoded.modified);
    }

    #[test]
    fn branches_and_frames() {
        let mut code = Code::new(2, 1);
        let positive = code.new_label();
        code.instructions = vec![
            Instruction::Var {
                opcode: Opcode::Iload,
                index: 0,
            },
            Instruction::Jump {
                opcode: Opcode::Ifgt,
                target: positive,
            },
            Instruction::Simple(Opcode::Iconst0),
            Instruction::Simple(Opcode::Ireturn),
            Instruction::Label(positive),
            Instruction::LineNumber(12),
            Instruction::Frame(Frame {
                locals: vec![VerificationType::Integer],
                stack: Vec::new(),
            }),
            Instruction::Ldc(Constant::String("big".into())),
            Instruction::Invoke {
                opcode: Opcode::Invokevirtual,
                member: MemberReference::new("java/lang/String", "length", "()I"),
                interface: false,
            },
            Instruction::Simple(Opcode::Ireturn),
        ];

        let decoded = round_trip(&code);
        let frame = decoded
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::Frame(frame) => Some(frame.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(frame.locals, vec![VerificationType::Integer]);
        assert!(decoded.instructions.contains(&Instruction::LineNumber(12)));
        let jump_target = decoded.instructions.iter().find_map(|i| match i {
            Instruction::Jump { target, .. } => Some(*target),
            _ => None,
        });
        let label_position = decoded
            .instructions
            .iter()
            .position(|i| Some(i) == jump_target.map(Instruction::Label).as_ref())
            .unwrap();
        assert_eq!(
            decoded.instructions[label_position + 3],
            Instruction::Ldc(Constant::String("big".into()))
        );
    }

    #[test]
    fn switch_padding() {
        let mut code = Code::new(1, 1);
        let a = code.new_label();
        let b = code.new_label();
        code.instructions = vec![
            Instruction::Var {
                opcode: Opcode::Iload,
                index: 0,
            },
            Instruction::TableSwitch {
                default: b,
                low: 1,
                high: 2,
                targets: vec![a, b],
            },
            Instruction::Label(a),
            Instruction::Simple(Opcode::Iconst1),
            Instruction::Simple(Opcode::Ireturn),
            Instruction::Label(b),
            Instruction::Simple(Opcode::Iconst0),
            Instruction::Simple(Opcode::Ireturn),
        ];
        let decoded = round_trip(&code);
        let switch = decoded
            .instructions
            .iter()
            .find(|i| matches!(i, Instruction::TableSwitch { .. }))
            .unwrap();
        assert!(matches!(switch, Instruction::TableSwitch { low: 1, high: 2, targets, .. } if targets.len() == 2));
    }

    #[test]
    fn branch_out_of_range() {
        let mut code = Code::new(1, 1);
        let far = code.new_label();
        code.instructions.push(Instruction::Jump {
            opcode: Opcode::Goto,
            target: far,
        });
        for _ in 0..33_000 {
            code.instructions.push(Instruction::Simple(Opcode::Nop));
        }
        code.instructions.push(Instruction::Label(far));
        code.instructions.push(Instruction::Simple(Opcode::Return));

        let mut pool = ConstantPool::new();
        let err = encode(&code, &mut pool, METHOD).unwrap_err();
        assert!(matches!(err, Error::BranchOutOfRange { offset: 0, .. }));
    }

    #[test]
    fn unplaced_label_is_an_error() {
        let mut code = Code::new(1, 1);
        let nowhere = code.new_label();
        code.instructions = vec![
            Instruction::Jump {
                opcode: Opcode::Goto,
                target: nowhere,
            },
            Instruction::Simple(Opcode::Return),
        ];
        let mut pool = ConstantPool::new();
        assert!(encode(&code, &mut pool, METHOD).is_err());
    }
}
