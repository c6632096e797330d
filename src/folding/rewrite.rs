//! Applying fold decisions to class files.
//!
//! - [`apply`] splices replacements into a method body and grows `max_stack` where needed
//! - [`prune_initializer`] moves leading literal assignments of a static initializer into
//!   `ConstantValue` attributes and drops an initializer left empty
//! - [`strip_markers`] removes the tool's annotations

use std::collections::HashSet;

use crate::{
    classfile::{
        Annotation, ClassFile, Code, Constant, FieldType, Instruction, Label, MemberReference, Opcode,
    },
    config::MARKER_PREFIX,
    folding::{analysis::Replacement, EventKind, EventLog},
};

/// Splice `replacements` into `code`. Spans must not overlap.
///
/// Pseudo instructions inside a replaced span are kept in front of the new code. Returns the
/// number of spans replaced.
pub(crate) fn apply(code: &mut Code, mut replacements: Vec<Replacement>) -> usize {
    replacements.sort_by(|a, b| b.start.cmp(&a.start));
    let count = replacements.len();
    for replacement in replacements {
        let peak = peak_depth(&replacement.code);
        let mut spliced: Vec<Instruction> = code.instructions[replacement.start..=replacement.end]
            .iter()
            .filter(|i| i.is_pseudo())
            .cloned()
            .collect();
        spliced.extend(replacement.code);
        code.instructions
            .splice(replacement.start..=replacement.end, spliced);

        if peak > replacement.slots {
            let required = code.max_stack.saturating_add(peak - replacement.slots);
            code.max_stack = code.max_stack.max(required);
        }
    }
    if count > 0 {
        code.modified = true;
    }
    count
}

/// Maximum stack depth reached while `code` runs on an empty stack.
fn peak_depth(code: &[Instruction]) -> u16 {
    let mut depth: i32 = 0;
    let mut peak: i32 = 0;
    for instruction in code {
        let (popped, pushed) = instruction.stack_effect().unwrap_or((0, 0));
        depth -= i32::from(popped);
        depth += i32::from(pushed);
        peak = peak.max(depth);
    }
    u16::try_from(peak).unwrap_or(u16::MAX)
}

/// Inline the leading `<literal>; putstatic` pairs of `<clinit>` into `ConstantValue`
/// attributes, then remove the initializer if nothing but `return` is left.
///
/// Only static final fields of the class with a primitive or `String` type and no
/// `ConstantValue` are inlined, each only if the initializer assigns it once. Returns true if
/// the class changed.
pub(crate) fn prune_initializer(class: &mut ClassFile, log: &EventLog, pass: usize) -> bool {
    let Some(position) = class
        .methods
        .iter()
        .position(|m| m.name == "<clinit>" && m.descriptor == "()V")
    else {
        return false;
    };
    let clinit = class.method_reference(&class.methods[position]);
    let Some(code) = class.methods[position].code.as_ref() else {
        return false;
    };

    let referenced = code.referenced_labels();
    let mut inlined: Vec<(usize, usize, MemberReference, Constant)> = Vec::new();
    let mut cursor = 0usize;
    loop {
        let Some(literal_at) = next_real(code, cursor, &referenced) else {
            break;
        };
        let Some(store_at) = next_real(code, literal_at + 1, &referenced) else {
            break;
        };
        let Some(constant) = code.instructions[literal_at].as_literal() else {
            break;
        };
        let Instruction::Field {
            opcode: Opcode::Putstatic,
            member,
        } = &code.instructions[store_at]
        else {
            break;
        };
        if !inlinable(class, code, member, &constant) {
            break;
        }
        inlined.push((literal_at, store_at, member.clone(), constant));
        cursor = store_at + 1;
    }

    let mut changed = false;
    if !inlined.is_empty() {
        for (_, _, member, constant) in &inlined {
            if let Some(field) = class
                .fields
                .iter_mut()
                .find(|f| f.name == member.name && f.descriptor == member.descriptor)
            {
                field.constant_value = Some(constant.clone());
                log.record(EventKind::ConstantValueInlined)
                    .method(clinit.clone())
                    .member(member.clone())
                    .pass(pass)
                    .message(format!("{member} = {constant}"));
            }
        }
        if let Some(code) = class.methods[position].code.as_mut() {
            for (literal_at, store_at, _, _) in inlined.iter().rev() {
                code.instructions.remove(*store_at);
                code.instructions.remove(*literal_at);
            }
            code.modified = true;
        }
        changed = true;
    }

    let empty = class.methods[position].code.as_ref().is_some_and(|code| {
        code.try_catch.is_empty()
            && code
                .real_instructions()
                .map(Instruction::opcode)
                .eq([Some(Opcode::Return)])
    });
    if empty {
        class.methods.remove(position);
        log.record(EventKind::InitializerRemoved)
            .method(clinit)
            .pass(pass)
            .message(format!("static initializer of {} removed", class.name.replace('/', ".")));
        changed = true;
    }
    changed
}

/// Index of the next real instruction at or after `from`, `None` at the end of the body or
/// when a referenced label comes first.
fn next_real(code: &Code, from: usize, referenced: &HashSet<Label>) -> Option<usize> {
    for (index, instruction) in code.instructions.iter().enumerate().skip(from) {
        match instruction {
            Instruction::Label(label) if referenced.contains(label) => return None,
            i if i.is_pseudo() => continue,
            _ => return Some(index),
        }
    }
    None
}

fn inlinable(class: &ClassFile, code: &Code, member: &MemberReference, constant: &Constant) -> bool {
    if member.owner != class.name {
        return false;
    }
    let Some(field) = class.find_field(&member.name, &member.descriptor) else {
        return false;
    };
    if !field.is_static_final() || field.constant_value.is_some() {
        return false;
    }
    let assignments = code
        .real_instructions()
        .filter(|i| {
            matches!(i, Instruction::Field { opcode: Opcode::Putstatic, member: m } if m == member)
        })
        .count();
    if assignments != 1 {
        return false;
    }
    let Ok(ty) = FieldType::parse(&field.descriptor) else {
        return false;
    };
    match (ty, constant) {
        (FieldType::Int, Constant::Integer(_)) => true,
        (FieldType::Boolean, Constant::Integer(v)) => (0..=1).contains(v),
        (FieldType::Byte, Constant::Integer(v)) => i8::try_from(*v).is_ok(),
        (FieldType::Short, Constant::Integer(v)) => i16::try_from(*v).is_ok(),
        (FieldType::Char, Constant::Integer(v)) => u16::try_from(*v).is_ok(),
        (FieldType::Long, Constant::Long(_))
        | (FieldType::Float, Constant::Float(_))
        | (FieldType::Double, Constant::Double(_)) => true,
        (FieldType::Object(name), Constant::String(_)) => name == "java/lang/String",
        _ => false,
    }
}

/// Remove every tool marker annotation from the class, its fields and its methods. Returns
/// the number removed.
pub(crate) fn strip_markers(class: &mut ClassFile) -> usize {
    let is_marker = |descriptor: &str| descriptor.starts_with(MARKER_PREFIX);
    let mut removed = 0;
    let mut strip = |annotations: &mut Vec<Annotation>| {
        let before = annotations.len();
        annotations.retain(|a| !is_marker(&a.descriptor));
        removed += before - annotations.len();
    };
    strip(&mut class.annotations);
    for field in &mut class.fields {
        strip(&mut field.annotations);
    }
    for method in &mut class.methods {
        strip(&mut method.annotations);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{AccessFlags, ClassBuilder, MethodBuilder, ParseMode};

    fn holder(initializer: impl FnOnce(MethodBuilder) -> MethodBuilder) -> ClassFile {
        let bytes = ClassBuilder::new("demo/Holder")
            .field(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL, "X", "I")
            .field(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL, "NAME", "Ljava/lang/String;")
            .field(AccessFlags::PUBLIC | AccessFlags::STATIC, "counter", "I")
            .method(AccessFlags::STATIC, "<clinit>", "()V", initializer)
            .build()
            .unwrap()
            .to_bytes()
            .unwrap();
        ClassFile::parse(&bytes, ParseMode::Full).unwrap()
    }

    #[test]
    fn apply_keeps_line_numbers_and_grows_the_stack() {
        let mut code = Code::new(1, 0);
        code.instructions = vec![
            Instruction::Ldc(Constant::String("10".into())),
            Instruction::LineNumber(7),
            Instruction::Invoke {
                opcode: Opcode::Invokestatic,
                member: MemberReference::new("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I"),
                interface: false,
            },
            Instruction::Simple(Opcode::Ireturn),
        ];
        code.modified = false;

        let replacement = Replacement {
            start: 0,
            end: 2,
            code: vec![
                Instruction::Type { opcode: Opcode::New, class: "demo/Box".into() },
                Instruction::Simple(Opcode::Dup),
                Instruction::int(10),
                Instruction::Invoke {
                    opcode: Opcode::Invokespecial,
                    member: MemberReference::new("demo/Box", "<init>", "(I)V"),
                    interface: false,
                },
            ],
            slots: 1,
        };
        assert_eq!(apply(&mut code, vec![replacement]), 1);
        assert!(code.modified);
        assert_eq!(code.instructions[0], Instruction::LineNumber(7));
        assert_eq!(code.instructions.len(), 6);
        assert_eq!(code.max_stack, 3);
    }

    #[test]
    fn leading_literals_become_constant_values() {
        let mut class = holder(|m| {
            m.int(10)
                .putstatic("demo/Holder", "X", "I")
                .string("ten")
                .putstatic("demo/Holder", "NAME", "Ljava/lang/String;")
                .op(Opcode::Return)
        });
        let log = EventLog::new();
        assert!(prune_initializer(&mut class, &log, 1));
        assert_eq!(class.find_field("X", "I").unwrap().constant_value, Some(Constant::Integer(10)));
        assert_eq!(
            class.find_field("NAME", "Ljava/lang/String;").unwrap().constant_value,
            Some(Constant::String("ten".into()))
        );
        assert!(class.find_method("<clinit>", "()V").is_none());
        assert_eq!(log.count_kind(EventKind::ConstantValueInlined), 2);
        assert_eq!(log.count_kind(EventKind::InitializerRemoved), 1);
    }

    #[test]
    fn non_final_fields_keep_the_initializer() {
        let mut class = holder(|m| {
            m.int(10)
                .putstatic("demo/Holder", "X", "I")
                .int(1)
                .putstatic("demo/Holder", "counter", "I")
                .op(Opcode::Return)
        });
        let log = EventLog::new();
        assert!(prune_initializer(&mut class, &log, 1));
        let clinit = class.find_method("<clinit>", "()V").unwrap();
        assert_eq!(clinit.code.as_ref().unwrap().real_instructions().count(), 3);
        assert_eq!(log.count_kind(EventKind::InitializerRemoved), 0);
    }

    #[test]
    fn markers_are_stripped() {
        let mut class = ClassFile::parse(
            &ClassBuilder::new("demo/Marked")
                .annotate("Lclassfold/annotations/ConstantType;")
                .annotate("Ljava/lang/Deprecated;")
                .build()
                .unwrap()
                .to_bytes()
                .unwrap(),
            ParseMode::Full,
        )
        .unwrap();
        assert_eq!(strip_markers(&mut class), 1);
        assert_eq!(class.annotations.len(), 1);
        assert_eq!(strip_markers(&mut class), 0);
    }
}
