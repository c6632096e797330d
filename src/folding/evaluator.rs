//! Evaluation of fold candidates.
//!
//! The analysis decides *where* a candidate is; this module decides whether it may be
//! evaluated and runs it. A call is evaluated only when the implementation it dispatches to
//! is constant and its predicate accepts the call. Every evaluation starts a fresh
//! instruction budget.
//!
//! Results come back as [`Failure`] on any soft failure, classified so the caller can log
//! it under the right event kind. [`literal`] then decides whether a result can be written
//! back as a single constant instruction.

use crate::{
    classfile::{
        modified_utf8_len, ClassFile, Constant, FieldType, Instruction, MemberReference, Opcode,
        MAX_UTF8_LENGTH,
    },
    config::{Invocation, RunConfiguration},
    emulation::{
        double_to_string, float_to_string, EmulationError, ExecutionContext, HeapObject, InvokeKind,
        Value,
    },
};

/// Why a candidate was not evaluated or produced no value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Failure {
    /// The member is not configured as constant. Not an error, nothing is logged.
    NotConstant,
    /// The predicate of the member rejected the call.
    Rejected(MemberReference),
    /// A member could not be resolved or has no implementation.
    Inaccessible(MemberReference, String),
    /// The evaluation threw or hit an emulator limitation.
    Failed(String),
}

impl Failure {
    pub(crate) fn from_emulation(ctx: &ExecutionContext<'_>, member: &MemberReference, error: &EmulationError) -> Self {
        match error {
            EmulationError::ClassNotFound(_)
            | EmulationError::NoSuchMethod(_)
            | EmulationError::NoSuchField(_)
            | EmulationError::ClassLoad { .. } => {
                Failure::Inaccessible(member.clone(), ctx.describe_error(error))
            }
            EmulationError::MissingNative(missing) => {
                Failure::Inaccessible(missing.clone(), ctx.describe_error(error))
            }
            other => Failure::Failed(format!("{member}: {}", ctx.describe_error(other))),
        }
    }
}

/// Read a static field.
pub(crate) fn read_static(ctx: &mut ExecutionContext<'_>, field: &MemberReference) -> Result<Value, Failure> {
    ctx.begin_evaluation();
    ctx.get_static(field)
        .map_err(|error| Failure::from_emulation(ctx, field, &error))
}

/// Read an instance field of a folded receiver.
pub(crate) fn read_field(
    ctx: &mut ExecutionContext<'_>,
    receiver: Value,
    field: &MemberReference,
) -> Result<Value, Failure> {
    ctx.begin_evaluation();
    ctx.get_field(receiver, field)
        .map_err(|error| Failure::from_emulation(ctx, field, &error))
}

/// Evaluate a call whose operands are all folded. For instance calls `operands[0]` is the
/// receiver; constructors take only their parameters and return the new object.
pub(crate) fn invoke(
    config: &RunConfiguration,
    ctx: &mut ExecutionContext<'_>,
    kind: InvokeKind,
    member: &MemberReference,
    operands: Vec<Value>,
) -> Result<(MemberReference, Value), Failure> {
    let constructing = member.is_constructor() && kind == InvokeKind::Special;
    let receiver = (kind.has_receiver() && !constructing)
        .then(|| operands.first().copied())
        .flatten();

    let target = ctx
        .select_target(kind, member, receiver)
        .map_err(|error| Failure::from_emulation(ctx, member, &error))?;
    let implementation = target.member().clone();
    let Some(predicate) = config.constant_predicate(&implementation, kind == InvokeKind::Static) else {
        return Err(Failure::NotConstant);
    };

    let receiver_class = receiver.and_then(|r| ctx.runtime_class(r));
    let parameters = if receiver.is_some() { &operands[1..] } else { &operands[..] };
    let arguments: Vec<Option<String>> = parameters.iter().map(|v| ctx.runtime_class(*v)).collect();
    let invocation = Invocation {
        member: &implementation,
        receiver: receiver_class.as_deref(),
        arguments: &arguments,
    };
    if !predicate.allows(&invocation, config.universe()) {
        return Err(Failure::Rejected(implementation));
    }

    ctx.begin_evaluation();
    let result = if constructing {
        ctx.construct(member, operands).map(Some)
    } else {
        ctx.invoke_memoized(kind, member, operands)
    };
    match result {
        Ok(Some(value)) => Ok((implementation, value)),
        Ok(None) => Err(Failure::Failed(format!("{implementation} returned no value"))),
        Err(error) => Err(Failure::from_emulation(ctx, &implementation, &error)),
    }
}

/// Evaluate a `StringConcatFactory` call site. `Ok(None)` if the bootstrap is a different
/// factory and the site is not a candidate.
pub(crate) fn concat(
    ctx: &mut ExecutionContext<'_>,
    class: &ClassFile,
    bootstrap: u16,
    parameters: &[FieldType],
    operands: &[Value],
) -> Result<Option<Value>, Failure> {
    let site = concat_site();
    let recipe = match crate::emulation::concat_recipe(class, bootstrap) {
        Ok(Some(recipe)) => recipe,
        Ok(None) => return Ok(None),
        Err(error) => return Err(Failure::from_emulation(ctx, &site, &error)),
    };
    ctx.begin_evaluation();
    crate::emulation::make_concat(ctx, &recipe, parameters, operands)
        .map(Some)
        .map_err(|error| Failure::from_emulation(ctx, &site, &error))
}

/// The member string concatenation sites are reported under.
pub(crate) fn concat_site() -> MemberReference {
    MemberReference::new(
        "java/lang/invoke/StringConcatFactory",
        "makeConcatWithConstants",
        "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;",
    )
}

/// The instructions pushing `value` directly, `None` if it needs a recipe.
///
/// Primitives, `null`, strings that fit the constant pool and class objects are literals.
/// Class objects of primitive types are read from the `TYPE` field of their wrapper.
pub(crate) fn literal(ctx: &ExecutionContext<'_>, value: Value) -> Option<Vec<Instruction>> {
    let constant = match value {
        Value::Int(v) => Constant::Integer(v),
        Value::Long(v) => Constant::Long(v),
        Value::Float(v) => Constant::Float(v),
        Value::Double(v) => Constant::Double(v),
        Value::Null => return Some(vec![Instruction::Simple(Opcode::AconstNull)]),
        Value::Ref(reference) => match ctx.heap().get(reference) {
            HeapObject::String(units) => {
                if modified_utf8_len(units) > MAX_UTF8_LENGTH {
                    return None;
                }
                Constant::String(ctx.string_value(value)?)
            }
            HeapObject::Class(name) => match primitive_holder(name) {
                Some(wrapper) => {
                    return Some(vec![Instruction::Field {
                        opcode: Opcode::Getstatic,
                        member: MemberReference::new(wrapper, "TYPE", "Ljava/lang/Class;"),
                    }])
                }
                None => Constant::Class(name.clone()),
            },
            _ => return None,
        },
    };
    Some(vec![Instruction::literal(&constant)])
}

/// Wrapper class holding the class object of a primitive type.
fn primitive_holder(keyword: &str) -> Option<&'static str> {
    Some(match keyword {
        "void" => "java/lang/Void",
        "int" => "java/lang/Integer",
        "long" => "java/lang/Long",
        "short" => "java/lang/Short",
        "byte" => "java/lang/Byte",
        "float" => "java/lang/Float",
        "double" => "java/lang/Double",
        "boolean" => "java/lang/Boolean",
        "char" => "java/lang/Character",
        _ => return None,
    })
}

/// A short rendering of a value for log messages.
pub(crate) fn render(ctx: &ExecutionContext<'_>, value: Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Long(v) => format!("{v}L"),
        Value::Float(v) => format!("{}f", float_to_string(v)),
        Value::Double(v) => double_to_string(v),
        Value::Null => "null".to_string(),
        Value::Ref(reference) => match ctx.heap().get(reference) {
            HeapObject::String(_) => match ctx.string_value(value) {
                Some(text) if text.chars().count() <= 64 => format!("{text:?}"),
                Some(text) => format!("{:?}...", text.chars().take(64).collect::<String>()),
                None => "<string with unpaired surrogates>".to_string(),
            },
            HeapObject::Class(name) => format!("class {}", name.replace('/', ".")),
            other => format!("{} {reference}", other.class_name().replace('/', ".")),
        },
    }
}

/// The static type of a value a fold produces, used to decide whether a rebuilt instance
/// needs a cast. `class` is an internal name or an array descriptor.
pub(crate) fn reference_type(class: &str) -> FieldType {
    if class.starts_with('[') {
        FieldType::parse(class).unwrap_or_else(|_| FieldType::Object(class.to_string()))
    } else {
        FieldType::Object(class.to_string())
    }
}

/// The type pushed by a literal constant.
pub(crate) fn constant_type(constant: &Constant) -> FieldType {
    match constant {
        Constant::Integer(_) => FieldType::Int,
        Constant::Float(_) => FieldType::Float,
        Constant::Long(_) => FieldType::Long,
        Constant::Double(_) => FieldType::Double,
        Constant::String(_) => FieldType::Object("java/lang/String".to_string()),
        Constant::Class(_) | Constant::Pool(_) => FieldType::Object("java/lang/Class".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{ClassUniverse, EmulationLimits};

    #[test]
    fn literals_cover_primitives_strings_and_classes() {
        let universe = ClassUniverse::new();
        let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());

        assert_eq!(literal(&ctx, Value::Int(10)), Some(vec![Instruction::Push { opcode: Opcode::Bipush, value: 10 }]));
        assert_eq!(literal(&ctx, Value::Long(1)), Some(vec![Instruction::Simple(Opcode::Lconst1)]));
        assert_eq!(literal(&ctx, Value::Null), Some(vec![Instruction::Simple(Opcode::AconstNull)]));

        let text = ctx.new_str("hello");
        assert_eq!(
            literal(&ctx, text),
            Some(vec![Instruction::Ldc(Constant::String("hello".into()))])
        );

        let class = ctx.class_object("demo/Color");
        assert_eq!(
            literal(&ctx, class),
            Some(vec![Instruction::Ldc(Constant::Class("demo/Color".into()))])
        );

        let int_class = ctx.class_object("int");
        assert_eq!(
            literal(&ctx, int_class),
            Some(vec![Instruction::Field {
                opcode: Opcode::Getstatic,
                member: MemberReference::new("java/lang/Integer", "TYPE", "Ljava/lang/Class;"),
            }])
        );
    }

    #[test]
    fn oversized_and_broken_strings_are_not_literals() {
        let universe = ClassUniverse::new();
        let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());

        let long = ctx.new_str(&"x".repeat(70_000));
        assert_eq!(literal(&ctx, long), None);

        let surrogate = ctx.new_string(vec![0xD800]);
        assert_eq!(literal(&ctx, surrogate), None);
    }

    #[test]
    fn render_is_short() {
        let universe = ClassUniverse::new();
        let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
        let text = ctx.new_str("abc");
        assert_eq!(render(&ctx, text), "\"abc\"");
        assert_eq!(render(&ctx, Value::Long(3)), "3L");
        assert_eq!(render(&ctx, Value::Null), "null");
    }
}
