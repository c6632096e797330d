//! Bytecode interpreter.
//!
//! Executes one decoded method body against an [`ExecutionContext`]. The operand stack holds
//! one [`Value`] per value (a `long` is a single entry); the stack-manipulation instructions
//! (`pop2`, `dup2`, `dup_x2`, ...) consult [`Value::category`] to apply the form the JVM
//! would. Locals follow the JVM slot layout, so `long` and `double` occupy two slots.
//!
//! Exceptions travel as [`EmulationError::Thrown`]. When one reaches an instruction inside a
//! handler range whose catch type matches the runtime class, the stack is cleared, the
//! throwable pushed, and execution continues at the handler; otherwise the error propagates
//! to the caller. Any other [`EmulationError`] propagates immediately.
//!
//! Not supported: `jsr`/`ret` and `invokedynamic` call sites other than
//! `StringConcatFactory.makeConcatWithConstants`. Monitors are accepted and ignored.

use crate::{
    classfile::{FieldType, Instruction, Label, MethodDescriptor, Opcode},
    emulation::{
        context::{ExecutionContext, InvokeKind, PreparedMethod},
        heap::{HeapObject, HeapRef},
        runtime::{concat_recipe, make_concat},
        value::Value,
        EmulationError,
    },
};

enum Flow {
    Next,
    Jump(Label),
    Return(Option<Value>),
}

struct Frame {
    stack: Vec<Value>,
    locals: Vec<Value>,
}

impl Frame {
    fn pop(&mut self) -> Result<Value, EmulationError> {
        self.stack.pop().ok_or(EmulationError::StackUnderflow)
    }

    fn pop_int(&mut self) -> Result<i32, EmulationError> {
        self.pop()?.as_int()
    }

    fn pop_long(&mut self) -> Result<i64, EmulationError> {
        self.pop()?.as_long()
    }

    fn pop_float(&mut self) -> Result<f32, EmulationError> {
        self.pop()?.as_float()
    }

    fn pop_double(&mut self) -> Result<f64, EmulationError> {
        self.pop()?.as_double()
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, EmulationError> {
        if self.stack.len() < count {
            return Err(EmulationError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn load(&self, index: u16) -> Result<Value, EmulationError> {
        self.locals
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| EmulationError::InvalidControlFlow(format!("local {index} out of range")))
    }

    fn store(&mut self, index: u16, value: Value) -> Result<(), EmulationError> {
        let index = usize::from(index);
        let needed = index + usize::from(value.category());
        if needed > self.locals.len() {
            self.locals.resize(needed, Value::Null);
        }
        self.locals[index] = value;
        Ok(())
    }
}

/// Run a prepared method with the given arguments (receiver first for instance methods).
pub(crate) fn execute(
    ctx: &mut ExecutionContext<'_>,
    method: &PreparedMethod,
    args: Vec<Value>,
) -> Result<Option<Value>, EmulationError> {
    let mut frame = Frame {
        stack: Vec::with_capacity(usize::from(method.code.max_stack)),
        locals: vec![Value::Null; usize::from(method.code.max_locals)],
    };
    let mut slot = 0u16;
    for argument in args {
        let width = argument.category();
        frame.store(slot, argument)?;
        slot += width;
    }

    let instructions = &method.code.instructions;
    let mut pc = 0usize;
    loop {
        let Some(instruction) = instructions.get(pc) else {
            return Err(EmulationError::InvalidControlFlow(format!(
                "fell off the end of {}",
                method.member
            )));
        };
        if instruction.is_pseudo() {
            pc += 1;
            continue;
        }
        ctx.tick()?;

        match step(ctx, method, instruction, &mut frame) {
            Ok(Flow::Next) => pc += 1,
            Ok(Flow::Jump(label)) => pc = method.target(label)?,
            Ok(Flow::Return(value)) => return Ok(value),
            Err(EmulationError::Thrown(exception)) => match find_handler(ctx, method, pc, exception) {
                Some(handler) => {
                    frame.stack.clear();
                    frame.push(Value::Ref(exception));
                    pc = handler;
                }
                None => return Err(EmulationError::Thrown(exception)),
            },
            Err(other) => return Err(other),
        }
    }
}

fn find_handler(
    ctx: &ExecutionContext<'_>,
    method: &PreparedMethod,
    pc: usize,
    exception: HeapRef,
) -> Option<usize> {
    let class = ctx.heap().get(exception).class_name();
    method
        .handlers
        .iter()
        .find(|handler| {
            handler.start <= pc
                && pc < handler.end
                && handler
                    .catch_type
                    .as_deref()
                    .map_or(true, |catch| ctx.universe().is_subtype(&class, catch))
        })
        .map(|handler| handler.target)
}

fn throw(ctx: &mut ExecutionContext<'_>, class: &str, message: &str) -> EmulationError {
    ctx.throw_new(class, Some(message))
}

fn null_pointer(ctx: &mut ExecutionContext<'_>, what: &str) -> EmulationError {
    throw(ctx, "java/lang/NullPointerException", what)
}

fn branch(condition: bool, target: Label) -> Flow {
    if condition {
        Flow::Jump(target)
    } else {
        Flow::Next
    }
}

fn compare_float<T: PartialOrd>(a: T, b: T, nan: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Equal) => 0,
        Some(std::cmp::Ordering::Greater) => 1,
        None => nan,
    }
}

#[allow(clippy::too_many_lines)]
fn step(
    ctx: &mut ExecutionContext<'_>,
    method: &PreparedMethod,
    instruction: &Instruction,
    frame: &mut Frame,
) -> Result<Flow, EmulationError> {
    match instruction {
        Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame(_) => {}
        Instruction::Simple(opcode) => return simple(ctx, *opcode, frame),
        Instruction::Push { value, .. } => frame.push(Value::Int(*value)),
        Instruction::Ldc(constant) => {
            let value = ctx.constant(constant)?;
            frame.push(value);
        }
        Instruction::Var { opcode, index } => match opcode {
            Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
                let value = frame.load(*index)?;
                frame.push(value);
            }
            Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore | Opcode::Astore => {
                let value = frame.pop()?;
                frame.store(*index, value)?;
            }
            other => return Err(EmulationError::Unsupported(format!("{other}"))),
        },
        Instruction::Iinc { index, delta } => {
            let value = frame.load(*index)?.as_int()?;
            frame.store(*index, Value::Int(value.wrapping_add(i32::from(*delta))))?;
        }
        Instruction::Jump { opcode, target } => {
            let target = *target;
            return Ok(match opcode {
                Opcode::Goto | Opcode::GotoW => Flow::Jump(target),
                Opcode::Ifeq => branch(frame.pop_int()? == 0, target),
                Opcode::Ifne => branch(frame.pop_int()? != 0, target),
                Opcode::Iflt => branch(frame.pop_int()? < 0, target),
                Opcode::Ifge => branch(frame.pop_int()? >= 0, target),
                Opcode::Ifgt => branch(frame.pop_int()? > 0, target),
                Opcode::Ifle => branch(frame.pop_int()? <= 0, target),
                Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple => {
                    let b = frame.pop_int()?;
                    let a = frame.pop_int()?;
                    branch(
                        match opcode {
                            Opcode::IfIcmpeq => a == b,
                            Opcode::IfIcmpne => a != b,
                            Opcode::IfIcmplt => a < b,
                            Opcode::IfIcmpge => a >= b,
                            Opcode::IfIcmpgt => a > b,
                            _ => a <= b,
                        },
                        target,
                    )
                }
                Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                    let b = frame.pop()?.as_reference()?;
                    let a = frame.pop()?.as_reference()?;
                    branch((a == b) == (*opcode == Opcode::IfAcmpeq), target)
                }
                Opcode::Ifnull => branch(frame.pop()?.as_reference()?.is_none(), target),
                Opcode::Ifnonnull => branch(frame.pop()?.as_reference()?.is_some(), target),
                other => return Err(EmulationError::Unsupported(format!("{other}"))),
            });
        }
        Instruction::TableSwitch {
            default,
            low,
            high,
            targets,
        } => {
            let key = frame.pop_int()?;
            let target = if key < *low || key > *high {
                *default
            } else {
                targets
                    .get((i64::from(key) - i64::from(*low)) as usize)
                    .copied()
                    .unwrap_or(*default)
            };
            return Ok(Flow::Jump(target));
        }
        Instruction::LookupSwitch { default, pairs } => {
            let key = frame.pop_int()?;
            let target = pairs
                .iter()
                .find(|(match_key, _)| *match_key == key)
                .map_or(*default, |(_, label)| *label);
            return Ok(Flow::Jump(target));
        }
        Instruction::Field { opcode, member } => match opcode {
            Opcode::Getstatic => {
                let value = ctx.get_static(member)?;
                frame.push(value);
            }
            Opcode::Putstatic => {
                let value = frame.pop()?;
                ctx.put_static(member, value)?;
            }
            Opcode::Getfield => {
                let object = frame.pop()?;
                let value = ctx.get_field(object, member)?;
                frame.push(value);
            }
            _ => {
                let value = frame.pop()?;
                let object = frame.pop()?;
                ctx.put_field(object, member, value)?;
            }
        },
        Instruction::Invoke { opcode, member, .. } => {
            let kind = InvokeKind::from_opcode(*opcode)
                .ok_or_else(|| EmulationError::Unsupported(format!("{opcode}")))?;
            let descriptor = MethodDescriptor::parse(&member.descriptor)
                .map_err(|e| EmulationError::Unsupported(e.to_string()))?;
            let count = descriptor.parameters.len() + usize::from(kind.has_receiver());
            let args = frame.pop_n(count)?;
            if let Some(value) = ctx.invoke(kind, member, args)? {
                frame.push(value);
            }
        }
        Instruction::InvokeDynamic {
            bootstrap,
            name,
            descriptor,
        } => {
            let recipe = concat_recipe(&method.class, *bootstrap)?.ok_or_else(|| {
                EmulationError::Unsupported(format!("invokedynamic {name}{descriptor}"))
            })?;
            let parameters = ExecutionContext::parameter_types(descriptor)?;
            let args = frame.pop_n(parameters.len())?;
            let value = make_concat(ctx, &recipe, &parameters, &args)?;
            frame.push(value);
        }
        Instruction::Type { opcode, class } => match opcode {
            Opcode::New => {
                let object = ctx.instantiate(class)?;
                frame.push(Value::Ref(object));
            }
            Opcode::Anewarray => {
                let length = frame.pop_int()?;
                let component = FieldType::from_class_name(class)
                    .map_err(|e| EmulationError::Unsupported(e.to_string()))?;
                let array = new_array(ctx, component, length)?;
                frame.push(array);
            }
            Opcode::Checkcast => {
                let value = frame.pop()?;
                if value.reference().is_some() && !ctx.is_instance(value, class) {
                    let actual = ctx.runtime_class(value).unwrap_or_default();
                    let message = format!(
                        "class {} cannot be cast to class {}",
                        actual.replace('/', "."),
                        class.replace('/', ".")
                    );
                    return Err(throw(ctx, "java/lang/ClassCastException", &message));
                }
                frame.push(value);
            }
            Opcode::Instanceof => {
                let value = frame.pop()?;
                frame.push(Value::Int(i32::from(ctx.is_instance(value, class))));
            }
            other => return Err(EmulationError::Unsupported(format!("{other}"))),
        },
        Instruction::NewArray(code) => {
            let length = frame.pop_int()?;
            let component = match code {
                4 => FieldType::Boolean,
                5 => FieldType::Char,
                6 => FieldType::Float,
                7 => FieldType::Double,
                8 => FieldType::Byte,
                9 => FieldType::Short,
                10 => FieldType::Int,
                11 => FieldType::Long,
                other => return Err(EmulationError::Unsupported(format!("newarray type {other}"))),
            };
            let array = new_array(ctx, component, length)?;
            frame.push(array);
        }
        Instruction::MultiANewArray { class, dimensions } => {
            let lengths = frame.pop_n(usize::from(*dimensions))?;
            let lengths = lengths
                .iter()
                .map(Value::as_int)
                .collect::<Result<Vec<_>, _>>()?;
            let array_type = FieldType::parse(class).map_err(|e| EmulationError::Unsupported(e.to_string()))?;
            let array = multi_array(ctx, &array_type, &lengths)?;
            frame.push(array);
        }
    }
    Ok(Flow::Next)
}

fn new_array(ctx: &mut ExecutionContext<'_>, component: FieldType, length: i32) -> Result<Value, EmulationError> {
    if length < 0 {
        return Err(throw(ctx, "java/lang/NegativeArraySizeException", &length.to_string()));
    }
    let elements = vec![Value::default_for(&component); length as usize];
    Ok(Value::Ref(ctx.heap_mut().alloc(HeapObject::Array { component, elements })))
}

fn multi_array(ctx: &mut ExecutionContext<'_>, array_type: &FieldType, lengths: &[i32]) -> Result<Value, EmulationError> {
    let FieldType::Array(component) = array_type else {
        return Err(EmulationError::Unsupported(format!("multianewarray of {array_type}")));
    };
    let Some((&length, rest)) = lengths.split_first() else {
        return Ok(Value::Null);
    };
    if rest.is_empty() {
        return new_array(ctx, (**component).clone(), length);
    }
    if length < 0 {
        return Err(throw(ctx, "java/lang/NegativeArraySizeException", &length.to_string()));
    }
    let mut elements = Vec::with_capacity(length as usize);
    for _ in 0..length {
        elements.push(multi_array(ctx, component, rest)?);
    }
    Ok(Value::Ref(ctx.heap_mut().alloc(HeapObject::Array {
        component: (**component).clone(),
        elements,
    })))
}

fn array_ref(ctx: &mut ExecutionContext<'_>, value: Value) -> Result<HeapRef, EmulationError> {
    match value.as_reference()? {
        Some(reference) => Ok(reference),
        None => Err(null_pointer(ctx, "Cannot access an element of a null array")),
    }
}

fn array_load(ctx: &mut ExecutionContext<'_>, frame: &mut Frame) -> Result<(), EmulationError> {
    let index = frame.pop_int()?;
    let array = frame.pop()?;
    let array = array_ref(ctx, array)?;
    let element = match ctx.heap().get(array) {
        HeapObject::Array { elements, .. } => {
            usize::try_from(index).ok().and_then(|i| elements.get(i).copied()).ok_or(elements.len())
        }
        other => return Err(EmulationError::Unsupported(format!("array load from {}", other.class_name()))),
    };
    match element {
        Ok(value) => {
            frame.push(value);
            Ok(())
        }
        Err(length) => {
            let message = format!("Index {index} out of bounds for length {length}");
            Err(throw(ctx, "java/lang/ArrayIndexOutOfBoundsException", &message))
        }
    }
}

fn array_store(ctx: &mut ExecutionContext<'_>, frame: &mut Frame) -> Result<(), EmulationError> {
    let value = frame.pop()?;
    let index = frame.pop_int()?;
    let array = frame.pop()?;
    let array = array_ref(ctx, array)?;

    let (length, component) = match ctx.heap().get(array) {
        HeapObject::Array { elements, component } => (elements.len(), component.clone()),
        other => return Err(EmulationError::Unsupported(format!("array store to {}", other.class_name()))),
    };
    let Some(slot) = usize::try_from(index).ok().filter(|i| *i < length) else {
        let message = format!("Index {index} out of bounds for length {length}");
        return Err(throw(ctx, "java/lang/ArrayIndexOutOfBoundsException", &message));
    };

    let stored = match (&component, value) {
        (FieldType::Boolean, Value::Int(v)) => Value::Int(v & 1),
        (FieldType::Byte, Value::Int(v)) => Value::Int(i32::from(v as i8)),
        (FieldType::Char, Value::Int(v)) => Value::Int(i32::from(v as u16)),
        (FieldType::Short, Value::Int(v)) => Value::Int(i32::from(v as i16)),
        (FieldType::Object(_) | FieldType::Array(_), Value::Ref(_)) => {
            if let Some(class) = component.class_name() {
                if !ctx.is_instance(value, &class) {
                    let actual = ctx.runtime_class(value).unwrap_or_default().replace('/', ".");
                    return Err(throw(ctx, "java/lang/ArrayStoreException", &actual));
                }
            }
            value
        }
        _ => value,
    };
    if let HeapObject::Array { elements, .. } = ctx.heap_mut().get_mut(array) {
        elements[slot] = stored;
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
fn simple(ctx: &mut ExecutionContext<'_>, opcode: Opcode, frame: &mut Frame) -> Result<Flow, EmulationError> {
    macro_rules! int_op {
        ($op:expr) => {{
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            let f: fn(i32, i32) -> i32 = $op;
            frame.push(Value::Int(f(a, b)));
        }};
    }
    macro_rules! long_op {
        ($op:expr) => {{
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            let f: fn(i64, i64) -> i64 = $op;
            frame.push(Value::Long(f(a, b)));
        }};
    }
    macro_rules! long_shift {
        ($op:expr) => {{
            let b = frame.pop_int()?;
            let a = frame.pop_long()?;
            let f: fn(i64, u32) -> i64 = $op;
            frame.push(Value::Long(f(a, (b & 63) as u32)));
        }};
    }
    macro_rules! float_op {
        ($op:expr) => {{
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            let f: fn(f32, f32) -> f32 = $op;
            frame.push(Value::Float(f(a, b)));
        }};
    }
    macro_rules! double_op {
        ($op:expr) => {{
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            let f: fn(f64, f64) -> f64 = $op;
            frame.push(Value::Double(f(a, b)));
        }};
    }

    match opcode {
        Opcode::Nop => {}
        Opcode::AconstNull => frame.push(Value::Null),
        Opcode::IconstM1 => frame.push(Value::Int(-1)),
        Opcode::Iconst0 => frame.push(Value::Int(0)),
        Opcode::Iconst1 => frame.push(Value::Int(1)),
        Opcode::Iconst2 => frame.push(Value::Int(2)),
        Opcode::Iconst3 => frame.push(Value::Int(3)),
        Opcode::Iconst4 => frame.push(Value::Int(4)),
        Opcode::Iconst5 => frame.push(Value::Int(5)),
        Opcode::Lconst0 => frame.push(Value::Long(0)),
        Opcode::Lconst1 => frame.push(Value::Long(1)),
        Opcode::Fconst0 => frame.push(Value::Float(0.0)),
        Opcode::Fconst1 => frame.push(Value::Float(1.0)),
        Opcode::Fconst2 => frame.push(Value::Float(2.0)),
        Opcode::Dconst0 => frame.push(Value::Double(0.0)),
        Opcode::Dconst1 => frame.push(Value::Double(1.0)),

        Opcode::Iaload
        | Opcode::Laload
        | Opcode::Faload
        | Opcode::Daload
        | Opcode::Aaload
        | Opcode::Baload
        | Opcode::Caload
        | Opcode::Saload => array_load(ctx, frame)?,
        Opcode::Iastore
        | Opcode::Lastore
        | Opcode::Fastore
        | Opcode::Dastore
        | Opcode::Aastore
        | Opcode::Bastore
        | Opcode::Castore
        | Opcode::Sastore => array_store(ctx, frame)?,
        Opcode::Arraylength => {
            let array = frame.pop()?;
            let array = array_ref(ctx, array)?;
            match ctx.heap().get(array) {
                HeapObject::Array { elements, .. } => frame.push(Value::Int(elements.len() as i32)),
                other => return Err(EmulationError::Unsupported(format!("arraylength of {}", other.class_name()))),
            }
        }

        Opcode::Pop => {
            frame.pop()?;
        }
        Opcode::Pop2 => {
            if frame.pop()?.category() == 1 {
                frame.pop()?;
            }
        }
        Opcode::Dup => {
            let value = frame.pop()?;
            frame.push(value);
            frame.push(value);
        }
        Opcode::DupX1 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.stack.extend([v1, v2, v1]);
        }
        Opcode::DupX2 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            if v2.category() == 2 {
                frame.stack.extend([v1, v2, v1]);
            } else {
                let v3 = frame.pop()?;
                frame.stack.extend([v1, v3, v2, v1]);
            }
        }
        Opcode::Dup2 => {
            let v1 = frame.pop()?;
            if v1.category() == 2 {
                frame.stack.extend([v1, v1]);
            } else {
                let v2 = frame.pop()?;
                frame.stack.extend([v2, v1, v2, v1]);
            }
        }
        Opcode::Dup2X1 => {
            let v1 = frame.pop()?;
            if v1.category() == 2 {
                let v2 = frame.pop()?;
                frame.stack.extend([v1, v2, v1]);
            } else {
                let v2 = frame.pop()?;
                let v3 = frame.pop()?;
                frame.stack.extend([v2, v1, v3, v2, v1]);
            }
        }
        Opcode::Dup2X2 => {
            let v1 = frame.pop()?;
            if v1.category() == 2 {
                let v2 = frame.pop()?;
                if v2.category() == 2 {
                    frame.stack.extend([v1, v2, v1]);
                } else {
                    let v3 = frame.pop()?;
                    frame.stack.extend([v1, v3, v2, v1]);
                }
            } else {
                let v2 = frame.pop()?;
                let v3 = frame.pop()?;
                if v3.category() == 2 {
                    frame.stack.extend([v2, v1, v3, v2, v1]);
                } else {
                    let v4 = frame.pop()?;
                    frame.stack.extend([v2, v1, v4, v3, v2, v1]);
                }
            }
        }
        Opcode::Swap => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.stack.extend([v1, v2]);
        }

        Opcode::Iadd => int_op!(i32::wrapping_add),
        Opcode::Isub => int_op!(i32::wrapping_sub),
        Opcode::Imul => int_op!(i32::wrapping_mul),
        Opcode::Idiv | Opcode::Irem => {
            let b = frame.pop_int()?;
            let a = frame.pop_int()?;
            if b == 0 {
                return Err(throw(ctx, "java/lang/ArithmeticException", "/ by zero"));
            }
            frame.push(Value::Int(if opcode == Opcode::Idiv {
                a.wrapping_div(b)
            } else {
                a.wrapping_rem(b)
            }));
        }
        Opcode::Ineg => {
            let a = frame.pop_int()?;
            frame.push(Value::Int(a.wrapping_neg()));
        }
        Opcode::Ishl => int_op!(|a, b| a.wrapping_shl((b & 31) as u32)),
        Opcode::Ishr => int_op!(|a, b| a >> (b & 31)),
        Opcode::Iushr => int_op!(|a, b| ((a as u32) >> (b & 31)) as i32),
        Opcode::Iand => int_op!(|a, b| a & b),
        Opcode::Ior => int_op!(|a, b| a | b),
        Opcode::Ixor => int_op!(|a, b| a ^ b),

        Opcode::Ladd => long_op!(i64::wrapping_add),
        Opcode::Lsub => long_op!(i64::wrapping_sub),
        Opcode::Lmul => long_op!(i64::wrapping_mul),
        Opcode::Ldiv | Opcode::Lrem => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            if b == 0 {
                return Err(throw(ctx, "java/lang/ArithmeticException", "/ by zero"));
            }
            frame.push(Value::Long(if opcode == Opcode::Ldiv {
                a.wrapping_div(b)
            } else {
                a.wrapping_rem(b)
            }));
        }
        Opcode::Lneg => {
            let a = frame.pop_long()?;
            frame.push(Value::Long(a.wrapping_neg()));
        }
        Opcode::Lshl => long_shift!(i64::wrapping_shl),
        Opcode::Lshr => long_shift!(|a, b| a >> b),
        Opcode::Lushr => long_shift!(|a, b| ((a as u64) >> b) as i64),
        Opcode::Land => long_op!(|a, b| a & b),
        Opcode::Lor => long_op!(|a, b| a | b),
        Opcode::Lxor => long_op!(|a, b| a ^ b),

        Opcode::Fadd => float_op!(|a, b| a + b),
        Opcode::Fsub => float_op!(|a, b| a - b),
        Opcode::Fmul => float_op!(|a, b| a * b),
        Opcode::Fdiv => float_op!(|a, b| a / b),
        Opcode::Frem => float_op!(|a, b| a % b),
        Opcode::Fneg => {
            let a = frame.pop_float()?;
            frame.push(Value::Float(-a));
        }
        Opcode::Dadd => double_op!(|a, b| a + b),
        Opcode::Dsub => double_op!(|a, b| a - b),
        Opcode::Dmul => double_op!(|a, b| a * b),
        Opcode::Ddiv => double_op!(|a, b| a / b),
        Opcode::Drem => double_op!(|a, b| a % b),
        Opcode::Dneg => {
            let a = frame.pop_double()?;
            frame.push(Value::Double(-a));
        }

        Opcode::I2l => {
            let a = frame.pop_int()?;
            frame.push(Value::Long(i64::from(a)));
        }
        Opcode::I2f => {
            let a = frame.pop_int()?;
            frame.push(Value::Float(a as f32));
        }
        Opcode::I2d => {
            let a = frame.pop_int()?;
            frame.push(Value::Double(f64::from(a)));
        }
        Opcode::L2i => {
            let a = frame.pop_long()?;
            frame.push(Value::Int(a as i32));
        }
        Opcode::L2f => {
            let a = frame.pop_long()?;
            frame.push(Value::Float(a as f32));
        }
        Opcode::L2d => {
            let a = frame.pop_long()?;
            frame.push(Value::Double(a as f64));
        }
        // `as` saturates and maps NaN to zero, which is the JVM's rule.
        Opcode::F2i => {
            let a = frame.pop_float()?;
            frame.push(Value::Int(a as i32));
        }
        Opcode::F2l => {
            let a = frame.pop_float()?;
            frame.push(Value::Long(a as i64));
        }
        Opcode::F2d => {
            let a = frame.pop_float()?;
            frame.push(Value::Double(f64::from(a)));
        }
        Opcode::D2i => {
            let a = frame.pop_double()?;
            frame.push(Value::Int(a as i32));
        }
        Opcode::D2l => {
            let a = frame.pop_double()?;
            frame.push(Value::Long(a as i64));
        }
        Opcode::D2f => {
            let a = frame.pop_double()?;
            frame.push(Value::Float(a as f32));
        }
        Opcode::I2b => {
            let a = frame.pop_int()?;
            frame.push(Value::Int(i32::from(a as i8)));
        }
        Opcode::I2c => {
            let a = frame.pop_int()?;
            frame.push(Value::Int(i32::from(a as u16)));
        }
        Opcode::I2s => {
            let a = frame.pop_int()?;
            frame.push(Value::Int(i32::from(a as i16)));
        }

        Opcode::Lcmp => {
            let b = frame.pop_long()?;
            let a = frame.pop_long()?;
            frame.push(Value::Int(a.cmp(&b) as i32));
        }
        Opcode::Fcmpl | Opcode::Fcmpg => {
            let b = frame.pop_float()?;
            let a = frame.pop_float()?;
            let nan = if opcode == Opcode::Fcmpl { -1 } else { 1 };
            frame.push(Value::Int(compare_float(a, b, nan)));
        }
        Opcode::Dcmpl | Opcode::Dcmpg => {
            let b = frame.pop_double()?;
            let a = frame.pop_double()?;
            let nan = if opcode == Opcode::Dcmpl { -1 } else { 1 };
            frame.push(Value::Int(compare_float(a, b, nan)));
        }

        Opcode::Ireturn | Opcode::Lreturn | Opcode::Freturn | Opcode::Dreturn | Opcode::Areturn => {
            return Ok(Flow::Return(Some(frame.pop()?)));
        }
        Opcode::Return => return Ok(Flow::Return(None)),

        Opcode::Athrow => {
            let throwable = frame.pop()?;
            return Err(match throwable.as_reference()? {
                Some(reference) => EmulationError::Thrown(reference),
                None => null_pointer(ctx, "Cannot throw exception because value is null"),
            });
        }
        Opcode::Monitorenter | Opcode::Monitorexit => {
            if frame.pop()?.as_reference()?.is_none() {
                return Err(null_pointer(ctx, "Cannot enter synchronized block because value is null"));
            }
        }

        other => return Err(EmulationError::Unsupported(format!("{other}"))),
    }
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        classfile::{AccessFlags, ClassBuilder, MemberReference, MethodBuilder},
        config::BytesInput,
        emulation::{ClassUniverse, EmulationLimits},
    };

    const STATIC: AccessFlags = AccessFlags::PUBLIC.union(AccessFlags::STATIC);

    fn universe(descriptor: &str, body: impl FnOnce(MethodBuilder) -> MethodBuilder) -> ClassUniverse {
        let class = ClassBuilder::new("demo/Calc")
            .method(STATIC, "run", descriptor, body)
            .build()
            .unwrap();
        let mut universe = ClassUniverse::new();
        universe
            .insert(Arc::new(BytesInput::for_class("demo/Calc", class.to_bytes().unwrap())), true)
            .unwrap();
        universe
    }

    fn run(universe: &ClassUniverse, descriptor: &str, args: Vec<Value>) -> Result<Option<Value>, EmulationError> {
        let mut ctx = ExecutionContext::new(universe, EmulationLimits::default());
        let member = MemberReference::new("demo/Calc", "run", descriptor);
        ctx.invoke(InvokeKind::Static, &member, args)
    }

    #[test]
    fn loop_sums_a_range() {
        // int acc = 0; for (int i = 1; i <= n; i++) acc += i; return acc;
        let universe = universe("(I)I", |mut m| {
            let head = m.new_label();
            let done = m.new_label();
            m.op(Opcode::Iconst0)
                .store(Opcode::Istore, 1)
                .op(Opcode::Iconst1)
                .store(Opcode::Istore, 2)
                .place(head)
                .load(Opcode::Iload, 2)
                .load(Opcode::Iload, 0)
                .jump(Opcode::IfIcmpgt, done)
                .load(Opcode::Iload, 1)
                .load(Opcode::Iload, 2)
                .op(Opcode::Iadd)
                .store(Opcode::Istore, 1)
                .iinc(2, 1)
                .jump(Opcode::Goto, head)
                .place(done)
                .load(Opcode::Iload, 1)
                .op(Opcode::Ireturn)
        });
        assert_eq!(run(&universe, "(I)I", vec![Value::Int(10)]).unwrap(), Some(Value::Int(55)));
        assert_eq!(run(&universe, "(I)I", vec![Value::Int(0)]).unwrap(), Some(Value::Int(0)));
    }

    #[test]
    fn wide_values_take_one_stack_entry() {
        // return x + x, through dup2 on a long.
        let universe = universe("(J)J", |m| {
            m.load(Opcode::Lload, 0).op(Opcode::Dup2).op(Opcode::Ladd).op(Opcode::Lreturn)
        });
        assert_eq!(run(&universe, "(J)J", vec![Value::Long(21)]).unwrap(), Some(Value::Long(42)));
    }

    #[test]
    fn handler_catches_matching_exception() {
        // try { return n / 0; } catch (ArithmeticException e) { return -1; }
        let universe = universe("(I)I", |mut m| {
            let start = m.new_label();
            let end = m.new_label();
            let handler = m.new_label();
            m.place(start)
                .load(Opcode::Iload, 0)
                .op(Opcode::Iconst0)
                .op(Opcode::Idiv)
                .op(Opcode::Ireturn)
                .place(end)
                .place(handler)
                .op(Opcode::Pop)
                .op(Opcode::IconstM1)
                .op(Opcode::Ireturn)
                .try_catch(start, end, handler, Some("java/lang/ArithmeticException"))
        });
        assert_eq!(run(&universe, "(I)I", vec![Value::Int(7)]).unwrap(), Some(Value::Int(-1)));
    }

    #[test]
    fn unmatched_exception_propagates() {
        let universe = universe("(I)I", |mut m| {
            let start = m.new_label();
            let end = m.new_label();
            let handler = m.new_label();
            m.place(start)
                .load(Opcode::Iload, 0)
                .op(Opcode::Iconst0)
                .op(Opcode::Idiv)
                .op(Opcode::Ireturn)
                .place(end)
                .place(handler)
                .op(Opcode::Pop)
                .op(Opcode::IconstM1)
                .op(Opcode::Ireturn)
                .try_catch(start, end, handler, Some("java/lang/IllegalStateException"))
        });
        let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
        let member = MemberReference::new("demo/Calc", "run", "(I)I");
        match ctx.invoke(InvokeKind::Static, &member, vec![Value::Int(7)]) {
            Err(EmulationError::Thrown(exception)) => {
                assert_eq!(ctx.heap().get(exception).class_name(), "java/lang/ArithmeticException");
                assert!(ctx.describe_throwable(exception).contains("/ by zero"));
            }
            other => panic!("expected ArithmeticException, got {other:?}"),
        }
    }

    #[test]
    fn instruction_limit_stops_endless_loops() {
        let universe = universe("()V", |mut m| {
            let head = m.new_label();
            m.place(head).jump(Opcode::Goto, head)
        });
        let limits = EmulationLimits {
            max_call_depth: 16,
            max_instructions: Some(1_000),
        };
        let mut ctx = ExecutionContext::new(&universe, limits);
        ctx.begin_evaluation();
        let member = MemberReference::new("demo/Calc", "run", "()V");
        assert_eq!(
            ctx.invoke(InvokeKind::Static, &member, Vec::new()),
            Err(EmulationError::InstructionLimit(1_000))
        );
    }
}
