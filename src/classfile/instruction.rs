//! Symbolic instruction model.
//!
//! Method bodies are decoded into a flat list of [`Instruction`]s. Operands are symbolic: member
//! references instead of pool indices, [`Label`]s instead of byte offsets, typed [`Constant`]s
//! instead of `ldc` indices. Short forms (`iload_0`, `ldc` vs `ldc_w`, `wide`) are normalized
//! away on decode and chosen again on encode, so code can be spliced without caring about
//! instruction sizes.
//!
//! Labels, line numbers and stack-map frames are pseudo instructions occupying no bytes.

use std::fmt;

use crate::classfile::{member::MemberReference, opcodes::Opcode};

/// A position in a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A loadable constant.
///
/// Floating point constants compare by bit pattern, so `NaN` literals are equal to themselves
/// and `0.0` differs from `-0.0`. That is the equality the rewriter needs to recognize a
/// replacement identical to the original instruction.
#[derive(Debug, Clone)]
pub enum Constant {
    /// `int` (also `boolean`, `byte`, `char`, `short`)
    Integer(i32),
    /// `float`
    Float(f32),
    /// `long`
    Long(i64),
    /// `double`
    Double(f64),
    /// `String` literal
    String(String),
    /// Class literal, internal name or array descriptor
    Class(String),
    /// Method handle, method type or dynamic constant, by pool index
    Pool(u16),
}

impl Constant {
    /// Operand stack slots this constant occupies.
    #[must_use]
    pub fn slots(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Integer(a), Constant::Integer(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Long(a), Constant::Long(b)) => a == b,
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) | (Constant::Class(a), Constant::Class(b)) => {
                a == b
            }
            (Constant::Pool(a), Constant::Pool(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Integer(value) => write!(f, "{value}"),
            Constant::Float(value) => write!(f, "{value}f"),
            Constant::Long(value) => write!(f, "{value}L"),
            Constant::Double(value) => write!(f, "{value}d"),
            Constant::String(value) => write!(f, "{value:?}"),
            Constant::Class(name) => write!(f, "{}.class", name.replace('/', ".")),
            Constant::Pool(index) => write!(f, "#{index}"),
        }
    }
}

/// A verification type of a stack-map frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationType {
    /// Unusable slot
    Top,
    /// `int` and the smaller integral types
    Integer,
    /// `float`
    Float,
    /// `double` (one entry, two slots)
    Double,
    /// `long` (one entry, two slots)
    Long,
    /// `null`
    Null,
    /// `this` inside a constructor before the super constructor ran
    UninitializedThis,
    /// An object of the given class (internal name or array descriptor)
    Object(String),
    /// The result of the `new` instruction at the label, not yet initialized
    Uninitialized(Label),
}

/// A stack-map frame in expanded form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Local variable types, one entry per value
    pub locals: Vec<VerificationType>,
    /// Operand stack types, bottom first
    pub stack: Vec<VerificationType>,
}

/// A single instruction or pseudo instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Position marker
    Label(Label),
    /// Source line of the following instructions
    LineNumber(u16),
    /// Stack-map frame at this position
    Frame(Frame),
    /// An instruction without operands
    Simple(Opcode),
    /// `bipush` / `sipush`
    Push {
        /// `Bipush` or `Sipush`
        opcode: Opcode,
        /// The pushed value
        value: i32,
    },
    /// `newarray` with the primitive array type code
    NewArray(u8),
    /// Local variable load/store and `ret`, always in the long form
    Var {
        /// `Iload`..`Aload`, `Istore`..`Astore` or `Ret`
        opcode: Opcode,
        /// Local variable index
        index: u16,
    },
    /// `iinc`
    Iinc {
        /// Local variable index
        index: u16,
        /// Increment
        delta: i16,
    },
    /// `new`, `anewarray`, `checkcast`, `instanceof`
    Type {
        /// The opcode
        opcode: Opcode,
        /// Internal class name or array descriptor
        class: String,
    },
    /// Field access
    Field {
        /// `Getstatic`, `Putstatic`, `Getfield` or `Putfield`
        opcode: Opcode,
        /// The accessed field
        member: MemberReference,
    },
    /// Method invocation
    Invoke {
        /// `Invokevirtual`, `Invokespecial`, `Invokestatic` or `Invokeinterface`
        opcode: Opcode,
        /// The invoked method
        member: MemberReference,
        /// True when the owner is an interface (`InterfaceMethodref`)
        interface: bool,
    },
    /// `invokedynamic`
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap: u16,
        /// Call site name
        name: String,
        /// Call site descriptor
        descriptor: String,
    },
    /// Conditional and unconditional branches, `jsr`
    Jump {
        /// The branch opcode
        opcode: Opcode,
        /// The branch target
        target: Label,
    },
    /// `ldc`, `ldc_w`, `ldc2_w`
    Ldc(Constant),
    /// `tableswitch`
    TableSwitch {
        /// Target when the key is outside `low..=high`
        default: Label,
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Targets for `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Target for unmatched keys
        default: Label,
        /// Sorted key/target pairs
        pairs: Vec<(i32, Label)>,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Array descriptor
        class: String,
        /// Number of dimensions taken from the stack
        dimensions: u8,
    },
}

impl Instruction {
    /// True for labels, line numbers and frames.
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        matches!(
            self,
            Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame(_)
        )
    }

    /// The shortest instruction pushing `constant`.
    #[must_use]
    pub fn literal(constant: &Constant) -> Instruction {
        match constant {
            Constant::Integer(value) => Self::int(*value),
            Constant::Long(0) => Instruction::Simple(Opcode::Lconst0),
            Constant::Long(1) => Instruction::Simple(Opcode::Lconst1),
            Constant::Float(value) if value.to_bits() == 0.0f32.to_bits() => {
                Instruction::Simple(Opcode::Fconst0)
            }
            Constant::Float(value) if *value == 1.0 => Instruction::Simple(Opcode::Fconst1),
            Constant::Float(value) if *value == 2.0 => Instruction::Simple(Opcode::Fconst2),
            Constant::Double(value) if value.to_bits() == 0.0f64.to_bits() => {
                Instruction::Simple(Opcode::Dconst0)
            }
            Constant::Double(value) if *value == 1.0 => Instruction::Simple(Opcode::Dconst1),
            other => Instruction::Ldc(other.clone()),
        }
    }

    /// The shortest instruction pushing an `int`.
    #[must_use]
    pub fn int(value: i32) -> Instruction {
        match value {
            -1 => Instruction::Simple(Opcode::IconstM1),
            0 => Instruction::Simple(Opcode::Iconst0),
            1 => Instruction::Simple(Opcode::Iconst1),
            2 => Instruction::Simple(Opcode::Iconst2),
            3 => Instruction::Simple(Opcode::Iconst3),
            4 => Instruction::Simple(Opcode::Iconst4),
            5 => Instruction::Simple(Opcode::Iconst5),
            v if i8::try_from(v).is_ok() => Instruction::Push {
                opcode: Opcode::Bipush,
                value: v,
            },
            v if i16::try_from(v).is_ok() => Instruction::Push {
                opcode: Opcode::Sipush,
                value: v,
            },
            v => Instruction::Ldc(Constant::Integer(v)),
        }
    }

    /// The constant pushed by a literal instruction, if this is one.
    ///
    /// `aconst_null` and `ldc` of method handles or dynamic constants are not literals.
    #[must_use]
    pub fn as_literal(&self) -> Option<Constant> {
        Some(match self {
            Instruction::Simple(opcode) => match opcode {
                Opcode::IconstM1 => Constant::Integer(-1),
                Opcode::Iconst0 => Constant::Integer(0),
                Opcode::Iconst1 => Constant::Integer(1),
                Opcode::Iconst2 => Constant::Integer(2),
                Opcode::Iconst3 => Constant::Integer(3),
                Opcode::Iconst4 => Constant::Integer(4),
                Opcode::Iconst5 => Constant::Integer(5),
                Opcode::Lconst0 => Constant::Long(0),
                Opcode::Lconst1 => Constant::Long(1),
                Opcode::Fconst0 => Constant::Float(0.0),
                Opcode::Fconst1 => Constant::Float(1.0),
                Opcode::Fconst2 => Constant::Float(2.0),
                Opcode::Dconst0 => Constant::Double(0.0),
                Opcode::Dconst1 => Constant::Double(1.0),
                _ => return None,
            },
            Instruction::Push { value, .. } => Constant::Integer(*value),
            Instruction::Ldc(Constant::Pool(_)) => return None,
            Instruction::Ldc(constant) => constant.clone(),
            _ => return None,
        })
    }

    /// The opcode of a real instruction, `None` for pseudo instructions.
    #[must_use]
    pub fn opcode(&self) -> Option<Opcode> {
        Some(match self {
            Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame(_) => {
                return None
            }
            Instruction::Simple(opcode)
            | Instruction::Push { opcode, .. }
            | Instruction::Var { opcode, .. }
            | Instruction::Type { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Invoke { opcode, .. }
            | Instruction::Jump { opcode, .. } => *opcode,
            Instruction::NewArray(_) => Opcode::Newarray,
            Instruction::Iinc { .. } => Opcode::Iinc,
            Instruction::InvokeDynamic { .. } => Opcode::Invokedynamic,
            Instruction::Ldc(constant) => match constant {
                Constant::Long(_) | Constant::Double(_) => Opcode::Ldc2W,
                _ => Opcode::Ldc,
            },
            Instruction::TableSwitch { .. } => Opcode::Tableswitch,
            Instruction::LookupSwitch { .. } => Opcode::Lookupswitch,
            Instruction::MultiANewArray { .. } => Opcode::Multianewarray,
        })
    }

    /// Operand stack effect in slots `(popped, pushed)`.
    ///
    /// Pseudo instructions have no effect. Returns `None` only for malformed descriptors.
    #[must_use]
    pub fn stack_effect(&self) -> Option<(u16, u16)> {
        use crate::classfile::descriptor::{FieldType, MethodDescriptor};

        Some(match self {
            Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame(_) => (0, 0),
            Instruction::Simple(opcode) => match opcode {
                Opcode::Pop => (1, 0),
                Opcode::Pop2 => (2, 0),
                Opcode::Dup => (1, 2),
                Opcode::DupX1 => (2, 3),
                Opcode::DupX2 => (3, 4),
                Opcode::Dup2 => (2, 4),
                Opcode::Dup2X1 => (3, 5),
                Opcode::Dup2X2 => (4, 6),
                Opcode::Swap => (2, 2),
                other => {
                    let (pop, push) = other.stack_effect()?;
                    (u16::from(pop), u16::from(push))
                }
            },
            Instruction::Ldc(constant) => (0, constant.slots()),
            Instruction::Field { opcode, member } => {
                let slots = FieldType::parse(&member.descriptor).ok()?.slots();
                match opcode {
                    Opcode::Getstatic => (0, slots),
                    Opcode::Putstatic => (slots, 0),
                    Opcode::Getfield => (1, slots),
                    _ => (slots + 1, 0),
                }
            }
            Instruction::Invoke { opcode, member, .. } => {
                let descriptor = MethodDescriptor::parse(&member.descriptor).ok()?;
                let receiver = u16::from(*opcode != Opcode::Invokestatic);
                (
                    descriptor.parameter_slots() + receiver,
                    descriptor.return_slots(),
                )
            }
            Instruction::InvokeDynamic { descriptor, .. } => {
                let descriptor = MethodDescriptor::parse(descriptor).ok()?;
                (descriptor.parameter_slots(), descriptor.return_slots())
            }
            Instruction::MultiANewArray { dimensions, .. } => (u16::from(*dimensions), 1),
            other => {
                let (pop, push) = other.opcode()?.stack_effect()?;
                (u16::from(pop), u16::from(push))
            }
        })
    }

    /// Labels this instruction may transfer control to.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instruction::Jump { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Instruction::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, label)| *label))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::LineNumber(line) => write!(f, "line {line}"),
            Instruction::Frame(frame) => {
                write!(f, "frame locals={} stack={}", frame.locals.len(), frame.stack.len())
            }
            Instruction::Simple(opcode) => write!(f, "{opcode}"),
            Instruction::Push { opcode, value } => write!(f, "{opcode} {value}"),
            Instruction::NewArray(kind) => write!(f, "newarray {kind}"),
            Instruction::Var { opcode, index } => write!(f, "{opcode} {index}"),
            Instruction::Iinc { index, delta } => write!(f, "iinc {index} {delta}"),
            Instruction::Type { opcode, class } => write!(f, "{opcode} {class}"),
            Instruction::Field { opcode, member } | Instruction::Invoke { opcode, member, .. } => {
                write!(f, "{opcode} {}.{}{}", member.owner, member.name, member.descriptor)
            }
            Instruction::InvokeDynamic {
                bootstrap,
                name,
                descriptor,
            } => write!(f, "invokedynamic #{bootstrap} {name}{descriptor}"),
            Instruction::Jump { opcode, target } => write!(f, "{opcode} {target}"),
            Instruction::Ldc(constant) => write!(f, "ldc {constant}"),
            Instruction::TableSwitch { low, high, .. } => write!(f, "tableswitch {low}..{high}"),
            Instruction::LookupSwitch { pairs, .. } => {
                write!(f, "lookupswitch ({} keys)", pairs.len())
            }
            Instruction::MultiANewArray { class, dimensions } => {
                write!(f, "multianewarray {class} {dimensions}")
            }
        }
    }
}

/// An exception handler range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// First protected instruction
    pub start: Label,
    /// End of the protected range (exclusive)
    pub end: Label,
    /// Handler entry
    pub handler: Label,
    /// Caught class, `None` for `finally` handlers
    pub catch_type: Option<String>,
}

/// A `LocalVariableTable` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Variable name
    pub name: String,
    /// Field descriptor of the variable
    pub descriptor: String,
    /// Start of the live range
    pub start: Label,
    /// End of the live range (exclusive)
    pub end: Label,
    /// Local variable slot
    pub index: u16,
}

/// A decoded method body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Code {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Instructions and pseudo instructions in program order
    pub instructions: Vec<Instruction>,
    /// Exception handlers in priority order
    pub try_catch: Vec<TryCatchBlock>,
    /// Local variable debug information
    pub locals: Vec<LocalVariable>,
    /// Set when the body was changed and must be re-encoded
    pub modified: bool,
    pub(crate) next_label: u32,
}

impl Code {
    /// Create an empty body.
    #[must_use]
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Code {
            max_stack,
            max_locals,
            modified: true,
            ..Code::default()
        }
    }

    pub(crate) fn with_label_counter(mut self, next_label: u32) -> Self {
        self.next_label = next_label;
        self
    }

    /// Allocate a fresh label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Labels that control can reach other than by falling through, or that other
    /// structures refer to: branch and switch targets, handler ranges and uninitialized
    /// frame entries.
    #[must_use]
    pub fn referenced_labels(&self) -> std::collections::HashSet<Label> {
        let mut labels = std::collections::HashSet::new();
        for instruction in &self.instructions {
            labels.extend(instruction.targets());
            if let Instruction::Frame(frame) = instruction {
                for vt in frame.locals.iter().chain(&frame.stack) {
                    if let VerificationType::Uninitialized(label) = vt {
                        labels.insert(*label);
                    }
                }
            }
        }
        for block in &self.try_catch {
            labels.insert(block.start);
            labels.insert(block.end);
            labels.insert(block.handler);
        }
        labels
    }

    /// Iterate over the real instructions, skipping pseudo instructions.
    pub fn real_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().filter(|i| !i.is_pseudo())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortest_int_literals() {
        assert_eq!(Instruction::int(3), Instruction::Simple(Opcode::Iconst3));
        assert_eq!(
            Instruction::int(-100),
            Instruction::Push {
                opcode: Opcode::Bipush,
                value: -100
            }
        );
        assert_eq!(
            Instruction::int(1000),
            Instruction::Push {
                opcode: Opcode::Sipush,
                value: 1000
            }
        );
        assert_eq!(
            Instruction::int(100_000),
            Instruction::Ldc(Constant::Integer(100_000))
        );
    }

    #[test]
    fn literal_round_trip() {
        for constant in [
            Constant::Integer(-1),
            Constant::Integer(40_000),
            Constant::Long(1),
            Constant::Long(7),
            Constant::Float(2.0),
            Constant::Float(-0.0),
            Constant::Double(0.0),
            Constant::Double(f64::NAN),
            Constant::String("x".into()),
        ] {
            assert_eq!(Instruction::literal(&constant).as_literal(), Some(constant));
        }
        assert_eq!(Instruction::Simple(Opcode::AconstNull).as_literal(), None);
    }

    #[test]
    fn negative_zero_is_not_fconst_0() {
        assert_eq!(
            Instruction::literal(&Constant::Float(-0.0)),
            Instruction::Ldc(Constant::Float(-0.0))
        );
    }

    #[test]
    fn referenced_labels_cover_handlers() {
        let mut code = Code::new(1, 1);
        let start = code.new_label();
        let end = code.new_label();
        let handler = code.new_label();
        let jump = code.new_label();
        code.instructions.push(Instruction::Jump {
            opcode: Opcode::Goto,
            target: jump,
        });
        code.try_catch.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: None,
        });
        let labels = code.referenced_labels();
        assert_eq!(labels.len(), 4);
    }
}
