//! Operand analysis of method bodies.
//!
//! The [`Analyzer`] walks a body once, in program order, simulating the operand stack
//! symbolically. Each stack slot is one of:
//!
//! | Slot | Meaning |
//! |------|---------|
//! | unknown | produced by code the analysis does not follow |
//! | uninitialized | the result of `new` (and its `dup`), awaiting its constructor |
//! | folded | a value computed ahead of time, with the instruction span producing it |
//!
//! Category-2 values take two slots, the upper one only marks the pair. A folded value
//! remembers its operands as children, so a failed fold can fall back to folding the operands
//! individually.
//!
//! # Blocks
//!
//! Referenced labels, branches, switches, returns and `athrow` end a block. At a block end
//! every folded value left on the stack is written back and the stack is forgotten; nothing
//! is tracked across blocks or through local variables.
//!
//! # Write-back
//!
//! A folded value that is consumed by anything other than another fold becomes a *root*: it
//! is replaced by a literal, or by reconstruction code from the
//! [`Deconstructor`](crate::folding::deconstruct::Deconstructor), as soon as it is consumed.
//! Operands whose mutable object was handed to an evaluation are *stale*: their value may no
//! longer be the one they produced, so they are never written back on their own.
//!
//! A value that was only read from a field is never reconstructed: it is replaced by a
//! literal or keeps its read, so object identity survives.
//!
//! # Shared state
//!
//! Objects read from fields are shared with the rest of the program. A mutable one (other
//! than an enumerator or an instance of a constant type) is never handed to an evaluation,
//! and a static final field assigned such an object is never resolved.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    classfile::{ClassFile, Code, FieldType, Instruction, MemberReference, MethodDescriptor, MethodNode, Opcode},
    config::RunConfiguration,
    emulation::{ClassUniverse, ExecutionContext, InvokeKind, Value},
    folding::{
        deconstruct::{cast_needed, Deconstructor},
        evaluator::{self, Failure},
        EventKind, EventLog,
    },
};

/// One span replacement within a method body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Replacement {
    /// First instruction of the replaced span.
    pub start: usize,
    /// Last instruction of the replaced span, inclusive.
    pub end: usize,
    /// The instructions pushing the value.
    pub code: Vec<Instruction>,
    /// Stack slots of the value.
    pub slots: u16,
}

/// An evaluated span: method, first and last instruction.
type Site = (MemberReference, usize, usize);

/// State carried over the passes of one run.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    /// Static final fields of primary classes that received a folded value.
    pub resolved: BTreeSet<MemberReference>,
    /// Outcome of every evaluation so far. Each pass starts from the original bodies, so a
    /// repeated pass meets the same sites and reuses the outcome instead of running the
    /// evaluation, and its side effects, again.
    evaluated: HashMap<Site, Result<(MemberReference, Value), Failure>>,
}

/// Assignment order of static fields inside a static initializer.
///
/// Outside of `<clinit>` every field is considered assigned. Inside, a field of the class
/// being initialized is only readable after its first `putstatic`, or when it carries a
/// `ConstantValue`.
#[derive(Debug, Default)]
pub(crate) struct InitOrder {
    class: Option<String>,
    first_put: HashMap<MemberReference, usize>,
    constant: HashSet<MemberReference>,
}

impl InitOrder {
    pub(crate) fn new(universe: &ClassUniverse, class: &ClassFile, method: &MethodNode, code: &Code) -> Self {
        if method.name != "<clinit>" {
            return InitOrder::default();
        }
        let mut first_put = HashMap::new();
        for (index, instruction) in code.instructions.iter().enumerate() {
            if let Instruction::Field {
                opcode: Opcode::Putstatic,
                member,
            } = instruction
            {
                first_put.entry(declaring_field(universe, member)).or_insert(index);
            }
        }
        let constant = class
            .fields
            .iter()
            .filter(|f| f.is_static() && f.constant_value.is_some())
            .map(|f| class.field_reference(f))
            .collect();
        InitOrder {
            class: Some(class.name.clone()),
            first_put,
            constant,
        }
    }

    /// True if reading `field` at `index` observes its assigned value.
    pub(crate) fn readable(&self, field: &MemberReference, index: usize) -> bool {
        match &self.class {
            Some(class) if *class == field.owner => {
                self.constant.contains(field) || self.first_put.get(field).is_some_and(|put| *put < index)
            }
            _ => true,
        }
    }

    /// True if `field` may be reused as an equal instance at `index`: it is readable and not
    /// declared by a subclass of the class being initialized.
    pub(crate) fn reusable(&self, field: &MemberReference, index: usize, universe: &ClassUniverse) -> bool {
        if !self.readable(field, index) {
            return false;
        }
        match &self.class {
            Some(class) => field.owner == *class || !universe.is_subtype(&field.owner, class),
            None => true,
        }
    }
}

/// A field reference rewritten to the class declaring it.
pub(crate) fn declaring_field(universe: &ClassUniverse, field: &MemberReference) -> MemberReference {
    match universe.resolve_field(&field.owner, &field.name, &field.descriptor) {
        Some(owner) => field.with_owner(owner),
        None => field.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Uninit {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Unknown,
    Upper,
    Uninit(Uninit),
    Known(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Unknown,
    Uninit(Uninit),
    Known(usize),
}

#[derive(Debug)]
struct Fold {
    start: usize,
    end: usize,
    value: Value,
    ty: FieldType,
    /// The folded field or invoked implementation, `None` for literals and casts.
    member: Option<MemberReference>,
    children: Vec<usize>,
    literal: bool,
    stale: bool,
    done: bool,
}

/// Folds one method body.
pub(crate) struct Analyzer<'a, 'u> {
    config: &'a RunConfiguration,
    ctx: &'a mut ExecutionContext<'u>,
    state: &'a mut RunState,
    log: &'a EventLog,
    pass: usize,
    class: &'a ClassFile,
    method: MemberReference,
    code: &'a Code,
    order: InitOrder,
    next_real: Vec<usize>,
    folds: Vec<Fold>,
    stack: Vec<Slot>,
    replacements: Vec<Replacement>,
}

impl<'a, 'u> Analyzer<'a, 'u> {
    /// An analyzer for `method` of `class`, which must have a decoded body.
    ///
    /// Fold events go to `log`. Static final fields of `class` that receive a folded value are
    /// added to the resolved fields of `state`, which is logged to the run's own event log.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: &'a RunConfiguration,
        ctx: &'a mut ExecutionContext<'u>,
        state: &'a mut RunState,
        log: &'a EventLog,
        pass: usize,
        class: &'a ClassFile,
        method: &'a MethodNode,
        code: &'a Code,
    ) -> Self {
        let order = InitOrder::new(config.universe(), class, method, code);
        let count = code.instructions.len();
        let mut next_real = vec![count; count + 1];
        for index in (0..count).rev() {
            next_real[index] = if code.instructions[index].is_pseudo() {
                next_real[index + 1]
            } else {
                index
            };
        }
        Analyzer {
            config,
            ctx,
            state,
            log,
            pass,
            class,
            method: class.method_reference(method),
            code,
            order,
            next_real,
            folds: Vec::new(),
            stack: Vec::new(),
            replacements: Vec::new(),
        }
    }

    /// Analyze the body and return the replacements, in the order they were decided.
    pub(crate) fn run(mut self) -> Vec<Replacement> {
        let code = self.code;
        let referenced = code.referenced_labels();
        for (index, instruction) in code.instructions.iter().enumerate() {
            match instruction {
                Instruction::Label(label) if referenced.contains(label) => self.boundary(),
                Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame(_) => {}
                _ => {
                    self.step(index, instruction);
                    let ends_block = matches!(
                        instruction,
                        Instruction::Jump { .. } | Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. }
                    ) || instruction.opcode().is_some_and(Opcode::is_unconditional_transfer);
                    if ends_block {
                        self.boundary();
                    }
                }
            }
        }
        self.boundary();
        self.replacements
    }

    fn step(&mut self, index: usize, instruction: &Instruction) {
        if let Some(constant) = instruction.as_literal() {
            match self.ctx.constant(&constant) {
                Ok(value) => {
                    let ty = evaluator::constant_type(&constant);
                    self.push_literal(index, value, ty);
                }
                Err(_) => self.generic(instruction),
            }
            return;
        }
        match instruction {
            Instruction::Simple(Opcode::AconstNull) => {
                self.push_literal(index, Value::Null, FieldType::Object("java/lang/Object".to_string()));
            }
            Instruction::Simple(Opcode::Dup) if matches!(self.stack.last(), Some(Slot::Uninit(_))) => {
                if let Some(Slot::Uninit(uninit)) = self.stack.pop() {
                    let copy = Uninit { end: index, ..uninit };
                    self.stack.push(Slot::Uninit(copy));
                    self.stack.push(Slot::Uninit(copy));
                }
            }
            Instruction::Type {
                opcode: Opcode::New,
                ..
            } => self.stack.push(Slot::Uninit(Uninit { start: index, end: index })),
            Instruction::Type {
                opcode: Opcode::Checkcast,
                class,
            } => self.check_cast(index, class),
            Instruction::Field { opcode, member } => match opcode {
                Opcode::Getstatic => self.get_static(index, member),
                Opcode::Getfield => self.get_field(index, member),
                Opcode::Putstatic => self.put_static(index, member),
                _ => self.generic(instruction),
            },
            Instruction::Invoke { opcode, member, .. } => self.invoke(index, instruction, *opcode, member),
            Instruction::InvokeDynamic {
                bootstrap, descriptor, ..
            } => self.invoke_dynamic(index, instruction, *bootstrap, descriptor),
            _ => self.generic(instruction),
        }
    }

    // Stack

    fn pop_slot(&mut self) -> Slot {
        self.stack.pop().unwrap_or(Slot::Unknown)
    }

    fn pop_operand(&mut self, slots: u16) -> Operand {
        if slots == 2 {
            let upper = self.pop_slot();
            let lower = self.pop_slot();
            if let (Slot::Known(id), Slot::Upper) = (lower, upper) {
                return Operand::Known(id);
            }
            self.discard(lower);
            self.discard(upper);
            return Operand::Unknown;
        }
        match self.pop_slot() {
            Slot::Known(id) => Operand::Known(id),
            Slot::Uninit(uninit) => Operand::Uninit(uninit),
            other => {
                self.discard(other);
                Operand::Unknown
            }
        }
    }

    /// Pop the arguments of a call, returned in parameter order.
    fn pop_arguments(&mut self, parameters: &[FieldType]) -> Vec<Operand> {
        let mut operands: Vec<Operand> = parameters
            .iter()
            .rev()
            .map(|parameter| self.pop_operand(parameter.slots()))
            .collect();
        operands.reverse();
        operands
    }

    fn discard(&mut self, slot: Slot) {
        if let Slot::Known(id) = slot {
            self.flush(id);
        }
    }

    fn push_unknown(&mut self, slots: u16) {
        for _ in 0..slots {
            self.stack.push(Slot::Unknown);
        }
    }

    fn push_fold(&mut self, fold: Fold) -> usize {
        let id = self.folds.len();
        let wide = fold.value.category() == 2;
        self.folds.push(fold);
        self.stack.push(Slot::Known(id));
        if wide {
            self.stack.push(Slot::Upper);
        }
        id
    }

    fn push_literal(&mut self, index: usize, value: Value, ty: FieldType) {
        self.push_fold(Fold {
            start: index,
            end: index,
            value,
            ty,
            member: None,
            children: Vec::new(),
            literal: true,
            stale: false,
            done: false,
        });
    }

    fn generic(&mut self, instruction: &Instruction) {
        let Some((popped, pushed)) = instruction.stack_effect() else {
            self.boundary();
            return;
        };
        for _ in 0..popped {
            let slot = self.pop_slot();
            self.discard(slot);
        }
        self.push_unknown(pushed);
    }

    fn boundary(&mut self) {
        let slots = std::mem::take(&mut self.stack);
        for slot in slots {
            self.discard(slot);
        }
    }

    /// True if the operand spans follow each other without gaps and end right before `index`.
    fn contiguous(&self, prefix_end: Option<usize>, operands: &[usize], index: usize) -> bool {
        let mut cursor = prefix_end.map(|end| self.next_real[end + 1]);
        for id in operands {
            let fold = &self.folds[*id];
            if cursor.is_some_and(|expected| expected != fold.start) {
                return false;
            }
            cursor = Some(self.next_real[fold.end + 1]);
        }
        cursor.map_or(true, |expected| expected == index)
    }

    fn known(operands: &[Operand]) -> Option<Vec<usize>> {
        operands
            .iter()
            .map(|operand| match operand {
                Operand::Known(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn release(&mut self, operands: &[Operand]) {
        for operand in operands {
            if let Operand::Known(id) = operand {
                self.flush(*id);
            }
        }
    }

    /// Mark operands holding mutable objects as stale after an evaluation consumed them.
    fn consume(&mut self, children: &[usize]) {
        for id in children {
            let mutable = self.folds[*id]
                .value
                .reference()
                .is_some_and(|r| self.ctx.heap().get(r).is_mutable());
            if mutable {
                self.folds[*id].stale = true;
            }
        }
    }

    /// True if `value` is an object whose state an evaluation could change: a mutable heap
    /// object that is neither an enumerator nor an instance of a constant type.
    fn has_state(&self, value: Value) -> bool {
        let Some(reference) = value.reference() else {
            return false;
        };
        if !self.ctx.heap().get(reference).is_mutable() {
            return false;
        }
        let Some(runtime) = self.ctx.runtime_class(value) else {
            return false;
        };
        let universe = self.config.universe();
        !universe.is_subtype(&runtime, "java/lang/Enum")
            && !self
                .config
                .constant_types()
                .iter()
                .any(|constant| universe.is_subtype(&runtime, constant))
    }

    /// True if the fold only reads a field: a `getstatic`, or a `getfield` or cast of a read.
    fn is_read(&self, id: usize) -> bool {
        let fold = &self.folds[id];
        if fold.literal {
            return false;
        }
        match &self.code.instructions[fold.end] {
            Instruction::Field {
                opcode: Opcode::Getstatic,
                ..
            } => true,
            Instruction::Field {
                opcode: Opcode::Getfield,
                ..
            }
            | Instruction::Type {
                opcode: Opcode::Checkcast,
                ..
            } => fold.children.iter().all(|child| self.is_read(*child)),
            _ => false,
        }
    }

    /// True if one of the operands is program state that an evaluation must not touch.
    fn touches_shared_state(&self, children: &[usize]) -> bool {
        children
            .iter()
            .any(|id| self.is_read(*id) && self.has_state(self.folds[*id].value))
    }

    /// Run an evaluation of the span `start..=end`, or reuse its outcome from an earlier pass.
    fn evaluate(
        &mut self,
        start: usize,
        end: usize,
        run: impl FnOnce(&mut ExecutionContext<'u>) -> Result<(MemberReference, Value), Failure>,
    ) -> Result<(MemberReference, Value), Failure> {
        let site = (self.method.clone(), start, end);
        if let Some(outcome) = self.state.evaluated.get(&site) {
            return outcome.clone();
        }
        let outcome = run(&mut *self.ctx);
        self.state.evaluated.insert(site, outcome.clone());
        outcome
    }

    // Candidates

    fn get_static(&mut self, index: usize, member: &MemberReference) {
        let Ok(ty) = FieldType::parse(&member.descriptor) else {
            self.push_unknown(1);
            return;
        };
        let declaring = declaring_field(self.config.universe(), member);
        let constant = self.config.is_constant_field(&declaring) || self.state.resolved.contains(&declaring);
        if !constant || !self.order.readable(&declaring, index) {
            self.push_unknown(ty.slots());
            return;
        }
        match evaluator::read_static(self.ctx, member) {
            Ok(value) => {
                self.push_fold(Fold {
                    start: index,
                    end: index,
                    value,
                    ty,
                    member: Some(declaring),
                    children: Vec::new(),
                    literal: false,
                    stale: false,
                    done: false,
                });
            }
            Err(failure) => {
                self.report(index, &declaring, failure);
                self.push_unknown(ty.slots());
            }
        }
    }

    fn get_field(&mut self, index: usize, member: &MemberReference) {
        let Ok(ty) = FieldType::parse(&member.descriptor) else {
            let receiver = self.pop_operand(1);
            self.release(&[receiver]);
            self.push_unknown(1);
            return;
        };
        let receiver = self.pop_operand(1);
        let declaring = declaring_field(self.config.universe(), member);
        let candidate = match receiver {
            Operand::Known(id) if self.config.is_constant_field(&declaring) && self.contiguous(None, &[id], index) => id,
            _ => {
                self.release(&[receiver]);
                self.push_unknown(ty.slots());
                return;
            }
        };
        let value = self.folds[candidate].value;
        match evaluator::read_field(self.ctx, value, member) {
            Ok(result) => {
                let start = self.folds[candidate].start;
                self.push_fold(Fold {
                    start,
                    end: index,
                    value: result,
                    ty,
                    member: Some(declaring),
                    children: vec![candidate],
                    literal: false,
                    stale: false,
                    done: false,
                });
            }
            Err(failure) => {
                self.report(index, &declaring, failure);
                self.flush(candidate);
                self.push_unknown(ty.slots());
            }
        }
    }

    fn put_static(&mut self, index: usize, member: &MemberReference) {
        let slots = FieldType::parse(&member.descriptor).map_or(1, |t| t.slots());
        let operand = self.pop_operand(slots);
        if let Operand::Known(id) = operand {
            let declaring = declaring_field(self.config.universe(), member);
            let own_final = declaring.owner == self.class.name
                && self
                    .class
                    .find_field(&declaring.name, &declaring.descriptor)
                    .is_some_and(|f| f.is_static_final());
            let value = self.folds[id].value;
            if own_final && !self.has_state(value) && self.state.resolved.insert(declaring.clone()) {
                self.config
                    .events()
                    .record(EventKind::FieldResolved)
                    .at(self.method.clone(), index)
                    .member(declaring.clone())
                    .pass(self.pass)
                    .message(format!(
                        "{declaring} = {}",
                        evaluator::render(self.ctx, value)
                    ));
            }
        }
        self.release(&[operand]);
    }

    fn check_cast(&mut self, index: usize, class: &str) {
        let operand = self.pop_operand(1);
        let Operand::Known(id) = operand else {
            self.release(&[operand]);
            self.push_unknown(1);
            return;
        };
        let value = self.folds[id].value;
        let passes = match value {
            Value::Null => true,
            Value::Ref(_) => self
                .ctx
                .runtime_class(value)
                .is_some_and(|runtime| self.config.universe().is_subtype(&runtime, class)),
            _ => false,
        };
        if !passes || !self.contiguous(None, &[id], index) {
            self.flush(id);
            self.push_unknown(1);
            return;
        }
        let start = self.folds[id].start;
        self.push_fold(Fold {
            start,
            end: index,
            value,
            ty: evaluator::reference_type(class),
            member: None,
            children: vec![id],
            literal: false,
            stale: false,
            done: false,
        });
    }

    fn invoke(&mut self, index: usize, instruction: &Instruction, opcode: Opcode, member: &MemberReference) {
        let (Some(kind), Ok(descriptor)) = (InvokeKind::from_opcode(opcode), MethodDescriptor::parse(&member.descriptor)) else {
            self.generic(instruction);
            return;
        };

        let operands = self.pop_arguments(&descriptor.parameters);
        let receiver = kind.has_receiver().then(|| self.pop_operand(1));

        if member.is_constructor() && kind == InvokeKind::Special {
            match receiver {
                Some(Operand::Uninit(uninit)) => self.construct(index, member, uninit, &operands),
                other => {
                    self.release(&operands);
                    if let Some(receiver) = other {
                        self.release(&[receiver]);
                    }
                }
            }
            return;
        }

        let Some(return_type) = descriptor.return_type else {
            self.release(&operands);
            if let Some(receiver) = receiver {
                self.release(&[receiver]);
            }
            return;
        };
        let slots = return_type.slots();

        let mut all = Vec::with_capacity(operands.len() + 1);
        all.extend(receiver);
        all.extend(operands);
        let Some(children) = Self::known(&all)
            .filter(|ids| self.contiguous(None, ids, index) && !self.touches_shared_state(ids))
        else {
            self.release(&all);
            self.push_unknown(slots);
            return;
        };

        let values: Vec<Value> = children.iter().map(|id| self.folds[*id].value).collect();
        let start = children.first().map_or(index, |id| self.folds[*id].start);
        let config = self.config;
        match self.evaluate(start, index, |ctx| evaluator::invoke(config, ctx, kind, member, values)) {
            Ok((implementation, value)) => {
                self.consume(&children);
                self.push_fold(Fold {
                    start,
                    end: index,
                    value,
                    ty: return_type,
                    member: Some(implementation),
                    children,
                    literal: false,
                    stale: false,
                    done: false,
                });
            }
            Err(failure) => {
                self.report(index, member, failure);
                self.release(&all);
                self.push_unknown(slots);
            }
        }
    }

    fn construct(&mut self, index: usize, member: &MemberReference, uninit: Uninit, operands: &[Operand]) {
        let still_used = self.stack.contains(&Slot::Uninit(uninit));
        let children = Self::known(operands)
            .filter(|ids| self.contiguous(Some(uninit.end), ids, index) && !self.touches_shared_state(ids));
        let (Some(children), true) = (children, still_used) else {
            self.release(operands);
            self.replace_uninit(uninit, Slot::Unknown);
            return;
        };

        let values: Vec<Value> = children.iter().map(|id| self.folds[*id].value).collect();
        let config = self.config;
        let outcome = self.evaluate(uninit.start, index, |ctx| {
            evaluator::invoke(config, ctx, InvokeKind::Special, member, values)
        });
        match outcome {
            Ok((implementation, value)) => {
                self.consume(&children);
                let id = self.folds.len();
                self.folds.push(Fold {
                    start: uninit.start,
                    end: index,
                    value,
                    ty: FieldType::Object(member.owner.clone()),
                    member: Some(implementation),
                    children,
                    literal: false,
                    stale: false,
                    done: false,
                });
                // At most one copy may carry the fold, or the span would be written back twice.
                let mut first = true;
                for slot in self.stack.iter_mut().rev() {
                    if *slot == Slot::Uninit(uninit) {
                        *slot = if first { Slot::Known(id) } else { Slot::Unknown };
                        first = false;
                    }
                }
            }
            Err(failure) => {
                self.report(index, member, failure);
                self.release(operands);
                self.replace_uninit(uninit, Slot::Unknown);
            }
        }
    }

    fn replace_uninit(&mut self, uninit: Uninit, with: Slot) {
        for slot in &mut self.stack {
            if *slot == Slot::Uninit(uninit) {
                *slot = with;
            }
        }
    }

    fn invoke_dynamic(&mut self, index: usize, instruction: &Instruction, bootstrap: u16, descriptor: &str) {
        let Ok(parsed) = MethodDescriptor::parse(descriptor) else {
            self.generic(instruction);
            return;
        };
        if !self.config.fold_string_concat() {
            self.generic(instruction);
            return;
        }

        let operands = self.pop_arguments(&parsed.parameters);
        let slots = parsed.return_type.as_ref().map_or(0, FieldType::slots);

        let Some(children) = Self::known(&operands)
            .filter(|ids| self.contiguous(None, ids, index) && !self.touches_shared_state(ids))
        else {
            self.release(&operands);
            self.push_unknown(slots);
            return;
        };
        let values: Vec<Value> = children.iter().map(|id| self.folds[*id].value).collect();
        let site = evaluator::concat_site();
        let start = children.first().map_or(index, |id| self.folds[*id].start);
        let class = self.class;
        let outcome = self.evaluate(start, index, |ctx| {
            match evaluator::concat(ctx, class, bootstrap, &parsed.parameters, &values) {
                Ok(Some(value)) => Ok((evaluator::concat_site(), value)),
                Ok(None) => Err(Failure::NotConstant),
                Err(failure) => Err(failure),
            }
        });
        match outcome {
            Ok((_, value)) => {
                self.consume(&children);
                self.push_fold(Fold {
                    start,
                    end: index,
                    value,
                    ty: FieldType::Object("java/lang/String".to_string()),
                    member: Some(site),
                    children,
                    literal: false,
                    stale: false,
                    done: false,
                });
            }
            Err(failure) => {
                self.report(index, &site, failure);
                self.release(&operands);
                self.push_unknown(slots);
            }
        }
    }

    // Write-back

    fn report(&self, index: usize, member: &MemberReference, failure: Failure) {
        match failure {
            Failure::NotConstant => {}
            Failure::Rejected(implementation) => {
                self.log
                    .record(EventKind::FoldSkipped)
                    .at(self.method.clone(), index)
                    .member(implementation.clone())
                    .pass(self.pass)
                    .message(format!("predicate of {implementation} rejected the call"));
            }
            Failure::Inaccessible(missing, cause) => {
                self.log
                    .record(EventKind::MemberInaccessible)
                    .at(self.method.clone(), index)
                    .member(missing)
                    .pass(self.pass)
                    .message(cause);
            }
            Failure::Failed(message) => {
                self.log
                    .record(EventKind::FoldSkipped)
                    .at(self.method.clone(), index)
                    .member(member.clone())
                    .pass(self.pass)
                    .message(message);
            }
        }
    }

    /// Write back a consumed fold, falling back to its operands when it cannot be written.
    fn flush(&mut self, id: usize) {
        if self.folds[id].done {
            return;
        }
        self.folds[id].done = true;

        let fold = &self.folds[id];
        if fold.literal {
            return;
        }
        if !fold.stale {
            match self.write_back(id) {
                Ok(()) => return,
                Err(reason) => {
                    let fold = &self.folds[id];
                    if let Some(member) = &fold.member {
                        self.log
                            .record(EventKind::FoldSkipped)
                            .at(self.method.clone(), fold.start)
                            .member(member.clone())
                            .pass(self.pass)
                            .message(reason);
                    }
                }
            }
        }
        let children = self.folds[id].children.clone();
        for child in children {
            self.flush(child);
        }
    }

    fn write_back(&mut self, id: usize) -> Result<(), String> {
        let fold = &self.folds[id];
        let (start, end, value) = (fold.start, fold.end, fold.value);

        let (code, kind, recipe) = match evaluator::literal(self.ctx, value) {
            Some(code) => (code, EventKind::ConstantFolded, None),
            // The read stays, a reconstruction would yield a different object.
            None if self.is_read(id) => return Ok(()),
            None => {
                let mut deconstructor = Deconstructor::new(self.config, &self.order, start);
                let reconstruction = deconstructor.reconstruct(self.ctx, value)?;
                let mut code = reconstruction.code;
                if let Some(cast) = cast_needed(self.config.universe(), &reconstruction.produces, &self.folds[id].ty) {
                    code.push(Instruction::Type {
                        opcode: Opcode::Checkcast,
                        class: cast,
                    });
                }
                (code, EventKind::InstanceDeconstructed, Some(reconstruction.recipe))
            }
        };

        let original: Vec<&Instruction> = self.code.instructions[start..=end]
            .iter()
            .filter(|i| !i.is_pseudo())
            .collect();
        if original.len() == code.len() && original.iter().zip(&code).all(|(a, b)| *a == b) {
            return Ok(());
        }

        let fold = &self.folds[id];
        let rendered = evaluator::render(self.ctx, value);
        let message = match (&fold.member, recipe) {
            (Some(member), Some(recipe)) => format!("{member} -> {rendered} via {recipe}"),
            (Some(member), None) => format!("{member} -> {rendered}"),
            (None, Some(recipe)) => format!("{rendered} via {recipe}"),
            (None, None) => rendered,
        };
        let mut event = self.log.record(kind).at(self.method.clone(), start).pass(self.pass).message(message);
        if let Some(member) = &fold.member {
            event = event.member(member.clone());
        }
        drop(event);

        self.replacements.push(Replacement {
            start,
            end,
            code,
            slots: value.category(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        classfile::{AccessFlags, ClassBuilder, Opcode},
        config::{BytesInput, CollectingSink, CONSTANT},
        emulation::{EmulationLimits, HeapObject},
    };

    const STATIC: AccessFlags = AccessFlags::PUBLIC.union(AccessFlags::STATIC);
    const STATIC_FINAL: AccessFlags = STATIC.union(AccessFlags::FINAL);

    const BUILDER: &str = "java/lang/StringBuilder";

    fn boxed() -> MemberReference {
        MemberReference::new("demo/Sample", "BOXED", "Ljava/lang/Integer;")
    }

    fn shared() -> MemberReference {
        MemberReference::new("demo/Sample", "SB", "Ljava/lang/StringBuilder;")
    }

    fn made() -> MemberReference {
        MemberReference::new("demo/Tally", "made", "I")
    }

    fn config() -> RunConfiguration {
        let sample = ClassBuilder::new("demo/Sample")
            .field(STATIC_FINAL, "BOXED", "Ljava/lang/Integer;")
            .field(STATIC_FINAL, "SB", "Ljava/lang/StringBuilder;")
            .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
                m.int(1000)
                    .invokestatic("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;")
                    .putstatic("demo/Sample", "BOXED", "Ljava/lang/Integer;")
                    .new_object(BUILDER)
                    .op(Opcode::Dup)
                    .invokespecial(BUILDER, "<init>", "()V")
                    .putstatic("demo/Sample", "SB", "Ljava/lang/StringBuilder;")
                    .op(Opcode::Return)
            })
            .method(STATIC, "boxed", "()Ljava/lang/Object;", |m| {
                m.getstatic("demo/Sample", "BOXED", "Ljava/lang/Integer;").op(Opcode::Areturn)
            })
            .method(STATIC, "append", "()Ljava/lang/String;", |m| {
                m.getstatic("demo/Sample", "SB", "Ljava/lang/StringBuilder;")
                    .string("x")
                    .invokevirtual(BUILDER, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
                    .invokevirtual(BUILDER, "toString", "()Ljava/lang/String;")
                    .op(Opcode::Areturn)
            })
            .method(STATIC, "fallback", "()Ljava/lang/Object;", |m| {
                m.new_object(BUILDER)
                    .op(Opcode::Dup)
                    .invokespecial(BUILDER, "<init>", "()V")
                    .string("7")
                    .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
                    .invokevirtual(BUILDER, "append", "(I)Ljava/lang/StringBuilder;")
                    .op(Opcode::Areturn)
            })
            .method(STATIC, "tally", "()Ljava/lang/Object;", |m| {
                m.new_object("demo/Tally")
                    .op(Opcode::Dup)
                    .op(Opcode::Iconst1)
                    .invokespecial("demo/Tally", "<init>", "(I)V")
                    .op(Opcode::Areturn)
            })
            .build()
            .unwrap();
        // Every constructed tally bumps a static counter.
        let tally = ClassBuilder::new("demo/Tally")
            .field(STATIC, "made", "I")
            .method(AccessFlags::PUBLIC, "<init>", "(I)V", |m| {
                m.annotate(CONSTANT)
                    .load(Opcode::Aload, 0)
                    .invokespecial("java/lang/Object", "<init>", "()V")
                    .getstatic("demo/Tally", "made", "I")
                    .op(Opcode::Iconst1)
                    .op(Opcode::Iadd)
                    .putstatic("demo/Tally", "made", "I")
                    .op(Opcode::Return)
            })
            .build()
            .unwrap();

        RunConfiguration::builder()
            .input(BytesInput::for_class("demo/Sample", sample.to_bytes().unwrap()))
            .input(BytesInput::for_class("demo/Tally", tally.to_bytes().unwrap()))
            .platform_defaults()
            .constant_field(shared())
            .output_sink(Arc::new(CollectingSink::new()))
            .build()
            .unwrap()
    }

    fn analyze(
        config: &RunConfiguration,
        ctx: &mut ExecutionContext<'_>,
        state: &mut RunState,
        log: &EventLog,
        name: &str,
    ) -> Vec<Replacement> {
        let class = config.universe().get("demo/Sample").unwrap().full().unwrap();
        let method = class.methods.iter().find(|m| m.name == name).unwrap();
        let code = method.code.as_ref().unwrap();
        Analyzer::new(config, ctx, state, log, 1, &class, method, code).run()
    }

    #[test]
    fn field_read_keeps_its_instruction() {
        let config = config();
        let mut ctx = ExecutionContext::new(config.universe(), EmulationLimits::default());
        let mut state = RunState::default();
        let log = EventLog::new();

        analyze(&config, &mut ctx, &mut state, &log, "<clinit>");
        assert!(state.resolved.contains(&boxed()));
        assert!(!state.resolved.contains(&shared()));

        // Integer.valueOf(1000) would be a different box than the one in the field.
        assert!(analyze(&config, &mut ctx, &mut state, &log, "boxed").is_empty());
    }

    #[test]
    fn shared_builder_is_not_evaluated() {
        let config = config();
        let mut ctx = ExecutionContext::new(config.universe(), EmulationLimits::default());
        let mut state = RunState::default();
        let log = EventLog::new();

        analyze(&config, &mut ctx, &mut state, &log, "<clinit>");
        assert!(analyze(&config, &mut ctx, &mut state, &log, "append").is_empty());
        assert!(analyze(&config, &mut ctx, &mut state, &log, "append").is_empty());

        let builder = ctx.get_static(&shared()).unwrap();
        let untouched = builder
            .reference()
            .is_some_and(|r| matches!(ctx.heap().get(r), HeapObject::StringBuilder(units) if units.is_empty()));
        assert!(untouched);
    }

    #[test]
    fn failed_write_back_falls_back_to_operands() {
        let config = config();
        let mut ctx = ExecutionContext::new(config.universe(), EmulationLimits::default());
        let mut state = RunState::default();
        let log = EventLog::new();

        let replacements = analyze(&config, &mut ctx, &mut state, &log, "fallback");
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements[0].code, vec![Instruction::int(7)]);
        assert_eq!(replacements[0].slots, 1);
        assert!(log
            .filter_kind(EventKind::FoldSkipped)
            .any(|e| e.message.contains("no recipe for java.lang.StringBuilder")));
    }

    #[test]
    fn repeated_analysis_reuses_evaluations() {
        let config = config();
        let mut ctx = ExecutionContext::new(config.universe(), EmulationLimits::default());
        let mut state = RunState::default();

        let first = analyze(&config, &mut ctx, &mut state, &EventLog::new(), "tally");
        let second = analyze(&config, &mut ctx, &mut state, &EventLog::new(), "tally");
        assert_eq!(first, second);
        assert_eq!(state.evaluated.len(), 1);
        assert_eq!(ctx.get_static(&made()).unwrap(), Value::Int(1));
    }

    #[test]
    fn static_initializer_order() {
        let config = config();
        let class = config.universe().get("demo/Sample").unwrap().full().unwrap();
        let clinit = class.find_method("<clinit>", "()V").unwrap();
        let order = InitOrder::new(config.universe(), &class, clinit, clinit.code.as_ref().unwrap());

        let put = clinit
            .code
            .as_ref()
            .unwrap()
            .instructions
            .iter()
            .position(|i| matches!(i, Instruction::Field { opcode: Opcode::Putstatic, member } if *member == boxed()))
            .unwrap();
        assert!(!order.readable(&boxed(), put));
        assert!(order.readable(&boxed(), put + 1));
        assert!(!order.readable(&shared(), put + 1));
        assert!(order.readable(&made(), 0));
    }
}
