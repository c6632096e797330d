//! Execution context of a folding run.
//!
//! [`ExecutionContext`] owns all mutable emulator state of one run: the [`Heap`], static field
//! storage, class initialization states, decoded method bodies, and the memo cache. It is
//! created once per run, passed by `&mut` into every evaluation, and dropped with the run.
//! There is no global state: two contexts over the same universe are fully independent.
//!
//! # Class initialization
//!
//! Classes are initialized on first active use (`new`, static field access, static call),
//! following the JVM rules: the superclass is initialized first, static fields receive their
//! `ConstantValue` or default value, then `<clinit>` runs, exactly once. A class whose
//! initializer throws is marked failed; the first failure surfaces as
//! `ExceptionInInitializerError`, every later use as `NoClassDefFoundError`. Recursive
//! initialization from within `<clinit>` sees the partially initialized class, as on the JVM.
//!
//! # Dispatch
//!
//! Calls resolve against the [`ClassUniverse`] first. Where resolution reaches a platform
//! class, the [`NativeRegistry`] supplies the implementation. Virtual calls select the
//! implementation from the receiver's runtime class.
//!
//! # Memoization
//!
//! [`ExecutionContext::invoke_memoized`] caches results per invoked member and argument list
//! when every argument is an immutable value (primitive, string, boxed primitive, class
//! object). Thrown exceptions are cached like results.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    classfile::{
        ClassFile, Code, Constant, FieldType, Instruction, Label, MemberReference, MethodDescriptor,
        Opcode,
    },
    emulation::{
        heap::{Heap, HeapObject, HeapRef},
        interpreter,
        loader::{is_platform_type, ClassUniverse},
        runtime::{NativeFn, NativeRegistry},
        value::Value,
        EmulationError,
    },
};

/// Limits that bound a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulationLimits {
    /// Maximum nesting of calls before `StackOverflowError` is thrown.
    pub max_call_depth: usize,
    /// Maximum number of bytecode instructions per evaluation, unlimited if `None`.
    pub max_instructions: Option<u64>,
}

impl Default for EmulationLimits {
    fn default() -> Self {
        EmulationLimits {
            max_call_depth: 512,
            max_instructions: None,
        }
    }
}

/// How a method is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// `invokestatic`
    Static,
    /// `invokespecial`: constructors, private and `super` calls
    Special,
    /// `invokevirtual`
    Virtual,
    /// `invokeinterface`
    Interface,
}

impl InvokeKind {
    /// The kind of an invoke opcode.
    #[must_use]
    pub fn from_opcode(opcode: Opcode) -> Option<InvokeKind> {
        match opcode {
            Opcode::Invokestatic => Some(InvokeKind::Static),
            Opcode::Invokespecial => Some(InvokeKind::Special),
            Opcode::Invokevirtual => Some(InvokeKind::Virtual),
            Opcode::Invokeinterface => Some(InvokeKind::Interface),
            _ => None,
        }
    }

    /// True for calls that take a receiver.
    #[must_use]
    pub fn has_receiver(self) -> bool {
        self != InvokeKind::Static
    }
}

/// The implementation a call resolves to.
#[derive(Debug, Clone)]
pub enum Target {
    /// Bytecode of a universe class
    Bytecode(MemberReference),
    /// A native implementation of a platform method
    Native(MemberReference, NativeFn),
}

impl Target {
    /// The implementing member.
    #[must_use]
    pub fn member(&self) -> &MemberReference {
        match self {
            Target::Bytecode(member) | Target::Native(member, _) => member,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    InProgress,
    Done,
    Failed,
}

/// An exception handler with its range resolved to instruction indices.
#[derive(Debug, Clone)]
pub(crate) struct Handler {
    pub start: usize,
    pub end: usize,
    pub target: usize,
    pub catch_type: Option<String>,
}

/// A decoded method body ready for execution.
#[derive(Debug)]
pub(crate) struct PreparedMethod {
    pub member: MemberReference,
    pub class: Arc<ClassFile>,
    pub code: Code,
    pub is_static: bool,
    pub labels: HashMap<Label, usize>,
    pub handlers: Vec<Handler>,
}

impl PreparedMethod {
    pub fn target(&self, label: Label) -> Result<usize, EmulationError> {
        self.labels
            .get(&label)
            .copied()
            .ok_or_else(|| EmulationError::InvalidControlFlow(format!("unknown label {label}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    Null,
    String(Vec<u16>),
    Boxed(&'static str, u64),
    Class(String),
}

type MemoKey = (InvokeKind, MemberReference, Vec<ValueKey>);

/// Mutable emulator state of one folding run.
#[derive(Debug)]
pub struct ExecutionContext<'u> {
    universe: &'u ClassUniverse,
    natives: NativeRegistry,
    heap: Heap,
    statics: HashMap<MemberReference, Value>,
    init: HashMap<String, InitState>,
    methods: HashMap<MemberReference, Arc<PreparedMethod>>,
    memo: HashMap<MemoKey, Result<Option<Value>, HeapRef>>,
    limits: EmulationLimits,
    depth: usize,
    executed: u64,
}

impl<'u> ExecutionContext<'u> {
    /// Create a context over a universe with the platform natives.
    #[must_use]
    pub fn new(universe: &'u ClassUniverse, limits: EmulationLimits) -> Self {
        ExecutionContext {
            universe,
            natives: NativeRegistry::platform(),
            heap: Heap::new(),
            statics: HashMap::new(),
            init: HashMap::new(),
            methods: HashMap::new(),
            memo: HashMap::new(),
            limits,
            depth: 0,
            executed: 0,
        }
    }

    /// The class universe.
    #[must_use]
    pub fn universe(&self) -> &'u ClassUniverse {
        self.universe
    }

    /// The native runtime.
    #[must_use]
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// The heap.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable access to the heap.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The limits of this context.
    #[must_use]
    pub fn limits(&self) -> EmulationLimits {
        self.limits
    }

    /// Reset the per-evaluation instruction budget. Called before each top-level evaluation.
    pub fn begin_evaluation(&mut self) {
        self.executed = 0;
    }

    pub(crate) fn tick(&mut self) -> Result<(), EmulationError> {
        self.executed += 1;
        match self.limits.max_instructions {
            Some(limit) if self.executed > limit => Err(EmulationError::InstructionLimit(limit)),
            _ => Ok(()),
        }
    }

    // Values

    /// An interned string literal.
    pub fn intern(&mut self, text: &str) -> Value {
        Value::Ref(self.heap.intern(text.encode_utf16().collect()))
    }

    /// A fresh string object.
    pub fn new_string(&mut self, units: Vec<u16>) -> Value {
        Value::Ref(self.heap.new_string(units))
    }

    /// A fresh string object from Rust text.
    pub fn new_str(&mut self, text: &str) -> Value {
        self.new_string(text.encode_utf16().collect())
    }

    /// The class object of a type given by internal name, array descriptor or primitive
    /// keyword (`int`).
    pub fn class_object(&mut self, name: &str) -> Value {
        Value::Ref(self.heap.class_object(name))
    }

    /// The value of a loadable constant.
    ///
    /// # Errors
    /// Returns [`EmulationError::Unsupported`] for method handles and dynamic constants.
    pub fn constant(&mut self, constant: &Constant) -> Result<Value, EmulationError> {
        Ok(match constant {
            Constant::Integer(v) => Value::Int(*v),
            Constant::Float(v) => Value::Float(*v),
            Constant::Long(v) => Value::Long(*v),
            Constant::Double(v) => Value::Double(*v),
            Constant::String(text) => self.intern(text),
            Constant::Class(name) => self.class_object(name),
            Constant::Pool(index) => {
                return Err(EmulationError::Unsupported(format!(
                    "ldc of constant pool entry {index}"
                )))
            }
        })
    }

    /// The Rust text of a string value, `None` for null, non-strings and unpaired surrogates.
    #[must_use]
    pub fn string_value(&self, value: Value) -> Option<String> {
        self.heap.string(value.reference()?)
    }

    /// The internal name of the runtime class of a reference, `None` for null and primitives.
    #[must_use]
    pub fn runtime_class(&self, value: Value) -> Option<String> {
        value.reference().map(|r| self.heap.get(r).class_name())
    }

    /// True if `value` is a non-null instance of `class`.
    #[must_use]
    pub fn is_instance(&self, value: Value, class: &str) -> bool {
        self.runtime_class(value)
            .is_some_and(|runtime| self.universe.is_subtype(&runtime, class))
    }

    /// The UTF-16 content of a string argument.
    ///
    /// # Errors
    /// Throws `NullPointerException` for null.
    pub fn string_units(&mut self, value: Value) -> Result<Vec<u16>, EmulationError> {
        match value {
            Value::Null => Err(self.throw_new(
                "java/lang/NullPointerException",
                Some("Cannot invoke String method on null"),
            )),
            Value::Ref(r) => match self.heap.get(r) {
                HeapObject::String(units) => Ok(units.clone()),
                other => Err(EmulationError::TypeMismatch {
                    expected: "java/lang/String",
                    found: if matches!(other, HeapObject::StringBuilder(_)) {
                        "java/lang/StringBuilder"
                    } else {
                        "object"
                    },
                }),
            },
            other => Err(EmulationError::type_mismatch("reference", &other)),
        }
    }

    /// The characters of a `CharSequence` argument (string or string builder).
    ///
    /// # Errors
    /// Throws `NullPointerException` for null; other sequences go through `toString()`.
    pub fn char_sequence(&mut self, value: Value) -> Result<Vec<u16>, EmulationError> {
        if let Value::Ref(r) = value {
            if let HeapObject::StringBuilder(units) = self.heap.get(r) {
                return Ok(units.clone());
            }
            if !matches!(self.heap.get(r), HeapObject::String(_)) {
                let text = self.to_java_string(value, &FieldType::Object("java/lang/Object".into()))?;
                return Ok(text);
            }
        }
        self.string_units(value)
    }

    /// `String.valueOf` of a value of the given static type.
    ///
    /// # Errors
    /// Propagates failures of a `toString()` call.
    pub fn to_java_string(
        &mut self,
        value: Value,
        declared: &FieldType,
    ) -> Result<Vec<u16>, EmulationError> {
        use crate::emulation::runtime::{double_to_string, float_to_string};

        let text = match (value, declared) {
            (Value::Int(v), FieldType::Boolean) => (if v != 0 { "true" } else { "false" }).to_string(),
            (Value::Int(v), FieldType::Char) => return Ok(vec![v as u16]),
            (Value::Int(v), _) => v.to_string(),
            (Value::Long(v), _) => v.to_string(),
            (Value::Float(v), _) => float_to_string(v),
            (Value::Double(v), _) => double_to_string(v),
            (Value::Null, _) => "null".to_string(),
            (Value::Ref(r), _) => {
                if let HeapObject::String(units) = self.heap.get(r) {
                    return Ok(units.clone());
                }
                let member = MemberReference::new("java/lang/Object", "toString", "()Ljava/lang/String;");
                let result = self.invoke(InvokeKind::Virtual, &member, vec![value])?;
                return match result {
                    Some(Value::Ref(s)) => Ok(self.heap.string_units(s).map(<[u16]>::to_vec).unwrap_or_default()),
                    _ => Ok("null".encode_utf16().collect()),
                };
            }
        };
        Ok(text.encode_utf16().collect())
    }

    // Exceptions

    /// Allocate a platform throwable and return it as a thrown error.
    pub fn throw_new(&mut self, class: &str, message: Option<&str>) -> EmulationError {
        let mut fields = BTreeMap::new();
        if let Some(message) = message {
            let text = self.new_str(message);
            fields.insert(throwable_message(), text);
        }
        let reference = self.heap.alloc(HeapObject::Instance {
            class: class.to_string(),
            fields,
        });
        EmulationError::Thrown(reference)
    }

    /// Human-readable form of a throwable: class, message and cause chain.
    #[must_use]
    pub fn describe_throwable(&self, throwable: HeapRef) -> String {
        let mut out = String::new();
        let mut current = Some(throwable);
        let mut depth = 0;
        while let Some(reference) = current {
            if depth > 0 {
                out.push_str(" caused by ");
            }
            let object = self.heap.get(reference);
            out.push_str(&object.class_name().replace('/', "."));
            current = None;
            if let HeapObject::Instance { fields, .. } = object {
                if let Some(message) = fields
                    .get(&throwable_message())
                    .and_then(|m| self.string_value(*m))
                {
                    out.push_str(": ");
                    out.push_str(&message);
                }
                current = fields.get(&throwable_cause()).and_then(Value::reference);
                if current == Some(reference) {
                    current = None;
                }
            }
            depth += 1;
            if depth > 8 {
                break;
            }
        }
        out
    }

    /// Describe an emulation error for the event log.
    #[must_use]
    pub fn describe_error(&self, error: &EmulationError) -> String {
        match error {
            EmulationError::Thrown(reference) => {
                format!("threw {}", self.describe_throwable(*reference))
            }
            other => other.to_string(),
        }
    }

    // Classes and fields

    /// Initialize a class if it has not been initialized.
    ///
    /// # Errors
    /// Throws `ExceptionInInitializerError` if `<clinit>` fails and `NoClassDefFoundError` on
    /// later uses of a failed class.
    pub fn initialize(&mut self, class: &str) -> Result<(), EmulationError> {
        match self.init.get(class) {
            Some(InitState::Done | InitState::InProgress) => return Ok(()),
            Some(InitState::Failed) => {
                let message = format!("Could not initialize class {}", class.replace('/', "."));
                return Err(self.throw_new("java/lang/NoClassDefFoundError", Some(&message)));
            }
            None => {}
        }
        let universe = self.universe;
        let Some(entry) = universe.get(class) else {
            return Ok(());
        };
        let structure = entry.class();
        self.init.insert(class.to_string(), InitState::InProgress);

        if let Some(superclass) = &structure.super_name {
            if let Err(error) = self.initialize(superclass) {
                self.init.insert(class.to_string(), InitState::Failed);
                return Err(error);
            }
        }

        for field in structure.fields.iter().filter(|f| f.is_static()) {
            let value = match &field.constant_value {
                Some(constant) => self.constant(constant)?,
                None => match FieldType::parse(&field.descriptor) {
                    Ok(field_type) => Value::default_for(&field_type),
                    Err(_) => Value::Null,
                },
            };
            self.statics.insert(structure.field_reference(field), value);
        }

        if structure.find_method("<clinit>", "()V").is_some() {
            let clinit = MemberReference::new(class, "<clinit>", "()V");
            match self.call(Target::Bytecode(clinit), Vec::new()) {
                Ok(_) => {}
                Err(EmulationError::Thrown(exception)) => {
                    self.init.insert(class.to_string(), InitState::Failed);
                    if self.is_instance(Value::Ref(exception), "java/lang/Error") {
                        return Err(EmulationError::Thrown(exception));
                    }
                    let error = self.throw_new("java/lang/ExceptionInInitializerError", None);
                    if let EmulationError::Thrown(wrapper) = error {
                        self.set_instance_field(wrapper, throwable_cause(), Value::Ref(exception));
                    }
                    return Err(error);
                }
                Err(other) => {
                    self.init.insert(class.to_string(), InitState::Failed);
                    return Err(other);
                }
            }
        }
        self.init.insert(class.to_string(), InitState::Done);
        Ok(())
    }

    /// True once a class completed initialization.
    #[must_use]
    pub fn is_initialized(&self, class: &str) -> bool {
        self.init.get(class) == Some(&InitState::Done)
    }

    /// Read a static field, initializing its declaring class first.
    ///
    /// # Errors
    /// Returns [`EmulationError::NoSuchField`] for unknown fields or the initialization failure.
    pub fn get_static(&mut self, field: &MemberReference) -> Result<Value, EmulationError> {
        if let Some(declaring) = self.universe.resolve_field(&field.owner, &field.name, &field.descriptor) {
            self.initialize(&declaring)?;
            let key = field.with_owner(declaring);
            return self
                .statics
                .get(&key)
                .copied()
                .ok_or_else(|| EmulationError::NoSuchField(key));
        }
        match self.natives.field(field) {
            Some(read) => read(self),
            None if self.universe.get(&field.owner).is_none() && !is_platform_type(&field.owner) => {
                Err(EmulationError::ClassNotFound(field.owner.clone()))
            }
            None => Err(EmulationError::NoSuchField(field.clone())),
        }
    }

    /// Write a static field, initializing its declaring class first.
    ///
    /// # Errors
    /// Returns [`EmulationError::NoSuchField`] for fields outside the universe.
    pub fn put_static(&mut self, field: &MemberReference, value: Value) -> Result<(), EmulationError> {
        let declaring = self
            .universe
            .resolve_field(&field.owner, &field.name, &field.descriptor)
            .ok_or_else(|| EmulationError::NoSuchField(field.clone()))?;
        self.initialize(&declaring)?;
        self.statics.insert(field.with_owner(declaring), value);
        Ok(())
    }

    fn instance_field_key(&self, field: &MemberReference) -> MemberReference {
        match self.universe.resolve_field(&field.owner, &field.name, &field.descriptor) {
            Some(declaring) => field.with_owner(declaring),
            None => field.clone(),
        }
    }

    /// Read an instance field.
    ///
    /// # Errors
    /// Throws `NullPointerException` for a null receiver.
    pub fn get_field(&mut self, object: Value, field: &MemberReference) -> Result<Value, EmulationError> {
        let Some(reference) = object.as_reference()? else {
            let message = format!("Cannot read field \"{}\" because value is null", field.name);
            return Err(self.throw_new("java/lang/NullPointerException", Some(&message)));
        };
        let key = self.instance_field_key(field);
        match self.heap.get(reference) {
            HeapObject::Instance { fields, .. } => Ok(fields.get(&key).copied().unwrap_or_else(|| {
                FieldType::parse(&field.descriptor)
                    .map(|t| Value::default_for(&t))
                    .unwrap_or(Value::Null)
            })),
            other => Err(EmulationError::Unsupported(format!(
                "field {} of {}",
                field,
                other.class_name()
            ))),
        }
    }

    /// Write an instance field.
    ///
    /// # Errors
    /// Throws `NullPointerException` for a null receiver.
    pub fn put_field(&mut self, object: Value, field: &MemberReference, value: Value) -> Result<(), EmulationError> {
        let Some(reference) = object.as_reference()? else {
            let message = format!("Cannot assign field \"{}\" because value is null", field.name);
            return Err(self.throw_new("java/lang/NullPointerException", Some(&message)));
        };
        let key = self.instance_field_key(field);
        if !self.set_instance_field(reference, key, value) {
            return Err(EmulationError::Unsupported(format!("field {field} of a platform object")));
        }
        Ok(())
    }

    pub(crate) fn set_instance_field(&mut self, object: HeapRef, key: MemberReference, value: Value) -> bool {
        match self.heap.get_mut(object) {
            HeapObject::Instance { fields, .. } => {
                fields.insert(key, value);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn instance_field(&self, object: HeapRef, key: &MemberReference) -> Option<Value> {
        match self.heap.get(object) {
            HeapObject::Instance { fields, .. } => fields.get(key).copied(),
            _ => None,
        }
    }

    /// Allocate an uninitialized instance of a class (`new`), initializing the class first.
    ///
    /// # Errors
    /// Returns [`EmulationError::ClassNotFound`] for classes outside the universe and runtime.
    pub fn instantiate(&mut self, class: &str) -> Result<HeapRef, EmulationError> {
        self.initialize(class)?;
        let object = match class {
            "java/lang/String" => HeapObject::String(Vec::new()),
            "java/lang/StringBuilder" => HeapObject::StringBuilder(Vec::new()),
            _ => {
                if let Some(wrapper) = crate::emulation::runtime::wrapper_class(class) {
                    HeapObject::Boxed {
                        class: wrapper,
                        value: Value::Int(0),
                    }
                } else if self.universe.get(class).is_some() {
                    let mut fields = BTreeMap::new();
                    let universe = self.universe;
                    for ancestor in universe.ancestors(class) {
                        let Some(structure) = universe.class(&ancestor) else {
                            continue;
                        };
                        if structure.is_interface() {
                            continue;
                        }
                        for field in structure.fields.iter().filter(|f| !f.is_static()) {
                            let value = FieldType::parse(&field.descriptor)
                                .map(|t| Value::default_for(&t))
                                .unwrap_or(Value::Null);
                            fields.insert(structure.field_reference(field), value);
                        }
                    }
                    HeapObject::Instance {
                        class: class.to_string(),
                        fields,
                    }
                } else if is_platform_type(class) {
                    HeapObject::Instance {
                        class: class.to_string(),
                        fields: BTreeMap::new(),
                    }
                } else {
                    return Err(EmulationError::ClassNotFound(class.to_string()));
                }
            }
        };
        Ok(self.heap.alloc(object))
    }

    // Calls

    /// Resolve a static or special call.
    ///
    /// # Errors
    /// Returns [`EmulationError::NoSuchMethod`], [`EmulationError::MissingNative`] or
    /// [`EmulationError::ClassNotFound`] if no implementation exists.
    pub fn resolve_direct(&self, member: &MemberReference) -> Result<Target, EmulationError> {
        if let Some(declaring) = self.universe.resolve_method(&member.owner, &member.name, &member.descriptor) {
            return Ok(Target::Bytecode(member.with_owner(declaring)));
        }
        self.resolve_native(&member.owner, member)
    }

    /// Resolve the implementation a virtual call selects for a receiver of `runtime_class`.
    ///
    /// # Errors
    /// As [`ExecutionContext::resolve_direct`].
    pub fn resolve_virtual(&self, runtime_class: &str, member: &MemberReference) -> Result<Target, EmulationError> {
        let universe = self.universe;
        let mut current = Some(runtime_class);
        while let Some(class) = current {
            if let Some(structure) = universe.class(class) {
                if structure
                    .find_method(&member.name, &member.descriptor)
                    .is_some_and(|m| !m.is_abstract() && !m.is_static())
                {
                    return Ok(Target::Bytecode(member.with_owner(class)));
                }
            } else if let Some(native) = self.natives.method(&member.with_owner(class)) {
                return Ok(Target::Native(member.with_owner(class), native));
            }
            current = universe.superclass(class);
        }
        if let Some(interface) = universe.select_default(runtime_class, &member.name, &member.descriptor) {
            return Ok(Target::Bytecode(member.with_owner(interface)));
        }
        Err(EmulationError::MissingNative(member.with_owner(runtime_class)))
    }

    fn resolve_native(&self, owner: &str, member: &MemberReference) -> Result<Target, EmulationError> {
        let universe = self.universe;
        let mut current = Some(owner);
        while let Some(class) = current {
            if let Some(native) = self.natives.method(&member.with_owner(class)) {
                return Ok(Target::Native(member.with_owner(class), native));
            }
            current = universe.superclass(class);
        }
        if universe.get(owner).is_none() && !is_platform_type(owner) && !owner.starts_with('[') {
            return Err(EmulationError::ClassNotFound(owner.to_string()));
        }
        if universe.get(owner).is_some() {
            return Err(EmulationError::NoSuchMethod(member.clone()));
        }
        Err(EmulationError::MissingNative(member.clone()))
    }

    /// The implementation a call would execute, without executing it.
    ///
    /// # Errors
    /// Throws `NullPointerException` for a null receiver of an instance call.
    pub fn select_target(
        &mut self,
        kind: InvokeKind,
        member: &MemberReference,
        receiver: Option<Value>,
    ) -> Result<Target, EmulationError> {
        match kind {
            InvokeKind::Static | InvokeKind::Special => self.resolve_direct(member),
            InvokeKind::Virtual | InvokeKind::Interface => {
                let receiver = receiver.ok_or(EmulationError::StackUnderflow)?;
                let Some(reference) = receiver.as_reference()? else {
                    let message = format!(
                        "Cannot invoke \"{}.{}()\" because value is null",
                        member.owner.replace('/', "."),
                        member.name
                    );
                    return Err(self.throw_new("java/lang/NullPointerException", Some(&message)));
                };
                let class = self.heap.get(reference).class_name();
                self.resolve_virtual(&class, member)
            }
        }
    }

    /// Invoke a method. For instance calls `args[0]` is the receiver.
    ///
    /// # Errors
    /// Returns the thrown exception or the emulator failure.
    pub fn invoke(
        &mut self,
        kind: InvokeKind,
        member: &MemberReference,
        args: Vec<Value>,
    ) -> Result<Option<Value>, EmulationError> {
        let target = self.select_target(kind, member, args.first().copied())?;
        if kind == InvokeKind::Static {
            self.initialize(&target.member().owner)?;
        }
        self.call(target, args)
    }

    /// [`ExecutionContext::invoke`] with memoization of results over immutable arguments.
    ///
    /// # Errors
    /// As [`ExecutionContext::invoke`].
    pub fn invoke_memoized(
        &mut self,
        kind: InvokeKind,
        member: &MemberReference,
        args: Vec<Value>,
    ) -> Result<Option<Value>, EmulationError> {
        let Some(keys) = args.iter().map(|v| self.value_key(*v)).collect::<Option<Vec<_>>>() else {
            return self.invoke(kind, member, args);
        };
        let key = (kind, member.clone(), keys);
        if let Some(cached) = self.memo.get(&key) {
            return cached.clone().map_err(EmulationError::Thrown);
        }
        let result = self.invoke(kind, member, args);
        match &result {
            Ok(value) => {
                self.memo.insert(key, Ok(*value));
            }
            Err(EmulationError::Thrown(exception)) => {
                self.memo.insert(key, Err(*exception));
            }
            Err(_) => {}
        }
        result
    }

    fn value_key(&self, value: Value) -> Option<ValueKey> {
        Some(match value {
            Value::Int(v) => ValueKey::Int(v),
            Value::Long(v) => ValueKey::Long(v),
            Value::Float(v) => ValueKey::Float(v.to_bits()),
            Value::Double(v) => ValueKey::Double(v.to_bits()),
            Value::Null => ValueKey::Null,
            Value::Ref(r) => match self.heap.get(r) {
                HeapObject::String(units) => ValueKey::String(units.clone()),
                HeapObject::Boxed { class, value } => ValueKey::Boxed(
                    *class,
                    match value {
                        Value::Int(v) => *v as u64,
                        Value::Long(v) => *v as u64,
                        Value::Float(v) => u64::from(v.to_bits()),
                        Value::Double(v) => v.to_bits(),
                        _ => return None,
                    },
                ),
                HeapObject::Class(name) => ValueKey::Class(name.clone()),
                _ => return None,
            },
        })
    }

    /// Execute a resolved target.
    ///
    /// # Errors
    /// Throws `StackOverflowError` when the call depth limit is reached.
    pub fn call(&mut self, target: Target, args: Vec<Value>) -> Result<Option<Value>, EmulationError> {
        if self.depth >= self.limits.max_call_depth {
            return Err(self.throw_new("java/lang/StackOverflowError", None));
        }
        self.depth += 1;
        let result = match target {
            Target::Native(_, native) => native(self, &args),
            Target::Bytecode(member) => match self.prepare(&member) {
                Ok(method) => interpreter::execute(self, &method, args),
                Err(error) => Err(error),
            },
        };
        self.depth -= 1;
        result
    }

    /// Allocate an instance of a constructor's owner and run the constructor.
    ///
    /// # Errors
    /// Returns the failure of allocation or of the constructor.
    pub fn construct(&mut self, constructor: &MemberReference, args: Vec<Value>) -> Result<Value, EmulationError> {
        let object = Value::Ref(self.instantiate(&constructor.owner)?);
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(object);
        full.extend(args);
        self.invoke(InvokeKind::Special, constructor, full)?;
        Ok(object)
    }

    /// `a.equals(b)` as the emulated program computes it.
    ///
    /// # Errors
    /// Returns the failure of a user `equals` implementation.
    pub fn java_equals(&mut self, a: Value, b: Value) -> Result<bool, EmulationError> {
        if a.identical(&b) {
            return Ok(true);
        }
        if !a.is_reference() || !b.is_reference() {
            return Ok(false);
        }
        if a == Value::Null || b == Value::Null {
            return Ok(false);
        }
        let member = MemberReference::new("java/lang/Object", "equals", "(Ljava/lang/Object;)Z");
        let result = self.invoke(InvokeKind::Virtual, &member, vec![a, b])?;
        Ok(matches!(result, Some(Value::Int(v)) if v != 0))
    }

    fn prepare(&mut self, member: &MemberReference) -> Result<Arc<PreparedMethod>, EmulationError> {
        if let Some(prepared) = self.methods.get(member) {
            return Ok(prepared.clone());
        }
        let entry = self
            .universe
            .get(&member.owner)
            .ok_or_else(|| EmulationError::ClassNotFound(member.owner.clone()))?;
        let class = entry.full().map_err(|e| EmulationError::ClassLoad {
            class: member.owner.clone(),
            message: e.to_string(),
        })?;
        let method = class
            .find_method(&member.name, &member.descriptor)
            .ok_or_else(|| EmulationError::NoSuchMethod(member.clone()))?;
        let Some(code) = method.code.clone() else {
            return Err(EmulationError::Unsupported(format!(
                "{member} has no bytecode (abstract or native)"
            )));
        };
        let is_static = method.is_static();

        let mut labels = HashMap::new();
        for (index, instruction) in code.instructions.iter().enumerate() {
            if let Instruction::Label(label) = instruction {
                labels.insert(*label, index);
            }
        }
        let mut handlers = Vec::with_capacity(code.try_catch.len());
        for block in &code.try_catch {
            let position = |label: Label| {
                labels
                    .get(&label)
                    .copied()
                    .ok_or_else(|| EmulationError::InvalidControlFlow(format!("unknown label {label}")))
            };
            handlers.push(Handler {
                start: position(block.start)?,
                end: position(block.end)?,
                target: position(block.handler)?,
                catch_type: block.catch_type.clone(),
            });
        }

        let prepared = Arc::new(PreparedMethod {
            member: member.clone(),
            class: class.clone(),
            code,
            is_static,
            labels,
            handlers,
        });
        self.methods.insert(member.clone(), prepared.clone());
        Ok(prepared)
    }

    /// Argument types of a method descriptor, receiver excluded.
    pub(crate) fn parameter_types(descriptor: &str) -> Result<Vec<FieldType>, EmulationError> {
        MethodDescriptor::parse(descriptor)
            .map(|d| d.parameters)
            .map_err(|e| EmulationError::Unsupported(e.to_string()))
    }
}

/// Field holding a throwable's message.
pub(crate) fn throwable_message() -> MemberReference {
    MemberReference::new("java/lang/Throwable", "detailMessage", "Ljava/lang/String;")
}

/// Field holding a throwable's cause.
pub(crate) fn throwable_cause() -> MemberReference {
    MemberReference::new("java/lang/Throwable", "cause", "Ljava/lang/Throwable;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{AccessFlags, ClassBuilder},
        config::BytesInput,
    };

    const STATIC: AccessFlags = AccessFlags::PUBLIC.union(AccessFlags::STATIC);

    fn universe(classes: Vec<ClassBuilder>) -> ClassUniverse {
        let mut universe = ClassUniverse::new();
        for builder in classes {
            let class = builder.build().unwrap();
            let bytes = class.to_bytes().unwrap();
            universe
                .insert(Arc::new(BytesInput::for_class(&class.name, bytes)), true)
                .unwrap();
        }
        universe
    }

    /// `class Counter { static int runs; static { runs++; } static int bump(int v) { runs++; return v; } }`
    fn counter() -> ClassBuilder {
        let increment = |m: crate::classfile::MethodBuilder| {
            m.getstatic("demo/Counter", "runs", "I")
                .op(Opcode::Iconst1)
                .op(Opcode::Iadd)
                .putstatic("demo/Counter", "runs", "I")
        };
        ClassBuilder::new("demo/Counter")
            .field(STATIC, "runs", "I")
            .method(AccessFlags::STATIC, "<clinit>", "()V", |m| increment(m).op(Opcode::Return))
            .method(STATIC, "bump", "(I)I", |m| {
                increment(m).load(Opcode::Iload, 0).op(Opcode::Ireturn)
            })
    }

    fn runs() -> MemberReference {
        MemberReference::new("demo/Counter", "runs", "I")
    }

    fn class_of(ctx: &ExecutionContext<'_>, error: &EmulationError) -> String {
        match error {
            EmulationError::Thrown(reference) => ctx.heap().get(*reference).class_name(),
            other => panic!("expected a thrown exception, got {other:?}"),
        }
    }

    #[test]
    fn initializer_runs_once() {
        let universe = universe(vec![counter()]);
        let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
        assert!(!ctx.is_initialized("demo/Counter"));

        ctx.initialize("demo/Counter").unwrap();
        ctx.initialize("demo/Counter").unwrap();
        assert!(ctx.is_initialized("demo/Counter"));
        assert_eq!(ctx.get_static(&runs()).unwrap(), Value::Int(1));
    }

    #[test]
    fn failed_initializer_is_remembered() {
        let broken = ClassBuilder::new("demo/Broken")
            .field(STATIC, "X", "I")
            .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
                m.op(Opcode::Iconst1)
                    .op(Opcode::Iconst0)
                    .op(Opcode::Idiv)
                    .putstatic("demo/Broken", "X", "I")
                    .op(Opcode::Return)
            });
        let universe = universe(vec![broken]);
        let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
        let x = MemberReference::new("demo/Broken", "X", "I");

        let first = ctx.get_static(&x).unwrap_err();
        assert_eq!(class_of(&ctx, &first), "java/lang/ExceptionInInitializerError");
        let second = ctx.get_static(&x).unwrap_err();
        assert_eq!(class_of(&ctx, &second), "java/lang/NoClassDefFoundError");
        assert!(ctx.describe_error(&second).contains("demo.Broken"));
    }

    #[test]
    fn memoized_calls_run_once() {
        let universe = universe(vec![counter()]);
        let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
        let bump = MemberReference::new("demo/Counter", "bump", "(I)I");

        for _ in 0..3 {
            let result = ctx.invoke_memoized(InvokeKind::Static, &bump, vec![Value::Int(5)]).unwrap();
            assert_eq!(result, Some(Value::Int(5)));
        }
        // One run of the initializer, one of the method.
        assert_eq!(ctx.get_static(&runs()).unwrap(), Value::Int(2));

        ctx.invoke(InvokeKind::Static, &bump, vec![Value::Int(5)]).unwrap();
        assert_eq!(ctx.get_static(&runs()).unwrap(), Value::Int(3));
    }

    #[test]
    fn equality_follows_the_program() {
        let universe = ClassUniverse::new();
        let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
        let interned = ctx.intern("fold");
        let fresh = ctx.new_str("fold");

        assert!(ctx.intern("fold").identical(&interned));
        assert!(!fresh.identical(&interned));
        assert!(ctx.java_equals(fresh, interned).unwrap());
        assert!(!ctx.java_equals(Value::Null, interned).unwrap());
        assert!(!ctx.java_equals(Value::Int(1), Value::Long(1)).unwrap());
    }

    #[test]
    fn deep_recursion_overflows() {
        let recursive = ClassBuilder::new("demo/Deep").method(STATIC, "down", "()V", |m| {
            m.invokestatic("demo/Deep", "down", "()V").op(Opcode::Return)
        });
        let universe = universe(vec![recursive]);
        let limits = EmulationLimits {
            max_call_depth: 16,
            max_instructions: None,
        };
        let mut ctx = ExecutionContext::new(&universe, limits);

        let down = MemberReference::new("demo/Deep", "down", "()V");
        let error = ctx.invoke(InvokeKind::Static, &down, Vec::new()).unwrap_err();
        assert_eq!(class_of(&ctx, &error), "java/lang/StackOverflowError");
    }
}
