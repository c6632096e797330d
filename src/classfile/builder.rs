//! Fluent construction of class files.
//!
//! [`ClassBuilder`] synthesizes complete class files without a compiler. It is what the tests
//! and benchmarks use to produce inputs, and what hosts can use to generate fixtures.
//!
//! # Examples
//!
//! ```rust
//! use classfold::classfile::{AccessFlags, ClassBuilder, Opcode};
//!
//! // class demo.Holder { static final int X = Integer.parseInt("10"); }
//! let class = ClassBuilder::new("demo/Holder")
//!     .field(AccessFlags::STATIC | AccessFlags::FINAL, "X", "I")
//!     .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
//!         m.string("10")
//!             .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
//!             .putstatic("demo/Holder", "X", "I")
//!             .op(Opcode::Return)
//!     })
//!     .build()?;
//!
//! assert_eq!(class.methods.len(), 1);
//! # Ok::<(), classfold::Error>(())
//! ```

use crate::{
    classfile::{
        annotation::Annotation,
        constantpool::ConstantPool,
        descriptor::MethodDescriptor,
        instruction::{Code, Constant, Frame, Instruction, Label, TryCatchBlock, VerificationType},
        member::MemberReference,
        opcodes::Opcode,
        AccessFlags, Attribute, BootstrapMethod, ClassFile, FieldNode, MethodNode,
    },
    Result,
};

/// `REF_invokeStatic` method handle kind.
const REF_INVOKE_STATIC: u8 = 6;

/// Builder for a complete class file.
pub struct ClassBuilder {
    class: ClassFile,
    error: Option<crate::Error>,
}

impl ClassBuilder {
    /// Start a public class extending `java/lang/Object`, class file version 52 (Java 8).
    #[must_use]
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            class: ClassFile {
                minor_version: 0,
                major_version: 52,
                pool: ConstantPool::new(),
                access: AccessFlags::PUBLIC | AccessFlags::SUPER,
                name: name.to_string(),
                super_name: Some("java/lang/Object".to_string()),
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                annotations: Vec::new(),
                bootstrap_methods: Vec::new(),
                attributes: Vec::new(),
            },
            error: None,
        }
    }

    /// Set the major class file version.
    #[must_use]
    pub fn version(mut self, major: u16) -> Self {
        self.class.major_version = major;
        self
    }

    /// Replace the class access flags.
    #[must_use]
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.class.access = access;
        self
    }

    /// Set the superclass.
    #[must_use]
    pub fn super_class(mut self, name: &str) -> Self {
        self.class.super_name = Some(name.to_string());
        self
    }

    /// Add a directly implemented interface.
    #[must_use]
    pub fn interface(mut self, name: &str) -> Self {
        self.class.interfaces.push(name.to_string());
        self
    }

    /// Make this an enum class (`ENUM | FINAL`, extending `java/lang/Enum`).
    #[must_use]
    pub fn enumeration(mut self) -> Self {
        self.class.access |= AccessFlags::ENUM | AccessFlags::FINAL;
        self.class.super_name = Some("java/lang/Enum".to_string());
        self
    }

    /// Add an invisible (class retention) marker annotation.
    #[must_use]
    pub fn annotate(self, descriptor: &str) -> Self {
        self.annotate_with(descriptor, false)
    }

    /// Add a runtime-visible marker annotation.
    #[must_use]
    pub fn annotate_visible(self, descriptor: &str) -> Self {
        self.annotate_with(descriptor, true)
    }

    fn annotate_with(mut self, descriptor: &str, visible: bool) -> Self {
        match Annotation::marker(&mut self.class.pool, descriptor, visible) {
            Ok(annotation) => self.class.annotations.push(annotation),
            Err(error) => self.fail(error),
        }
        self
    }

    /// Register a `StringConcatFactory.makeConcatWithConstants` bootstrap method with the given
    /// recipe. Bootstrap methods are numbered in registration order, starting at 0.
    #[must_use]
    pub fn concat_bootstrap(mut self, recipe: &str) -> Self {
        let result = (|| -> Result<BootstrapMethod> {
            let factory = MemberReference::new(
                "java/lang/invoke/StringConcatFactory",
                "makeConcatWithConstants",
                "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;",
            );
            let handle = self
                .class
                .pool
                .add_method_handle(REF_INVOKE_STATIC, &factory, false)?;
            let recipe = self.class.pool.add_string(recipe)?;
            Ok(BootstrapMethod {
                handle,
                arguments: vec![recipe],
            })
        })();
        match result {
            Ok(bootstrap) => self.class.bootstrap_methods.push(bootstrap),
            Err(error) => self.fail(error),
        }
        self
    }

    /// Add a field without attributes.
    #[must_use]
    pub fn field(self, access: AccessFlags, name: &str, descriptor: &str) -> Self {
        self.field_with(access, name, descriptor, |f| f)
    }

    /// Add a field configured by `configure`.
    #[must_use]
    pub fn field_with(
        mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        configure: impl FnOnce(FieldBuilder) -> FieldBuilder,
    ) -> Self {
        let field = configure(FieldBuilder {
            node: FieldNode {
                access,
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                constant_value: None,
                annotations: Vec::new(),
                attributes: Vec::new(),
            },
            markers: Vec::new(),
        });
        let mut node = field.node;
        for (descriptor, visible) in field.markers {
            match Annotation::marker(&mut self.class.pool, &descriptor, visible) {
                Ok(annotation) => node.annotations.push(annotation),
                Err(error) => self.fail(error),
            }
        }
        self.class.fields.push(node);
        self
    }

    /// Add a method without a body (`abstract` or `native`).
    #[must_use]
    pub fn abstract_method(mut self, access: AccessFlags, name: &str, descriptor: &str) -> Self {
        self.class.methods.push(MethodNode {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: None,
            raw_code: None,
            annotations: Vec::new(),
            attributes: Vec::new(),
        });
        self
    }

    /// Add a method whose body is produced by `body`.
    #[must_use]
    pub fn method(
        mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        body: impl FnOnce(MethodBuilder) -> MethodBuilder,
    ) -> Self {
        let builder = body(MethodBuilder::new());
        match self.finish_method(access, name, descriptor, builder) {
            Ok(node) => self.class.methods.push(node),
            Err(error) => self.fail(error),
        }
        self
    }

    /// Add the trivial constructor `super(); return;`.
    #[must_use]
    pub fn default_constructor(self) -> Self {
        let super_name = self
            .class
            .super_name
            .clone()
            .unwrap_or_else(|| "java/lang/Object".to_string());
        self.method(AccessFlags::PUBLIC, "<init>", "()V", |m| {
            m.load(Opcode::Aload, 0)
                .invokespecial(&super_name, "<init>", "()V")
                .op(Opcode::Return)
        })
    }

    fn finish_method(
        &mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        builder: MethodBuilder,
    ) -> Result<MethodNode> {
        let parsed = MethodDescriptor::parse(descriptor)?;
        let mut code = builder.code;

        let argument_slots = parsed.parameter_slots() + u16::from(!access.is_static());
        let used_slots = code
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Var { opcode, index } => Some(
                    index
                        + if matches!(
                            opcode,
                            Opcode::Lload | Opcode::Dload | Opcode::Lstore | Opcode::Dstore
                        ) {
                            2
                        } else {
                            1
                        },
                ),
                Instruction::Iinc { index, .. } => Some(index + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        code.max_locals = builder
            .max_locals
            .unwrap_or_else(|| argument_slots.max(used_slots));
        code.max_stack = builder
            .max_stack
            .unwrap_or_else(|| estimate_max_stack(&code.instructions));

        let mut annotations = Vec::with_capacity(builder.markers.len());
        for (marker, visible) in &builder.markers {
            annotations.push(Annotation::marker(&mut self.class.pool, marker, *visible)?);
        }

        let mut attributes = Vec::new();
        if let Some(names) = &builder.parameter_names {
            let mut data = vec![names.len() as u8];
            for name in names {
                data.extend_from_slice(&self.class.pool.add_utf8(name)?.to_be_bytes());
                data.extend_from_slice(&0u16.to_be_bytes());
            }
            attributes.push(Attribute {
                name: "MethodParameters".to_string(),
                data,
            });
        }

        Ok(MethodNode {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: Some(code),
            raw_code: None,
            annotations,
            attributes,
        })
    }

    fn fail(&mut self, error: crate::Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Finish the class.
    ///
    /// # Errors
    /// Returns the first error encountered while adding members (invalid descriptors, pool
    /// overflow).
    pub fn build(self) -> Result<ClassFile> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.class),
        }
    }
}

fn estimate_max_stack(instructions: &[Instruction]) -> u16 {
    let mut depth: u16 = 0;
    let mut max: u16 = 0;
    for instruction in instructions {
        let (pop, push) = instruction.stack_effect().unwrap_or((0, 2));
        depth = depth.saturating_sub(pop) + push;
        max = max.max(depth);
        if instruction
            .opcode()
            .is_some_and(Opcode::is_unconditional_transfer)
        {
            depth = 0;
        }
    }
    // exception handlers start with the thrown object on the stack
    max.max(1)
}

/// Builder for a field declaration.
pub struct FieldBuilder {
    node: FieldNode,
    markers: Vec<(String, bool)>,
}

impl FieldBuilder {
    /// Set the `ConstantValue` attribute.
    #[must_use]
    pub fn constant(mut self, value: Constant) -> Self {
        self.node.constant_value = Some(value);
        self
    }

    /// Add an invisible marker annotation.
    #[must_use]
    pub fn annotate(mut self, descriptor: &str) -> Self {
        self.markers.push((descriptor.to_string(), false));
        self
    }

    /// Add a runtime-visible marker annotation.
    #[must_use]
    pub fn annotate_visible(mut self, descriptor: &str) -> Self {
        self.markers.push((descriptor.to_string(), true));
        self
    }
}

/// Builder for a method body.
///
/// Every instruction method appends one instruction. `max_locals` defaults to the slots used
/// by the arguments and local variable instructions, `max_stack` to a linear estimate.
pub struct MethodBuilder {
    code: Code,
    max_stack: Option<u16>,
    max_locals: Option<u16>,
    markers: Vec<(String, bool)>,
    parameter_names: Option<Vec<String>>,
}

impl MethodBuilder {
    fn new() -> Self {
        MethodBuilder {
            code: Code::new(0, 0),
            max_stack: None,
            max_locals: None,
            markers: Vec::new(),
            parameter_names: None,
        }
    }

    /// Set `max_stack` explicitly.
    #[must_use]
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = Some(max_stack);
        self
    }

    /// Set `max_locals` explicitly.
    #[must_use]
    pub fn max_locals(mut self, max_locals: u16) -> Self {
        self.max_locals = Some(max_locals);
        self
    }

    /// Add an invisible marker annotation to the method.
    #[must_use]
    pub fn annotate(mut self, descriptor: &str) -> Self {
        self.markers.push((descriptor.to_string(), false));
        self
    }

    /// Add a runtime-visible marker annotation to the method.
    #[must_use]
    pub fn annotate_visible(mut self, descriptor: &str) -> Self {
        self.markers.push((descriptor.to_string(), true));
        self
    }

    /// Record parameter names in a `MethodParameters` attribute.
    #[must_use]
    pub fn parameter_names(mut self, names: &[&str]) -> Self {
        self.parameter_names = Some(names.iter().map(ToString::to_string).collect());
        self
    }

    /// Allocate a label to be placed later with [`MethodBuilder::place`].
    pub fn new_label(&mut self) -> Label {
        self.code.new_label()
    }

    /// Place a label at the current position.
    #[must_use]
    pub fn place(self, label: Label) -> Self {
        self.instruction(Instruction::Label(label))
    }

    /// Append any instruction.
    #[must_use]
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.code.instructions.push(instruction);
        self
    }

    /// Append an operand-less instruction.
    #[must_use]
    pub fn op(self, opcode: Opcode) -> Self {
        self.instruction(Instruction::Simple(opcode))
    }

    /// Push an `int` using the shortest form.
    #[must_use]
    pub fn int(self, value: i32) -> Self {
        self.instruction(Instruction::int(value))
    }

    /// Push a `long`.
    #[must_use]
    pub fn long(self, value: i64) -> Self {
        self.instruction(Instruction::literal(&Constant::Long(value)))
    }

    /// Push a `double`.
    #[must_use]
    pub fn double(self, value: f64) -> Self {
        self.instruction(Instruction::literal(&Constant::Double(value)))
    }

    /// Push a `String` literal.
    #[must_use]
    pub fn string(self, value: &str) -> Self {
        self.instruction(Instruction::Ldc(Constant::String(value.to_string())))
    }

    /// Push a class literal.
    #[must_use]
    pub fn class_literal(self, class: &str) -> Self {
        self.instruction(Instruction::Ldc(Constant::Class(class.to_string())))
    }

    /// Load or store a local variable (`Iload`..`Astore`).
    #[must_use]
    pub fn load(self, opcode: Opcode, index: u16) -> Self {
        self.instruction(Instruction::Var { opcode, index })
    }

    /// Store into a local variable (`Istore`..`Astore`).
    #[must_use]
    pub fn store(self, opcode: Opcode, index: u16) -> Self {
        self.instruction(Instruction::Var { opcode, index })
    }

    /// `iinc`
    #[must_use]
    pub fn iinc(self, index: u16, delta: i16) -> Self {
        self.instruction(Instruction::Iinc { index, delta })
    }

    fn field_op(self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> Self {
        self.instruction(Instruction::Field {
            opcode,
            member: MemberReference::new(owner, name, descriptor),
        })
    }

    /// `getstatic`
    #[must_use]
    pub fn getstatic(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.field_op(Opcode::Getstatic, owner, name, descriptor)
    }

    /// `putstatic`
    #[must_use]
    pub fn putstatic(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.field_op(Opcode::Putstatic, owner, name, descriptor)
    }

    /// `getfield`
    #[must_use]
    pub fn getfield(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.field_op(Opcode::Getfield, owner, name, descriptor)
    }

    /// `putfield`
    #[must_use]
    pub fn putfield(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.field_op(Opcode::Putfield, owner, name, descriptor)
    }

    fn invoke(self, opcode: Opcode, owner: &str, name: &str, descriptor: &str, interface: bool) -> Self {
        self.instruction(Instruction::Invoke {
            opcode,
            member: MemberReference::new(owner, name, descriptor),
            interface,
        })
    }

    /// `invokestatic` on a class
    #[must_use]
    pub fn invokestatic(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(Opcode::Invokestatic, owner, name, descriptor, false)
    }

    /// `invokevirtual`
    #[must_use]
    pub fn invokevirtual(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(Opcode::Invokevirtual, owner, name, descriptor, false)
    }

    /// `invokespecial` on a class
    #[must_use]
    pub fn invokespecial(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(Opcode::Invokespecial, owner, name, descriptor, false)
    }

    /// `invokeinterface`
    #[must_use]
    pub fn invokeinterface(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(Opcode::Invokeinterface, owner, name, descriptor, true)
    }

    /// `invokedynamic` through the bootstrap method registered at `bootstrap`.
    #[must_use]
    pub fn invokedynamic(self, bootstrap: u16, name: &str, descriptor: &str) -> Self {
        self.instruction(Instruction::InvokeDynamic {
            bootstrap,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// `new`
    #[must_use]
    pub fn new_object(self, class: &str) -> Self {
        self.instruction(Instruction::Type {
            opcode: Opcode::New,
            class: class.to_string(),
        })
    }

    /// `anewarray`, `checkcast` or `instanceof`
    #[must_use]
    pub fn type_op(self, opcode: Opcode, class: &str) -> Self {
        self.instruction(Instruction::Type {
            opcode,
            class: class.to_string(),
        })
    }

    /// A branch to `target`.
    #[must_use]
    pub fn jump(self, opcode: Opcode, target: Label) -> Self {
        self.instruction(Instruction::Jump { opcode, target })
    }

    /// A stack-map frame at the current position.
    #[must_use]
    pub fn frame(self, locals: Vec<VerificationType>, stack: Vec<VerificationType>) -> Self {
        self.instruction(Instruction::Frame(Frame { locals, stack }))
    }

    /// A source line marker.
    #[must_use]
    pub fn line(self, line: u16) -> Self {
        self.instruction(Instruction::LineNumber(line))
    }

    /// Register an exception handler.
    #[must_use]
    pub fn try_catch(mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> Self {
        self.code.try_catch.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: catch_type.map(ToString::to_string),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_limits() {
        let class = ClassBuilder::new("demo/Math")
            .method(AccessFlags::STATIC, "sum", "(JJ)J", |m| {
                m.load(Opcode::Lload, 0)
                    .load(Opcode::Lload, 2)
                    .op(Opcode::Ladd)
                    .op(Opcode::Lreturn)
            })
            .build()
            .unwrap();
        let code = class.methods[0].code.as_ref().unwrap();
        assert_eq!(code.max_locals, 4);
        assert_eq!(code.max_stack, 4);
    }

    #[test]
    fn markers_and_parameter_names() {
        let class = ClassBuilder::new("demo/Point")
            .annotate("Lclassfold/annotations/ConstantType;")
            .method(AccessFlags::PUBLIC, "<init>", "(II)V", |m| {
                m.annotate("Lclassfold/annotations/Reconstructor;")
                    .parameter_names(&["x", "y"])
                    .load(Opcode::Aload, 0)
                    .invokespecial("java/lang/Object", "<init>", "()V")
                    .op(Opcode::Return)
            })
            .build()
            .unwrap();
        assert!(class.has_annotation("Lclassfold/annotations/ConstantType;"));
        let method = &class.methods[0];
        assert!(method.has_annotation("Lclassfold/annotations/Reconstructor;"));
        assert_eq!(
            method.parameter_names(&class.pool).unwrap(),
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn invalid_descriptor_fails_build() {
        let result = ClassBuilder::new("demo/Broken")
            .method(AccessFlags::STATIC, "bad", "(Q)V", |m| m.op(Opcode::Return))
            .build();
        assert!(result.is_err());
    }
}
