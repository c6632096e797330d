//! JVM class file model.
//!
//! This module reads class files into a mutable tree ([`ClassFile`], [`FieldNode`],
//! [`MethodNode`]) and writes the tree back. It is the only place that knows about the binary
//! format; everything above works with symbolic [`Instruction`]s and [`MemberReference`]s.
//!
//! # Fidelity
//!
//! The constant pool keeps every original entry at its original index and only appends. As a
//! consequence, attributes the model does not understand are carried through byte for byte,
//! and method bodies that were not modified are written from their original bytes. Only a
//! body whose [`Code::modified`] flag is set is re-encoded.
//!
//! # Parse modes
//!
//! [`ParseMode::Structure`] skips decoding method bodies. It is what the configuration scan
//! uses over the whole class universe. [`ParseMode::Full`] additionally decodes every body into
//! instructions, labels and frames.
//!
//! # Examples
//!
//! ```rust
//! use classfold::classfile::{AccessFlags, ClassBuilder, ClassFile, Opcode, ParseMode};
//!
//! let bytes = ClassBuilder::new("demo/Answer")
//!     .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "get", "()I", |m| {
//!         m.int(42).op(Opcode::Ireturn)
//!     })
//!     .build()?
//!     .to_bytes()?;
//!
//! let class = ClassFile::parse(&bytes, ParseMode::Full)?;
//! assert_eq!(class.name, "demo/Answer");
//! assert!(class.find_method("get", "()I").is_some());
//! # Ok::<(), classfold::Error>(())
//! ```

mod access;
mod annotation;
mod builder;
mod code;
mod constantpool;
mod descriptor;
mod instruction;
mod member;
mod opcodes;
mod parser;
mod reader;
mod writer;

pub use access::AccessFlags;
pub use annotation::{parse_annotations, write_annotations, Annotation};
pub use builder::{ClassBuilder, FieldBuilder, MethodBuilder};
pub use code::{decode as decode_code, encode as encode_code, MethodInfo};
pub use constantpool::{
    decode_modified_utf8, decode_modified_utf8_units, encode_modified_utf8,
    encode_modified_utf8_units, modified_utf8_len, ConstantPool, PoolEntry, MAX_UTF8_LENGTH,
};
pub use descriptor::{FieldType, MethodDescriptor};
pub use instruction::{
    Code, Constant, Frame, Instruction, Label, LocalVariable, TryCatchBlock, VerificationType,
};
pub use member::{MemberReference, NameDescriptor};
pub use opcodes::Opcode;
pub use parser::Parser;

use crate::Result;

/// Magic number at the start of every class file.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// How much of a class file to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Decode method bodies into instructions.
    Full,
    /// Keep method bodies as raw bytes; skip debug and frame data.
    Structure,
}

/// An attribute the model keeps as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Attribute body
    pub data: Vec<u8>,
}

/// An entry of the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// Pool index of the bootstrap method handle
    pub handle: u16,
    /// Pool indices of the static arguments
    pub arguments: Vec<u16>,
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    /// Access flags
    pub access: AccessFlags,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Initial value from the `ConstantValue` attribute
    pub constant_value: Option<Constant>,
    /// Visible and invisible annotations
    pub annotations: Vec<Annotation>,
    /// Other attributes, verbatim
    pub attributes: Vec<Attribute>,
}

impl FieldNode {
    /// True for `static` fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    /// True for `static final` fields.
    #[must_use]
    pub fn is_static_final(&self) -> bool {
        self.access.contains(AccessFlags::STATIC | AccessFlags::FINAL)
    }

    /// True if an annotation of the given type is present.
    #[must_use]
    pub fn has_annotation(&self, descriptor: &str) -> bool {
        self.annotations.iter().any(|a| a.descriptor == descriptor)
    }
}

/// A method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    /// Access flags
    pub access: AccessFlags,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Decoded body ([`ParseMode::Full`] only)
    pub code: Option<Code>,
    /// Original body of the `Code` attribute
    pub raw_code: Option<Vec<u8>>,
    /// Visible and invisible annotations
    pub annotations: Vec<Annotation>,
    /// Other attributes, verbatim
    pub attributes: Vec<Attribute>,
}

impl MethodNode {
    /// True for `static` methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    /// True for `abstract` and `native` methods, which have no body.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access
            .intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE)
    }

    /// True if an annotation of the given type is present.
    #[must_use]
    pub fn has_annotation(&self, descriptor: &str) -> bool {
        self.annotations.iter().any(|a| a.descriptor == descriptor)
    }

    /// Names of the declared parameters, if the class file records them.
    ///
    /// The `MethodParameters` attribute is preferred. Without it the `LocalVariableTable` of
    /// the body is consulted for the slots holding the parameters. Returns `None` if neither
    /// names every parameter.
    ///
    /// # Errors
    /// Returns an error if the attributes are damaged.
    pub fn parameter_names(&self, pool: &ConstantPool) -> Result<Option<Vec<String>>> {
        let descriptor = MethodDescriptor::parse(&self.descriptor)?;

        if let Some(attribute) = self.attributes.iter().find(|a| a.name == "MethodParameters") {
            let mut parser = Parser::new(&attribute.data);
            let count = parser.read_u8()?;
            let mut names = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let name_index = parser.read_u16()?;
                parser.advance_by(2)?;
                if name_index == 0 {
                    return Ok(None);
                }
                names.push(pool.get_utf8(name_index)?.to_string());
            }
            if names.len() == descriptor.parameters.len() {
                return Ok(Some(names));
            }
        }

        let Some(raw) = &self.raw_code else {
            return Ok(None);
        };
        let locals = code::parameter_locals(raw, pool)?;
        let mut slot: u16 = if self.is_static() { 0 } else { 1 };
        let mut names = Vec::with_capacity(descriptor.parameters.len());
        for parameter in &descriptor.parameters {
            match locals.iter().find(|(index, _)| *index == slot) {
                Some((_, name)) => names.push(name.clone()),
                None => return Ok(None),
            }
            slot += parameter.slots();
        }
        Ok(Some(names))
    }
}

/// A parsed class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version (52 = Java 8, 61 = Java 17)
    pub major_version: u16,
    /// The constant pool
    pub pool: ConstantPool,
    /// Class access flags
    pub access: AccessFlags,
    /// Internal name (`demo/Holder`)
    pub name: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Internal names of the directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Field declarations in declaration order
    pub fields: Vec<FieldNode>,
    /// Method declarations in declaration order
    pub methods: Vec<MethodNode>,
    /// Class annotations
    pub annotations: Vec<Annotation>,
    /// Decoded `BootstrapMethods` attribute
    pub bootstrap_methods: Vec<BootstrapMethod>,
    /// Other class attributes, verbatim
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parse a class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if the data is not
    /// a valid class file.
    pub fn parse(data: &[u8], mode: ParseMode) -> Result<ClassFile> {
        reader::read_class(data, mode)
    }

    /// Serialize the class file.
    ///
    /// # Errors
    /// Returns an error if a modified body cannot be encoded or the pool overflows.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        writer::write_class(self)
    }

    /// Look up a method by name and descriptor.
    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Look up a field by name and descriptor.
    #[must_use]
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldNode> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// True for interfaces (including annotation interfaces).
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    /// True for enum classes.
    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.access.contains(AccessFlags::ENUM)
            && self.super_name.as_deref() == Some("java/lang/Enum")
    }

    /// True if a class annotation of the given type is present.
    #[must_use]
    pub fn has_annotation(&self, descriptor: &str) -> bool {
        self.annotations.iter().any(|a| a.descriptor == descriptor)
    }

    /// The member reference of a declared method.
    #[must_use]
    pub fn method_reference(&self, method: &MethodNode) -> MemberReference {
        MemberReference::new(self.name.clone(), method.name.clone(), method.descriptor.clone())
    }

    /// The member reference of a declared field.
    #[must_use]
    pub fn field_reference(&self, field: &FieldNode) -> MemberReference {
        MemberReference::new(self.name.clone(), field.name.clone(), field.descriptor.clone())
    }

    /// Decode the bodies of all methods that have not been decoded yet.
    ///
    /// # Errors
    /// Returns an error if a body is malformed.
    pub fn decode_bodies(&mut self) -> Result<()> {
        for method in &mut self.methods {
            if method.code.is_some() {
                continue;
            }
            if let Some(raw) = &method.raw_code {
                let info = MethodInfo {
                    owner: &self.name,
                    name: &method.name,
                    descriptor: &method.descriptor,
                    is_static: method.access.is_static(),
                };
                method.code = Some(code::decode(raw, &self.pool, info)?);
            }
        }
        Ok(())
    }
}
