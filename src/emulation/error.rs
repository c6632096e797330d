//! Emulation error types.
//!
//! An [`EmulationError`] ends one evaluation. It never aborts a folding run: the evaluator
//! turns every variant into a soft failure, logs it, and leaves the instruction alone.
//!
//! Exceptions thrown by the emulated program are the [`EmulationError::Thrown`] variant and
//! carry the throwable object, so bytecode handlers can catch them and the log can show
//! the exception class and message.

use std::fmt;

use crate::{
    classfile::MemberReference,
    emulation::{heap::HeapRef, value::Value},
};

/// Errors that end an emulated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum EmulationError {
    /// The emulated program threw an exception that no handler caught.
    Thrown(HeapRef),
    /// An instruction or call site the emulator does not implement.
    Unsupported(String),
    /// A platform method without a native implementation.
    MissingNative(MemberReference),
    /// A referenced class is in neither the universe nor the native runtime.
    ClassNotFound(String),
    /// A referenced method does not exist on its owner or any supertype.
    NoSuchMethod(MemberReference),
    /// A referenced field does not exist on its owner or any supertype.
    NoSuchField(MemberReference),
    /// The class file of a universe class could not be decoded.
    ClassLoad {
        /// The class being loaded
        class: String,
        /// The decoding error
        message: String,
    },
    /// An operand of the wrong type, which verified bytecode never produces.
    TypeMismatch {
        /// Expected stack type
        expected: &'static str,
        /// Actual stack type
        found: &'static str,
    },
    /// Pop from an empty operand stack.
    StackUnderflow,
    /// Control reached the end of the body or an unknown label.
    InvalidControlFlow(String),
    /// The configured instruction limit was exceeded.
    InstructionLimit(u64),
}

impl EmulationError {
    pub(crate) fn type_mismatch(expected: &'static str, found: &Value) -> Self {
        EmulationError::TypeMismatch {
            expected,
            found: found.type_name(),
        }
    }

    /// True when the error is an exception thrown by the emulated program.
    #[must_use]
    pub fn is_thrown(&self) -> bool {
        matches!(self, EmulationError::Thrown(_))
    }
}

impl fmt::Display for EmulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulationError::Thrown(reference) => write!(f, "uncaught exception {reference}"),
            EmulationError::Unsupported(what) => write!(f, "unsupported: {what}"),
            EmulationError::MissingNative(member) => {
                write!(f, "no native implementation for {member}")
            }
            EmulationError::ClassNotFound(class) => write!(f, "class not found: {class}"),
            EmulationError::NoSuchMethod(member) => write!(f, "no such method: {member}"),
            EmulationError::NoSuchField(member) => write!(f, "no such field: {member}"),
            EmulationError::ClassLoad { class, message } => {
                write!(f, "failed to load {class}: {message}")
            }
            EmulationError::TypeMismatch { expected, found } => {
                write!(f, "operand type mismatch: expected {expected}, found {found}")
            }
            EmulationError::StackUnderflow => write!(f, "operand stack underflow"),
            EmulationError::InvalidControlFlow(what) => write!(f, "invalid control flow: {what}"),
            EmulationError::InstructionLimit(limit) => {
                write!(f, "instruction limit of {limit} exceeded")
            }
        }
    }
}

impl std::error::Error for EmulationError {}
