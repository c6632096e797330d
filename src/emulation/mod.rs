//! Embedded JVM bytecode emulator.
//!
//! Folding needs the values that static initializers and marked methods compute. Rather
//! than starting a JVM, this module interprets the bytecode of the class universe directly
//! and implements the platform classes it touches natively.
//!
//! # Architecture
//!
//! - [`ClassUniverse`] - every primary and classpath class of a run, by internal name
//! - [`ExecutionContext`] - heap, static storage, class initialization and the memo cache
//! - [`Value`] / [`Heap`] - runtime values and the objects they reference
//! - [`NativeRegistry`] - Rust implementations of `java.lang` members
//! - `interpreter` - the instruction loop, including exception handlers
//!
//! # Failure model
//!
//! Every evaluation either produces a value or ends with an [`EmulationError`]. Exceptions
//! thrown by the emulated program are [`EmulationError::Thrown`]; everything the emulator
//! cannot do (a missing native, an unsupported `invokedynamic`, an exhausted instruction
//! budget) has its own variant. None of them aborts a folding run.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use classfold::classfile::{AccessFlags, ClassBuilder, MemberReference, Opcode};
//! use classfold::config::BytesInput;
//! use classfold::emulation::{ClassUniverse, EmulationLimits, ExecutionContext, InvokeKind, Value};
//!
//! let bytes = ClassBuilder::new("demo/Answer")
//!     .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "get", "()I", |m| {
//!         m.int(40).int(2).op(Opcode::Iadd).op(Opcode::Ireturn)
//!     })
//!     .build()?
//!     .to_bytes()?;
//!
//! let mut universe = ClassUniverse::new();
//! universe.insert(Arc::new(BytesInput::for_class("demo/Answer", bytes)), true)?;
//!
//! let mut ctx = ExecutionContext::new(&universe, EmulationLimits::default());
//! let get = MemberReference::new("demo/Answer", "get", "()I");
//! let result = ctx.invoke(InvokeKind::Static, &get, Vec::new()).unwrap();
//! assert_eq!(result, Some(Value::Int(42)));
//! # Ok::<(), classfold::Error>(())
//! ```

mod context;
mod error;
mod heap;
mod interpreter;
mod loader;
mod runtime;
mod value;

pub use context::{EmulationLimits, ExecutionContext, InvokeKind, Target};
pub use error::EmulationError;
pub use heap::{Heap, HeapObject, HeapRef};
pub use loader::{is_platform_type, ClassEntry, ClassUniverse};
pub use runtime::{
    double_to_string, float_to_string, primitive_keyword, wrapper_class, Native, NativeFn,
    NativeRegistry, StaticFieldFn,
};
pub use value::Value;

pub(crate) use runtime::{concat_recipe, make_concat};
