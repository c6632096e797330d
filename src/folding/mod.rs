//! Constant folding of class files.
//!
//! This module rewrites method bodies so that calls and field reads whose result is known at
//! build time are replaced by the result itself. It sits on top of [`crate::emulation`], which
//! computes the results by running the real bytecode, and [`crate::config`], which decides
//! what may be folded.
//!
//! # Pipeline
//!
//! | Stage | Module | Work |
//! |-------|--------|------|
//! | analysis | `analysis` | symbolic operand stack per basic block, fold candidates |
//! | evaluation | `evaluator` | predicate checks, emulator calls, representability |
//! | deconstruction | `deconstruct` | code rebuilding values without a literal form |
//! | rewrite | `rewrite` | span replacement, initializer pruning, marker removal |
//! | run | [`Optimizer`] | passes to a fixpoint, serialization, delivery |
//!
//! A candidate that cannot be folded for any reason is left exactly as it was. The reason
//! ends up in the [`EventLog`] and nowhere else.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use classfold::{
//!     classfile::{AccessFlags, ClassBuilder, ClassFile, Constant, ParseMode},
//!     config::{BytesInput, CollectingSink, RunConfiguration},
//!     folding::Optimizer,
//! };
//!
//! let holder = ClassBuilder::new("demo/Holder")
//!     .field(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL, "X", "I")
//!     .method(AccessFlags::STATIC, "<clinit>", "()V", |m| {
//!         m.string("10")
//!             .invokestatic("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
//!             .putstatic("demo/Holder", "X", "I")
//!             .op(classfold::classfile::Opcode::Return)
//!     })
//!     .build()?
//!     .to_bytes()?;
//!
//! let sink = Arc::new(CollectingSink::new());
//! let config = RunConfiguration::builder()
//!     .input(BytesInput::for_class("demo/Holder", holder))
//!     .platform_defaults()
//!     .output_sink(sink.clone())
//!     .build()?;
//! Optimizer::new(config).run()?;
//!
//! let folded = ClassFile::parse(&sink.get("demo/Holder.class").unwrap(), ParseMode::Full)?;
//! assert_eq!(folded.find_field("X", "I").unwrap().constant_value, Some(Constant::Integer(10)));
//! assert!(folded.find_method("<clinit>", "()V").is_none());
//! # Ok::<(), classfold::Error>(())
//! ```

pub(crate) mod analysis;
mod deconstruct;
mod evaluator;
mod events;
mod optimizer;
mod rewrite;

pub use deconstruct::MAX_DEPTH;
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter, FoldStats};
pub use optimizer::{OptimizationResult, Optimizer};
