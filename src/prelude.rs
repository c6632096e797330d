//! # classfold Prelude
//!
//! The types needed for a typical run: building a configuration, running the optimizer and
//! inspecting its events.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classfold operations
pub use crate::Error;

/// The result type used throughout classfold
pub use crate::Result;

// ================================================================================================
// Class Files
// ================================================================================================

pub use crate::classfile::{
    AccessFlags, ClassBuilder, ClassFile, Constant, FieldType, Instruction, MemberReference,
    Opcode, ParseMode,
};

// ================================================================================================
// Configuration and I/O
// ================================================================================================

pub use crate::config::{
    BytesInput, ClassInput, CollectingSink, DeconstructionSelector, DeconstructorConfiguration,
    OutputMode, OutputSink, PathInput, ReconstructorPredicate, RunConfiguration,
    RunConfigurationBuilder,
};

// ================================================================================================
// Folding
// ================================================================================================

pub use crate::folding::{
    Event, EventKind, EventLog, FoldStats, OptimizationResult, Optimizer,
};
