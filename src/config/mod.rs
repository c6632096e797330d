//! Run configuration: inputs, outputs, and what may be folded.
//!
//! # Architecture
//!
//! Configuration comes from three sources, merged in this order with later entries winning:
//!
//! | Source | Provides |
//! |--------|----------|
//! | platform defaults | pure `java.lang` members, enum accessors, boxing recipes |
//! | markers | annotations found on the input classes by the scanner |
//! | builder | anything set programmatically on [`RunConfigurationBuilder`] |
//!
//! The markers are three annotation types, matched by descriptor:
//!
//! - `ConstantType` on a class: all of its members are constant
//! - `Constant` on a field, method or constructor: that member is constant
//! - `Reconstructor` on a constructor or static method: the recipe that rebuilds instances of
//!   its type; on a static final field: an instance to reuse by equality
//!
//! The annotations are stripped from every rewritten class.
//!
//! # Key Components
//!
//! - [`RunConfiguration`] - the built, read-only configuration of one run
//! - [`ClassInput`] / [`OutputMode`] - where classes come from and where they go
//! - [`ReconstructorPredicate`] - per call site conditions for constant methods
//! - [`DeconstructionSelector`] - how values without a literal form are rebuilt

mod deconstructor;
mod input;
mod platform;
mod predicate;
mod run;
mod scanner;

pub use deconstructor::{
    AccessorKind, DeconstructionDataAccessor, DeconstructionSelector, DeconstructorConfiguration, RecipeKind,
};
pub use input::{BytesInput, ClassInput, CollectingSink, OutputMode, OutputSink, PathInput};
pub use predicate::{Invocation, PredicateFn, ReconstructorPredicate};
pub use run::{RunConfiguration, RunConfigurationBuilder};

/// Descriptor prefix shared by every marker annotation.
pub const MARKER_PREFIX: &str = "Lclassfold/annotations/";

/// Marks a type whose members are all constant.
pub const CONSTANT_TYPE: &str = "Lclassfold/annotations/ConstantType;";

/// Marks a constant field, method or constructor.
pub const CONSTANT: &str = "Lclassfold/annotations/Constant;";

/// Marks a reconstruction recipe or a reusable instance.
pub const RECONSTRUCTOR: &str = "Lclassfold/annotations/Reconstructor;";
