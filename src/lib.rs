// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'config/input.rs' maps input class files into memory

//! # classfold
//!
//! Build-time constant folding for JVM class files.
//!
//! `classfold` reads compiled classes, finds calls and field reads whose result cannot change
//! between runs, computes those results ahead of time by executing the real bytecode in an
//! embedded emulator, and writes the classes back with the results in place of the
//! computation. A `static final int X = Integer.parseInt("10")` ends up as a plain
//! `ConstantValue` of `10`, and a static initializer that did nothing else disappears.
//!
//! ## Features
//!
//! - **Opt-in folding** - only members marked constant (by annotation, by the platform
//!   defaults, or programmatically) are ever evaluated
//! - **Real semantics** - results come from executing the actual implementation, including
//!   the user's own classes and a model of the common `java.lang` classes
//! - **Object results** - values without a literal form are rebuilt through configured
//!   recipes (constructors, factories, or reusable `static final` instances)
//! - **Safe by default** - any candidate that cannot be folded is left exactly as it was and
//!   the reason is logged
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use classfold::prelude::*;
//!
//! let config = RunConfiguration::builder()
//!     .inputs(PathInput::scan_directory("build/classes")?)
//!     .classpath_inputs(PathInput::scan_directory("build/libs")?)
//!     .platform_defaults()
//!     .output_directory("build/folded")
//!     .build()?;
//!
//! let result = Optimizer::new(config).run()?;
//! println!("{}", result.summary());
//! # Ok::<(), classfold::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`classfile`] - class file model, reader, writer and a builder for synthesizing classes
//! - [`emulation`] - the bytecode emulator and its model of the platform classes
//! - [`config`] - inputs, outputs, markers and the run configuration
//! - [`folding`] - analysis, evaluation, deconstruction and the rewriting run
//! - [`Error`] and [`Result`] - hard failures; soft failures live in the
//!   [`folding::EventLog`]
//!
//! ## Markers
//!
//! Classes opt in through three annotations, matched by descriptor only so that no runtime
//! library is needed: `classfold.annotations.ConstantType`, `classfold.annotations.Constant`
//! and `classfold.annotations.Reconstructor`. See [`config`] for their meaning. They are
//! removed from every emitted class.
//!
//! ## Error Handling
//!
//! ```rust,no_run
//! use classfold::{Error, config::RunConfiguration};
//!
//! match RunConfiguration::builder().in_place().output_directory("out").build() {
//!     Ok(_) => println!("configured"),
//!     Err(Error::ConflictingOutputModes(first, second)) => {
//!         println!("cannot combine {first} with {second}");
//!     }
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use classfold::prelude::*;
///
/// let config = RunConfiguration::builder()
///     .input(PathInput::open("demo/Holder.class", "build/classes/demo/Holder.class")?)
///     .platform_defaults()
///     .in_place()
///     .build()?;
/// Optimizer::new(config).run()?;
/// # Ok::<(), classfold::Error>(())
/// ```
pub mod prelude;

/// JVM class file model.
///
/// Parsing into a mutable tree, symbolic instructions, and serialization that keeps
/// everything it does not understand byte for byte.
pub mod classfile;

/// Bytecode emulation.
///
/// The [`emulation::ExecutionContext`] runs methods of the class universe on a managed heap,
/// with native implementations of the platform classes folding relies on.
pub mod emulation;

/// Run configuration, inputs and outputs.
pub mod config;

/// Constant folding and the optimizer run.
pub mod folding;

/// `classfold` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classfold` Error type
///
/// The error type for every hard failure: damaged class files, invalid configuration and I/O.
pub use error::Error;

/// Cursor over the bytes of a class file.
pub use classfile::Parser;
