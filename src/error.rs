use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into two groups. Parsing and encoding errors describe a class file that could
/// not be read or written. Configuration errors are the *hard failures* of a folding run: they
/// abort the whole run, no output is emitted, and the message names the offending member and
/// the nature of the conflict.
///
/// Problems that only affect a single fold candidate (an exception while evaluating, a value
/// without a reconstruction recipe, a rejected receiver) are never reported through this type.
/// They are recorded in the run's [`crate::folding::EventLog`] and the instruction is left as is.
///
/// # Examples
///
/// ```rust,no_run
/// use classfold::{Error, config::RunConfiguration};
///
/// match RunConfiguration::builder().build() {
///     Ok(config) => println!("{} constant methods", config.constant_methods().len()),
///     Err(Error::DuplicateReconstructor { value_type, .. }) => {
///         eprintln!("two executable reconstructors for {value_type}");
///     }
///     Err(e) => eprintln!("configuration error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // File parsing Errors
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    // Encoding errors
    /// The constant pool would exceed the 65535 entries the format can address.
    #[error("Constant pool of {0} exceeds 65535 entries")]
    ConstantPoolOverflow(String),

    /// A string does not fit into a single constant pool entry.
    #[error("String of {0} modified UTF-8 bytes exceeds the constant pool limit")]
    StringTooLong(usize),

    /// A short branch no longer reaches its target after rewriting.
    #[error("Branch at offset {offset} in {method} is out of range for a 16-bit jump")]
    BranchOutOfRange {
        /// Method containing the branch (`owner.name descriptor`)
        method: String,
        /// Bytecode offset of the branch instruction
        offset: usize,
    },

    /// A method body grew beyond the 65535 byte code limit.
    #[error("Code of {0} exceeds 65535 bytes")]
    CodeTooLarge(String),

    // Configuration errors (hard failures)
    /// More than one executable reconstructor was configured for the same type.
    #[error("Type {value_type} has more than one executable reconstructor: {existing} and {duplicate}")]
    DuplicateReconstructor {
        /// The reconstructed value type
        value_type: String,
        /// The recipe registered first
        existing: String,
        /// The conflicting recipe
        duplicate: String,
    },

    /// No accessor matches a reconstructor parameter.
    #[error("No accessor found for parameter {index} ('{parameter}') of reconstructor {executable}")]
    MissingAccessor {
        /// The reconstructor (`owner.name descriptor`)
        executable: String,
        /// Zero-based parameter index
        index: usize,
        /// Parameter name used for the lookup
        parameter: String,
    },

    /// More than one accessor matches a reconstructor parameter.
    #[error("Ambiguous accessors for parameter {index} of reconstructor {executable}: {candidates:?}")]
    AmbiguousAccessor {
        /// The reconstructor (`owner.name descriptor`)
        executable: String,
        /// Zero-based parameter index
        index: usize,
        /// The matching accessor names
        candidates: Vec<String>,
    },

    /// A reconstructor's parameter names are not recorded in the class file.
    #[error("Reconstructor {0} has no recorded parameter names (compile with -parameters or debug info)")]
    MissingParameterNames(String),

    /// A configuration marker was placed on a member that cannot carry it.
    #[error("Invalid marker on {member}: {reason}")]
    InvalidMarker {
        /// The annotated member
        member: String,
        /// Why the marker is rejected
        reason: String,
    },

    /// A multi-release (platform-specific) variant of a class was supplied as input.
    #[error("Input {key} is a platform-specific class variant; multi-release inputs are not supported")]
    MultiReleaseInput {
        /// Key of the offending input
        key: String,
    },

    /// The same class was supplied more than once among the primary inputs.
    #[error("Class {class} is defined by both {first} and {second}")]
    DuplicateClass {
        /// The class name
        class: String,
        /// Key of the first input
        first: String,
        /// Key of the second input
        second: String,
    },

    /// Mutually exclusive output modes were requested together.
    #[error("Conflicting output modes requested: {0} and {1}")]
    ConflictingOutputModes(&'static str, &'static str),

    /// The run has inputs but no output mode.
    #[error("No output mode configured")]
    MissingOutput,

    /// In-place output was requested for an input that has no backing file.
    #[error("Input {0} has no backing file and cannot be rewritten in place")]
    InPlaceUnsupported(String),

    /// Reach the maximum recursion level allowed.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),
}
