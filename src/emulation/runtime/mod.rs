//! Native runtime for platform classes.
//!
//! The class universe only carries the program's own classes and its classpath. Everything
//! below `java.lang` that folding code commonly touches is implemented here in Rust:
//! strings and string builders, the boxed primitives, `Math`, `Enum`, `Class`, `Object`,
//! `Objects`, `System.arraycopy` and the `Throwable` hierarchy.
//!
//! # Registration
//!
//! Each submodule exposes a `register` function that adds its natives to a
//! [`NativeRegistry`]:
//!
//! ```rust,ignore
//! registry.register(
//!     Native::new("java/lang/String", "length", "()I").handler(string_length),
//! );
//! ```
//!
//! A native is keyed by the exact member it implements. Inherited members are found by the
//! [`ExecutionContext`] walking the platform superclass chain, so a single
//! `Throwable.<init>(String)` serves every exception class.
//!
//! Natives receive the receiver (for instance methods) followed by the arguments, with
//! `long` and `double` as a single [`Value`] each.
//!
//! # Determinism
//!
//! Only members whose result depends on nothing but their inputs are implemented.
//! `System.currentTimeMillis`, `Math.random` and friends are deliberately absent: a call
//! to them fails the evaluation with [`EmulationError::MissingNative`].

/// Register a table of natives for one owner class.
macro_rules! register_natives {
    ($registry:expr, $owner:expr, [$(($name:expr, $descriptor:expr, $handler:expr $(,)?)),* $(,)?]) => {
        $(
            $registry.register(
                $crate::emulation::runtime::Native::new($owner, $name, $descriptor).handler($handler),
            );
        )*
    };
}

mod boxes;
mod lang;
mod math;
mod string;

use std::collections::HashMap;

use crate::{
    classfile::MemberReference,
    emulation::{context::ExecutionContext, value::Value, EmulationError},
};

pub use boxes::primitive_keyword;
pub(crate) use string::{concat_recipe, make_concat};

/// Implementation of a platform method.
pub type NativeFn =
    fn(&mut ExecutionContext<'_>, &[Value]) -> Result<Option<Value>, EmulationError>;

/// Reader of a platform static field (`Integer.TYPE`, `Boolean.TRUE`).
pub type StaticFieldFn = fn(&mut ExecutionContext<'_>) -> Result<Value, EmulationError>;

/// A native method waiting to be registered.
#[derive(Debug, Clone)]
pub struct Native {
    member: MemberReference,
    handler: Option<NativeFn>,
}

impl Native {
    /// Describe the member a native implements.
    #[must_use]
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Native {
            member: MemberReference::new(owner, name, descriptor),
            handler: None,
        }
    }

    /// Attach the implementation.
    #[must_use]
    pub fn handler(mut self, handler: NativeFn) -> Self {
        self.handler = Some(handler);
        self
    }

    /// The implemented member.
    #[must_use]
    pub fn member(&self) -> &MemberReference {
        &self.member
    }
}

/// Lookup table of native methods and static fields.
#[derive(Debug, Default, Clone)]
pub struct NativeRegistry {
    methods: HashMap<MemberReference, NativeFn>,
    fields: HashMap<MemberReference, StaticFieldFn>,
}

impl NativeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        NativeRegistry::default()
    }

    /// A registry with every platform native of this crate.
    #[must_use]
    pub fn platform() -> Self {
        let mut registry = NativeRegistry::new();
        lang::register(&mut registry);
        string::register(&mut registry);
        boxes::register(&mut registry);
        math::register(&mut registry);
        registry
    }

    /// Add a native method. A native without a handler is ignored; a second registration of
    /// the same member replaces the first.
    pub fn register(&mut self, native: Native) {
        if let Some(handler) = native.handler {
            self.methods.insert(native.member, handler);
        }
    }

    /// Add a native static field.
    pub fn register_field(&mut self, owner: &str, name: &str, descriptor: &str, read: StaticFieldFn) {
        self.fields
            .insert(MemberReference::new(owner, name, descriptor), read);
    }

    /// The native implementing exactly `member`.
    #[must_use]
    pub fn method(&self, member: &MemberReference) -> Option<NativeFn> {
        self.methods.get(member).copied()
    }

    /// The reader of a native static field.
    #[must_use]
    pub fn field(&self, member: &MemberReference) -> Option<StaticFieldFn> {
        self.fields.get(member).copied()
    }

    /// True if a native implements exactly `member`.
    #[must_use]
    pub fn contains(&self, member: &MemberReference) -> bool {
        self.methods.contains_key(member)
    }

    /// Iterate over all native methods.
    pub fn members(&self) -> impl Iterator<Item = &MemberReference> {
        self.methods.keys()
    }

    /// Number of native methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// True if no native method is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// The wrapper class of a boxed type, as a static name.
#[must_use]
pub fn wrapper_class(name: &str) -> Option<&'static str> {
    Some(match name {
        "java/lang/Integer" => "java/lang/Integer",
        "java/lang/Long" => "java/lang/Long",
        "java/lang/Short" => "java/lang/Short",
        "java/lang/Byte" => "java/lang/Byte",
        "java/lang/Float" => "java/lang/Float",
        "java/lang/Double" => "java/lang/Double",
        "java/lang/Boolean" => "java/lang/Boolean",
        "java/lang/Character" => "java/lang/Character",
        _ => return None,
    })
}

/// `Double.toString`: the shortest decimal that round-trips, in plain notation for
/// magnitudes in `[1e-3, 1e7)` and computerized scientific notation otherwise.
#[must_use]
pub fn double_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let plain = (1e-3..1e7).contains(&value.abs());
    java_decimal(&format!("{:e}", value.abs()), value < 0.0, plain)
}

/// `Float.toString`, with the same layout as [`double_to_string`].
#[must_use]
pub fn float_to_string(value: f32) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let plain = (1e-3..1e7).contains(&value.abs());
    java_decimal(&format!("{:e}", value.abs()), value < 0.0, plain)
}

/// Lay out the shortest digits produced by `{:e}` (`1.2345e6`) the way Java does.
fn java_decimal(scientific: &str, negative: bool, plain: bool) -> String {
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    let mut out = String::with_capacity(digits.len() + 8);
    if negative {
        out.push('-');
    }
    if plain {
        if exponent >= 0 {
            let integer_len = exponent as usize + 1;
            if digits.len() > integer_len {
                out.push_str(&digits[..integer_len]);
                out.push('.');
                out.push_str(&digits[integer_len..]);
            } else {
                out.push_str(&digits);
                out.extend(std::iter::repeat('0').take(integer_len - digits.len()));
                out.push_str(".0");
            }
        } else {
            out.push_str("0.");
            out.extend(std::iter::repeat('0').take((-exponent - 1) as usize));
            out.push_str(&digits);
        }
    } else {
        out.push_str(&digits[..1]);
        out.push('.');
        if digits.len() > 1 {
            out.push_str(&digits[1..]);
        } else {
            out.push('0');
        }
        out.push('E');
        out.push_str(&exponent.to_string());
    }
    out
}

/// Argument `index` of a native call.
pub(crate) fn arg(args: &[Value], index: usize) -> Result<Value, EmulationError> {
    args.get(index).copied().ok_or(EmulationError::StackUnderflow)
}

pub(crate) fn arg_int(args: &[Value], index: usize) -> Result<i32, EmulationError> {
    arg(args, index)?.as_int()
}

pub(crate) fn arg_long(args: &[Value], index: usize) -> Result<i64, EmulationError> {
    arg(args, index)?.as_long()
}

pub(crate) fn arg_float(args: &[Value], index: usize) -> Result<f32, EmulationError> {
    arg(args, index)?.as_float()
}

pub(crate) fn arg_double(args: &[Value], index: usize) -> Result<f64, EmulationError> {
    arg(args, index)?.as_double()
}

/// A boolean result.
pub(crate) fn boolean(value: bool) -> Result<Option<Value>, EmulationError> {
    Ok(Some(Value::Int(i32::from(value))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_print_like_java() {
        assert_eq!(double_to_string(10.0), "10.0");
        assert_eq!(double_to_string(0.1), "0.1");
        assert_eq!(double_to_string(-2.5), "-2.5");
        assert_eq!(double_to_string(1e7), "1.0E7");
        assert_eq!(double_to_string(12345678.9), "1.23456789E7");
        assert_eq!(double_to_string(0.001), "0.001");
        assert_eq!(double_to_string(0.0001), "1.0E-4");
        assert_eq!(double_to_string(-0.0), "-0.0");
        assert_eq!(double_to_string(f64::NAN), "NaN");
        assert_eq!(double_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(double_to_string(1234567.0), "1234567.0");
    }

    #[test]
    fn floats_use_their_own_shortest_digits() {
        assert_eq!(float_to_string(0.1), "0.1");
        assert_eq!(float_to_string(3.0), "3.0");
        assert_eq!(float_to_string(1.5e10), "1.5E10");
    }

    #[test]
    fn platform_registry_covers_core_members() {
        let registry = NativeRegistry::platform();
        assert!(!registry.is_empty());
        assert!(registry.contains(&MemberReference::new("java/lang/String", "length", "()I")));
        assert!(registry.contains(&MemberReference::new(
            "java/lang/Integer",
            "parseInt",
            "(Ljava/lang/String;)I"
        )));
        assert!(registry
            .method(&MemberReference::new("java/lang/System", "currentTimeMillis", "()J"))
            .is_none());
        assert!(registry
            .field(&MemberReference::new("java/lang/Integer", "TYPE", "Ljava/lang/Class;"))
            .is_some());
    }

    #[test]
    fn handlerless_natives_are_ignored() {
        let mut registry = NativeRegistry::new();
        registry.register(Native::new("demo/A", "f", "()V"));
        assert!(registry.is_empty());
    }
}
