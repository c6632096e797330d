//! Runtime values of the emulator.
//!
//! A [`Value`] is what lives on the operand stack, in local variables and in fields. The JVM
//! computes with `boolean`, `byte`, `char` and `short` as `int`, so they all share
//! [`Value::Int`]. `long` and `double` are a single [`Value`] but occupy two local variable
//! slots; [`Value::category`] reports the slot count where the instruction set cares.
//!
//! # Type Mapping
//!
//! | Descriptor | Variant |
//! |------------|---------|
//! | `Z`, `B`, `C`, `S`, `I` | [`Value::Int`] |
//! | `J` | [`Value::Long`] |
//! | `F` | [`Value::Float`] |
//! | `D` | [`Value::Double`] |
//! | `L...;`, `[...` | [`Value::Ref`] or [`Value::Null`] |

use std::fmt;

use crate::{
    classfile::FieldType,
    emulation::{heap::HeapRef, EmulationError},
};

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// `int` and the narrower integral types
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// The null reference
    Null,
    /// A reference to a heap object
    Ref(HeapRef),
}

impl Value {
    /// The default value of a field or array element of the given type.
    #[must_use]
    pub fn default_for(field_type: &FieldType) -> Value {
        match field_type {
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Value::Null,
            _ => Value::Int(0),
        }
    }

    /// Local variable slots this value occupies (2 for `long` and `double`).
    #[must_use]
    pub fn category(&self) -> u16 {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    /// True for [`Value::Null`] and [`Value::Ref`].
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Null | Value::Ref(_))
    }

    /// The referenced object, `None` for null and primitives.
    #[must_use]
    pub fn reference(&self) -> Option<HeapRef> {
        match self {
            Value::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Identity comparison: bitwise for floating point, reference identity for objects.
    #[must_use]
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }

    /// Name of the value's stack type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Null => "null",
            Value::Ref(_) => "reference",
        }
    }

    /// # Errors
    /// Returns [`EmulationError::TypeMismatch`] if this is not an `int`.
    pub fn as_int(&self) -> Result<i32, EmulationError> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(EmulationError::type_mismatch("int", other)),
        }
    }

    /// # Errors
    /// Returns [`EmulationError::TypeMismatch`] if this is not a `long`.
    pub fn as_long(&self) -> Result<i64, EmulationError> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(EmulationError::type_mismatch("long", other)),
        }
    }

    /// # Errors
    /// Returns [`EmulationError::TypeMismatch`] if this is not a `float`.
    pub fn as_float(&self) -> Result<f32, EmulationError> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(EmulationError::type_mismatch("float", other)),
        }
    }

    /// # Errors
    /// Returns [`EmulationError::TypeMismatch`] if this is not a `double`.
    pub fn as_double(&self) -> Result<f64, EmulationError> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(EmulationError::type_mismatch("double", other)),
        }
    }

    /// The reference held by this value, `None` for null.
    ///
    /// # Errors
    /// Returns [`EmulationError::TypeMismatch`] for primitives.
    pub fn as_reference(&self) -> Result<Option<HeapRef>, EmulationError> {
        match self {
            Value::Ref(r) => Ok(Some(*r)),
            Value::Null => Ok(None),
            other => Err(EmulationError::type_mismatch("reference", other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}f"),
            Value::Double(v) => write!(f, "{v}d"),
            Value::Null => write!(f, "null"),
            Value::Ref(r) => write!(f, "{r}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_field_types() {
        assert_eq!(Value::default_for(&FieldType::Boolean), Value::Int(0));
        assert_eq!(Value::default_for(&FieldType::Long), Value::Long(0));
        assert_eq!(
            Value::default_for(&FieldType::Object("java/lang/String".into())),
            Value::Null
        );
    }

    #[test]
    fn identity_distinguishes_signed_zero() {
        assert!(!Value::Double(0.0).identical(&Value::Double(-0.0)));
        assert!(Value::Float(f32::NAN).identical(&Value::Float(f32::NAN)));
        assert!(Value::Int(3).identical(&Value::Int(3)));
    }

    #[test]
    fn typed_accessors_reject_other_types() {
        assert_eq!(Value::Int(7).as_int().unwrap(), 7);
        assert!(Value::Long(7).as_int().is_err());
        assert_eq!(Value::Null.as_reference().unwrap(), None);
        assert_eq!(Value::Long(1).category(), 2);
    }
}
