//! Field and method descriptors.
//!
//! Descriptors are the compact type strings of the class file format (`I`, `Ljava/lang/String;`,
//! `(I[J)V`). This module parses them into [`FieldType`] and [`MethodDescriptor`] and answers
//! the questions the rest of the crate asks about them: how many stack slots a value occupies,
//! whether it is a reference, and what the internal class name of an object type is.

use std::fmt;

use crate::Result;

/// A parsed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid or has trailing data.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let (field_type, rest) = Self::parse_prefix(descriptor)?;
        if !rest.is_empty() {
            return Err(malformed_error!("Trailing data in descriptor '{}'", descriptor));
        }
        Ok(field_type)
    }

    fn parse_prefix(descriptor: &str) -> Result<(FieldType, &str)> {
        let mut chars = descriptor.chars();
        let first = chars
            .next()
            .ok_or_else(|| malformed_error!("Empty field descriptor"))?;
        let rest = chars.as_str();
        let parsed = match first {
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'D' => FieldType::Double,
            'F' => FieldType::Float,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'S' => FieldType::Short,
            'Z' => FieldType::Boolean,
            'L' => {
                let end = rest
                    .find(';')
                    .ok_or_else(|| malformed_error!("Unterminated class descriptor '{}'", descriptor))?;
                if end == 0 {
                    return Err(malformed_error!("Empty class name in '{}'", descriptor));
                }
                return Ok((FieldType::Object(rest[..end].to_string()), &rest[end + 1..]));
            }
            '[' => {
                let (component, rest) = Self::parse_prefix(rest)?;
                return Ok((FieldType::Array(Box::new(component)), rest));
            }
            other => {
                return Err(malformed_error!(
                    "Invalid descriptor character '{}' in '{}'",
                    other,
                    descriptor
                ))
            }
        };
        Ok((parsed, rest))
    }

    /// Build the descriptor for a class name given in internal form.
    ///
    /// Array class names (`[I`) are already descriptors and are parsed as such.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid array class name.
    pub fn from_class_name(name: &str) -> Result<FieldType> {
        if name.starts_with('[') {
            Self::parse(name)
        } else {
            Ok(FieldType::Object(name.to_string()))
        }
    }

    /// Number of local variable / operand stack slots a value of this type occupies.
    #[must_use]
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Returns true for object and array types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Returns true for the primitive types.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !self.is_reference()
    }

    /// Returns true for the types the JVM computes with as `int`.
    #[must_use]
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            FieldType::Int
                | FieldType::Short
                | FieldType::Char
                | FieldType::Byte
                | FieldType::Boolean
        )
    }

    /// The internal name used in `CONSTANT_Class` entries: `java/lang/String` for objects,
    /// the descriptor itself for arrays, `None` for primitives.
    #[must_use]
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }

    /// The wrapper class of a primitive type, used for `Integer.TYPE` style class literals.
    #[must_use]
    pub fn wrapper_class(&self) -> Option<&'static str> {
        match self {
            FieldType::Byte => Some("java/lang/Byte"),
            FieldType::Char => Some("java/lang/Character"),
            FieldType::Double => Some("java/lang/Double"),
            FieldType::Float => Some("java/lang/Float"),
            FieldType::Int => Some("java/lang/Integer"),
            FieldType::Long => Some("java/lang/Long"),
            FieldType::Short => Some("java/lang/Short"),
            FieldType::Boolean => Some("java/lang/Boolean"),
            FieldType::Object(_) | FieldType::Array(_) => None,
        }
    }

    /// Render back into descriptor form.
    #[must_use]
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            FieldType::Byte => out.push('B'),
            FieldType::Char => out.push('C'),
            FieldType::Double => out.push('D'),
            FieldType::Float => out.push('F'),
            FieldType::Int => out.push('I'),
            FieldType::Long => out.push('J'),
            FieldType::Short => out.push('S'),
            FieldType::Boolean => out.push('Z'),
            FieldType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            FieldType::Array(component) => {
                out.push('[');
                component.write_descriptor(out);
            }
        }
    }

    /// Java source spelling, used in log messages and errors.
    #[must_use]
    pub fn java_name(&self) -> String {
        match self {
            FieldType::Byte => "byte".to_string(),
            FieldType::Char => "char".to_string(),
            FieldType::Double => "double".to_string(),
            FieldType::Float => "float".to_string(),
            FieldType::Int => "int".to_string(),
            FieldType::Long => "long".to_string(),
            FieldType::Short => "short".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::Object(name) => name.replace('/', "."),
            FieldType::Array(component) => format!("{}[]", component.java_name()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.java_name())
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub parameters: Vec<FieldType>,
    /// Return type, `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        let mut rest = descriptor
            .strip_prefix('(')
            .ok_or_else(|| malformed_error!("Method descriptor '{}' lacks '('", descriptor))?;

        let mut parameters = Vec::new();
        while !rest.starts_with(')') {
            if rest.is_empty() {
                return Err(malformed_error!("Unterminated method descriptor '{}'", descriptor));
            }
            let (parameter, remaining) = FieldType::parse_prefix(rest)?;
            parameters.push(parameter);
            rest = remaining;
        }

        let return_part = &rest[1..];
        let return_type = if return_part == "V" {
            None
        } else {
            Some(FieldType::parse(return_part)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Stack slots taken by the parameters (without the receiver).
    #[must_use]
    pub fn parameter_slots(&self) -> u16 {
        self.parameters.iter().map(FieldType::slots).sum()
    }

    /// Stack slots produced by the return value.
    #[must_use]
    pub fn return_slots(&self) -> u16 {
        self.return_type.as_ref().map_or(0, FieldType::slots)
    }

    /// Render back into descriptor form.
    #[must_use]
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for parameter in &self.parameters {
            out.push_str(&parameter.descriptor());
        }
        out.push(')');
        match &self.return_type {
            Some(return_type) => out.push_str(&return_type.descriptor()),
            None => out.push('V'),
        }
        out
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_types() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Int);
        assert_eq!(
            FieldType::parse("Ljava/lang/String;").unwrap(),
            FieldType::Object("java/lang/String".to_string())
        );
        assert_eq!(
            FieldType::parse("[[J").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Long))))
        );
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("Q").is_err());
    }

    #[test]
    fn parse_method_descriptor() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/String;[D)Ljava/lang/Object;").unwrap();
        assert_eq!(desc.parameters.len(), 4);
        assert_eq!(desc.parameter_slots(), 5);
        assert_eq!(desc.return_slots(), 1);
        assert_eq!(desc.descriptor(), "(IJLjava/lang/String;[D)Ljava/lang/Object;");

        let void = MethodDescriptor::parse("()V").unwrap();
        assert!(void.parameters.is_empty());
        assert_eq!(void.return_type, None);

        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
    }

    #[test]
    fn class_names() {
        let array = FieldType::from_class_name("[Ljava/lang/String;").unwrap();
        assert_eq!(array.class_name().unwrap(), "[Ljava/lang/String;");
        assert_eq!(array.java_name(), "java.lang.String[]");
        assert_eq!(FieldType::Int.class_name(), None);
        assert_eq!(FieldType::Boolean.wrapper_class(), Some("java/lang/Boolean"));
    }
}
