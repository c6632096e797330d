//! The class file constant pool.
//!
//! [`ConstantPool`] keeps every entry of a parsed class at its original index and only ever
//! appends. This matters for rewriting: attributes that this crate does not decode (generic
//! signatures, inner class tables, bootstrap methods, parameter annotations, ...) hold raw pool
//! indices, and they stay valid as long as no existing entry moves. New entries needed by
//! replacement code are deduplicated against the existing ones before being appended.
//!
//! Strings are stored in the JVM's *modified UTF-8* encoding; the raw bytes are kept next to
//! the decoded text so that unmodified entries are written back byte-for-byte.

use std::collections::HashMap;

use crate::{
    classfile::{member::MemberReference, parser::Parser},
    Error, Result,
};

/// Constant pool tags
pub mod tag {
    /// CONSTANT_Utf8
    pub const UTF8: u8 = 1;
    /// CONSTANT_Integer
    pub const INTEGER: u8 = 3;
    /// CONSTANT_Float
    pub const FLOAT: u8 = 4;
    /// CONSTANT_Long
    pub const LONG: u8 = 5;
    /// CONSTANT_Double
    pub const DOUBLE: u8 = 6;
    /// CONSTANT_Class
    pub const CLASS: u8 = 7;
    /// CONSTANT_String
    pub const STRING: u8 = 8;
    /// CONSTANT_Fieldref
    pub const FIELD_REF: u8 = 9;
    /// CONSTANT_Methodref
    pub const METHOD_REF: u8 = 10;
    /// CONSTANT_InterfaceMethodref
    pub const INTERFACE_METHOD_REF: u8 = 11;
    /// CONSTANT_NameAndType
    pub const NAME_AND_TYPE: u8 = 12;
    /// CONSTANT_MethodHandle
    pub const METHOD_HANDLE: u8 = 15;
    /// CONSTANT_MethodType
    pub const METHOD_TYPE: u8 = 16;
    /// CONSTANT_Dynamic
    pub const DYNAMIC: u8 = 17;
    /// CONSTANT_InvokeDynamic
    pub const INVOKE_DYNAMIC: u8 = 18;
    /// CONSTANT_Module
    pub const MODULE: u8 = 19;
    /// CONSTANT_Package
    pub const PACKAGE: u8 = 20;
}

/// Maximum number of bytes a single `CONSTANT_Utf8` entry can hold.
pub const MAX_UTF8_LENGTH: usize = 65535;

/// One constant pool slot.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    /// Index 0 and the slot following a long or double
    Unusable,
    /// Text, with the original modified UTF-8 bytes
    Utf8 {
        /// Decoded text (unpaired surrogates are replaced)
        text: String,
        /// Encoded bytes as found in (or written to) the class file
        raw: Box<[u8]>,
    },
    /// 32-bit integer
    Integer(i32),
    /// 32-bit float
    Float(f32),
    /// 64-bit integer
    Long(i64),
    /// 64-bit float
    Double(f64),
    /// Class reference, index of the name
    Class(u16),
    /// String literal, index of the text
    String(u16),
    /// Field reference
    FieldRef {
        /// Index of the owning class
        class: u16,
        /// Index of the name and type
        name_and_type: u16,
    },
    /// Method reference on a class
    MethodRef {
        /// Index of the owning class
        class: u16,
        /// Index of the name and type
        name_and_type: u16,
    },
    /// Method reference on an interface
    InterfaceMethodRef {
        /// Index of the owning interface
        class: u16,
        /// Index of the name and type
        name_and_type: u16,
    },
    /// Name and descriptor pair
    NameAndType {
        /// Index of the name
        name: u16,
        /// Index of the descriptor
        descriptor: u16,
    },
    /// Method handle
    MethodHandle {
        /// Reference kind (1-9)
        kind: u8,
        /// Index of the referenced member
        reference: u16,
    },
    /// Method type, index of the descriptor
    MethodType(u16),
    /// Dynamically computed constant
    Dynamic {
        /// Index into the BootstrapMethods attribute
        bootstrap: u16,
        /// Index of the name and type
        name_and_type: u16,
    },
    /// Dynamically computed call site
    InvokeDynamic {
        /// Index into the BootstrapMethods attribute
        bootstrap: u16,
        /// Index of the name and type
        name_and_type: u16,
    },
    /// Module, index of the name
    Module(u16),
    /// Package, index of the name
    Package(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntryKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    InvokeDynamic(u16, u16),
}

impl EntryKey {
    fn of(entry: &PoolEntry) -> Option<EntryKey> {
        Some(match entry {
            PoolEntry::Utf8 { text, .. } => EntryKey::Utf8(text.clone()),
            PoolEntry::Integer(value) => EntryKey::Integer(*value),
            PoolEntry::Float(value) => EntryKey::Float(value.to_bits()),
            PoolEntry::Long(value) => EntryKey::Long(*value),
            PoolEntry::Double(value) => EntryKey::Double(value.to_bits()),
            PoolEntry::Class(name) => EntryKey::Class(*name),
            PoolEntry::String(text) => EntryKey::String(*text),
            PoolEntry::FieldRef {
                class,
                name_and_type,
            } => EntryKey::FieldRef(*class, *name_and_type),
            PoolEntry::MethodRef {
                class,
                name_and_type,
            } => EntryKey::MethodRef(*class, *name_and_type),
            PoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            } => EntryKey::InterfaceMethodRef(*class, *name_and_type),
            PoolEntry::NameAndType { name, descriptor } => {
                EntryKey::NameAndType(*name, *descriptor)
            }
            PoolEntry::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => EntryKey::InvokeDynamic(*bootstrap, *name_and_type),
            _ => return None,
        })
    }
}

/// An append-only, deduplicating constant pool.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<PoolEntry>,
    lookup: HashMap<EntryKey, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates a pool holding only the unusable entry 0.
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![PoolEntry::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Parse the `constant_pool_count` and entries at the parser's position.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on unknown tags or truncated data.
    pub fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let count = parser.read_u16()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count of zero"));
        }

        let mut pool = ConstantPool::new();
        let mut index = 1u16;
        while index < count {
            let tag = parser.read_u8()?;
            let entry = match tag {
                tag::UTF8 => {
                    let length = parser.read_u16()? as usize;
                    let raw = parser.read_bytes(length)?;
                    PoolEntry::Utf8 {
                        text: decode_modified_utf8(raw)?,
                        raw: raw.into(),
                    }
                }
                tag::INTEGER => PoolEntry::Integer(parser.read_i32()?),
                tag::FLOAT => PoolEntry::Float(f32::from_bits(parser.read_u32()?)),
                tag::LONG => PoolEntry::Long(parser.read_u64()? as i64),
                tag::DOUBLE => PoolEntry::Double(f64::from_bits(parser.read_u64()?)),
                tag::CLASS => PoolEntry::Class(parser.read_u16()?),
                tag::STRING => PoolEntry::String(parser.read_u16()?),
                tag::FIELD_REF => PoolEntry::FieldRef {
                    class: parser.read_u16()?,
                    name_and_type: parser.read_u16()?,
                },
                tag::METHOD_REF => PoolEntry::MethodRef {
                    class: parser.read_u16()?,
                    name_and_type: parser.read_u16()?,
                },
                tag::INTERFACE_METHOD_REF => PoolEntry::InterfaceMethodRef {
                    class: parser.read_u16()?,
                    name_and_type: parser.read_u16()?,
                },
                tag::NAME_AND_TYPE => PoolEntry::NameAndType {
                    name: parser.read_u16()?,
                    descriptor: parser.read_u16()?,
                },
                tag::METHOD_HANDLE => PoolEntry::MethodHandle {
                    kind: parser.read_u8()?,
                    reference: parser.read_u16()?,
                },
                tag::METHOD_TYPE => PoolEntry::MethodType(parser.read_u16()?),
                tag::DYNAMIC => PoolEntry::Dynamic {
                    bootstrap: parser.read_u16()?,
                    name_and_type: parser.read_u16()?,
                },
                tag::INVOKE_DYNAMIC => PoolEntry::InvokeDynamic {
                    bootstrap: parser.read_u16()?,
                    name_and_type: parser.read_u16()?,
                },
                tag::MODULE => PoolEntry::Module(parser.read_u16()?),
                tag::PACKAGE => PoolEntry::Package(parser.read_u16()?),
                other => {
                    return Err(malformed_error!(
                        "Unknown constant pool tag {} at index {}",
                        other,
                        index
                    ))
                }
            };

            let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
            if let Some(key) = EntryKey::of(&entry) {
                pool.lookup.entry(key).or_insert(index);
            }
            pool.entries.push(entry);
            index += 1;
            if wide {
                pool.entries.push(PoolEntry::Unusable);
                index += 1;
            }
        }

        Ok(pool)
    }

    /// Append the serialized pool (count followed by entries) to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for entry in self.entries.iter().skip(1) {
            match entry {
                PoolEntry::Unusable => {}
                PoolEntry::Utf8 { raw, .. } => {
                    out.push(tag::UTF8);
                    out.extend_from_slice(&(raw.len() as u16).to_be_bytes());
                    out.extend_from_slice(raw);
                }
                PoolEntry::Integer(value) => {
                    out.push(tag::INTEGER);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                PoolEntry::Float(value) => {
                    out.push(tag::FLOAT);
                    out.extend_from_slice(&value.to_bits().to_be_bytes());
                }
                PoolEntry::Long(value) => {
                    out.push(tag::LONG);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                PoolEntry::Double(value) => {
                    out.push(tag::DOUBLE);
                    out.extend_from_slice(&value.to_bits().to_be_bytes());
                }
                PoolEntry::Class(index) => write_u8_u16(out, tag::CLASS, *index),
                PoolEntry::String(index) => write_u8_u16(out, tag::STRING, *index),
                PoolEntry::MethodType(index) => write_u8_u16(out, tag::METHOD_TYPE, *index),
                PoolEntry::Module(index) => write_u8_u16(out, tag::MODULE, *index),
                PoolEntry::Package(index) => write_u8_u16(out, tag::PACKAGE, *index),
                PoolEntry::FieldRef {
                    class,
                    name_and_type,
                } => write_pair(out, tag::FIELD_REF, *class, *name_and_type),
                PoolEntry::MethodRef {
                    class,
                    name_and_type,
                } => write_pair(out, tag::METHOD_REF, *class, *name_and_type),
                PoolEntry::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => write_pair(out, tag::INTERFACE_METHOD_REF, *class, *name_and_type),
                PoolEntry::NameAndType { name, descriptor } => {
                    write_pair(out, tag::NAME_AND_TYPE, *name, *descriptor);
                }
                PoolEntry::Dynamic {
                    bootstrap,
                    name_and_type,
                } => write_pair(out, tag::DYNAMIC, *bootstrap, *name_and_type),
                PoolEntry::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => write_pair(out, tag::INVOKE_DYNAMIC, *bootstrap, *name_and_type),
                PoolEntry::MethodHandle { kind, reference } => {
                    out.push(tag::METHOD_HANDLE);
                    out.push(*kind);
                    out.extend_from_slice(&reference.to_be_bytes());
                }
            }
        }
    }

    /// Number of slots including the unusable entry 0.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the pool holds no usable entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, unusable slots and indices past the end.
    pub fn get(&self, index: u16) -> Result<&PoolEntry> {
        match self.entries.get(index as usize) {
            Some(PoolEntry::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index {}",
                index
            )),
            Some(entry) => Ok(entry),
        }
    }

    /// Text of the `CONSTANT_Utf8` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a `CONSTANT_Utf8`.
    pub fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            PoolEntry::Utf8 { text, .. } => Ok(text),
            other => Err(malformed_error!(
                "Expected Utf8 at constant pool index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Internal name of the `CONSTANT_Class` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a `CONSTANT_Class`.
    pub fn get_class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            PoolEntry::Class(name) => self.get_utf8(*name),
            other => Err(malformed_error!(
                "Expected Class at constant pool index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Name and descriptor of the `CONSTANT_NameAndType` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a `CONSTANT_NameAndType`.
    pub fn get_name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            PoolEntry::NameAndType { name, descriptor } => {
                Ok((self.get_utf8(*name)?, self.get_utf8(*descriptor)?))
            }
            other => Err(malformed_error!(
                "Expected NameAndType at constant pool index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolve a field, method or interface method reference.
    ///
    /// Returns the member and whether the owner is an interface (`InterfaceMethodref`).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a member reference.
    pub fn get_member(&self, index: u16) -> Result<(MemberReference, bool)> {
        let (class, name_and_type, interface) = match self.get(index)? {
            PoolEntry::FieldRef {
                class,
                name_and_type,
            }
            | PoolEntry::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            PoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at constant pool index {}, found {:?}",
                    index,
                    other
                ))
            }
        };
        let owner = self.get_class_name(class)?;
        let (name, descriptor) = self.get_name_and_type(name_and_type)?;
        Ok((MemberReference::new(owner, name, descriptor), interface))
    }

    fn push(&mut self, entry: PoolEntry) -> Result<u16> {
        if let Some(key) = EntryKey::of(&entry) {
            if let Some(index) = self.lookup.get(&key) {
                return Ok(*index);
            }
        }

        let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
        let needed = if wide { 2 } else { 1 };
        if self.entries.len() + needed > usize::from(u16::MAX) {
            return Err(Error::ConstantPoolOverflow(format!(
                "{} entries",
                self.entries.len()
            )));
        }

        let index = self.entries.len() as u16;
        if let Some(key) = EntryKey::of(&entry) {
            self.lookup.insert(key, index);
        }
        self.entries.push(entry);
        if wide {
            self.entries.push(PoolEntry::Unusable);
        }
        Ok(index)
    }

    /// Find or add a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::StringTooLong`] or [`crate::Error::ConstantPoolOverflow`].
    pub fn add_utf8(&mut self, text: &str) -> Result<u16> {
        if let Some(index) = self.lookup.get(&EntryKey::Utf8(text.to_string())) {
            return Ok(*index);
        }
        let raw = encode_modified_utf8(text);
        if raw.len() > MAX_UTF8_LENGTH {
            return Err(Error::StringTooLong(raw.len()));
        }
        self.push(PoolEntry::Utf8 {
            text: text.to_string(),
            raw: raw.into_boxed_slice(),
        })
    }

    /// Find or add a `CONSTANT_Class`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        self.push(PoolEntry::Class(name))
    }

    /// Find or add a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns an error if the text is too long or the pool overflows.
    pub fn add_string(&mut self, text: &str) -> Result<u16> {
        let text = self.add_utf8(text)?;
        self.push(PoolEntry::String(text))
    }

    /// Find or add a `CONSTANT_Integer`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.push(PoolEntry::Integer(value))
    }

    /// Find or add a `CONSTANT_Float`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_float(&mut self, value: f32) -> Result<u16> {
        self.push(PoolEntry::Float(value))
    }

    /// Find or add a `CONSTANT_Long`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.push(PoolEntry::Long(value))
    }

    /// Find or add a `CONSTANT_Double`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_double(&mut self, value: f64) -> Result<u16> {
        self.push(PoolEntry::Double(value))
    }

    /// Find or add a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.push(PoolEntry::NameAndType { name, descriptor })
    }

    /// Find or add a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_field_ref(&mut self, member: &MemberReference) -> Result<u16> {
        let class = self.add_class(&member.owner)?;
        let name_and_type = self.add_name_and_type(&member.name, &member.descriptor)?;
        self.push(PoolEntry::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Find or add a `CONSTANT_Methodref` or `CONSTANT_InterfaceMethodref`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_method_ref(&mut self, member: &MemberReference, interface: bool) -> Result<u16> {
        let class = self.add_class(&member.owner)?;
        let name_and_type = self.add_name_and_type(&member.name, &member.descriptor)?;
        if interface {
            self.push(PoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            })
        } else {
            self.push(PoolEntry::MethodRef {
                class,
                name_and_type,
            })
        }
    }

    /// Add a `CONSTANT_MethodHandle` to a method.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_method_handle(&mut self, kind: u8, member: &MemberReference, interface: bool) -> Result<u16> {
        let reference = self.add_method_ref(member, interface)?;
        if let Some(index) = self.entries.iter().position(|entry| {
            matches!(entry, PoolEntry::MethodHandle { kind: k, reference: r } if *k == kind && *r == reference)
        }) {
            return Ok(index as u16);
        }
        self.push(PoolEntry::MethodHandle { kind, reference })
    }

    /// Find or add a `CONSTANT_InvokeDynamic`.
    ///
    /// # Errors
    /// Returns an error if the pool overflows.
    pub fn add_invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> Result<u16> {
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.push(PoolEntry::InvokeDynamic {
            bootstrap,
            name_and_type,
        })
    }
}

fn write_u8_u16(out: &mut Vec<u8>, tag: u8, value: u16) {
    out.push(tag);
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_pair(out: &mut Vec<u8>, tag: u8, first: u16, second: u16) {
    out.push(tag);
    out.extend_from_slice(&first.to_be_bytes());
    out.extend_from_slice(&second.to_be_bytes());
}

/// Encode UTF-16 code units in modified UTF-8 (NUL as two bytes, no four-byte forms).
#[must_use]
pub fn encode_modified_utf8_units(units: impl IntoIterator<Item = u16>) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Encode a string in modified UTF-8.
#[must_use]
pub fn encode_modified_utf8(text: &str) -> Vec<u8> {
    encode_modified_utf8_units(text.encode_utf16())
}

/// Length in bytes of the modified UTF-8 encoding of `units`.
#[must_use]
pub fn modified_utf8_len(units: &[u16]) -> usize {
    units
        .iter()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Decode modified UTF-8 into UTF-16 code units.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on truncated or invalid byte sequences.
pub fn decode_modified_utf8_units(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let first = bytes[index];
        if first & 0x80 == 0 {
            units.push(u16::from(first));
            index += 1;
        } else if first & 0xE0 == 0xC0 {
            let second = *bytes
                .get(index + 1)
                .ok_or_else(|| malformed_error!("Truncated modified UTF-8 sequence"))?;
            units.push((u16::from(first & 0x1F) << 6) | u16::from(second & 0x3F));
            index += 2;
        } else if first & 0xF0 == 0xE0 {
            if index + 2 >= bytes.len() {
                return Err(malformed_error!("Truncated modified UTF-8 sequence"));
            }
            let second = bytes[index + 1];
            let third = bytes[index + 2];
            units.push(
                (u16::from(first & 0x0F) << 12)
                    | (u16::from(second & 0x3F) << 6)
                    | u16::from(third & 0x3F),
            );
            index += 3;
        } else {
            return Err(malformed_error!(
                "Invalid modified UTF-8 lead byte 0x{:02X}",
                first
            ));
        }
    }
    Ok(units)
}

/// Decode modified UTF-8 into a Rust string, replacing unpaired surrogates.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on truncated or invalid byte sequences.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    Ok(String::from_utf16_lossy(&decode_modified_utf8_units(bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_utf8_round_trip() {
        let text = "a\u{0}\u{e9}\u{20ac}\u{1F600}";
        let encoded = encode_modified_utf8(text);
        // NUL takes two bytes and the emoji becomes a surrogate pair of three bytes each
        assert_eq!(encoded.len(), 1 + 2 + 2 + 3 + 6);
        assert!(!encoded.contains(&0));
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
        let units: Vec<u16> = text.encode_utf16().collect();
        assert_eq!(modified_utf8_len(&units), encoded.len());
    }

    #[test]
    fn interning_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.add_string("hello").unwrap();
        let b = pool.add_string("hello").unwrap();
        assert_eq!(a, b);

        let long = pool.add_long(42).unwrap();
        let after = pool.add_integer(7).unwrap();
        assert_eq!(after, long + 2);
        assert!(pool.get(long + 1).is_err());
    }

    #[test]
    fn parse_and_write_preserve_indices() {
        let mut pool = ConstantPool::new();
        let member = MemberReference::new("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I");
        let method = pool.add_method_ref(&member, false).unwrap();
        pool.add_double(1.5).unwrap();
        let text = pool.add_string("x").unwrap();

        let mut bytes = Vec::new();
        pool.write(&mut bytes);
        let mut parser = Parser::new(&bytes);
        let parsed = ConstantPool::parse(&mut parser).unwrap();

        assert_eq!(parsed.len(), pool.len());
        assert_eq!(parsed.get_member(method).unwrap(), (member, false));
        assert_eq!(parsed.get(text).unwrap(), pool.get(text).unwrap());
        assert!(!parser.has_more_data());
    }
}
