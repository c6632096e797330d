//! Object heap of the emulator.
//!
//! This module provides [`Heap`], an append-only arena of [`HeapObject`]s addressed by
//! [`HeapRef`] handles. Nothing is ever collected: a folding run is short-lived and every
//! object it creates may end up referenced by a static field of some class.
//!
//! Text is stored as UTF-16 code units, exactly as the JVM stores it, so strings with
//! unpaired surrogates survive evaluation unchanged.
//!
//! # Canonical instances
//!
//! * String literals (`ldc`) are interned: equal literals yield the same reference.
//! * Every type has exactly one class object.
//! * Boxed values follow the caches of the platform's `valueOf` methods (`-128..=127` for
//!   the integral types, `0..=127` for `Character`, both `Boolean` values).

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use crate::classfile::{FieldType, MemberReference};

use super::Value;

/// Handle to an object on the [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapRef(u32);

impl HeapRef {
    /// Position of the object in allocation order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The identity hash code the emulated program observes for this object.
    #[must_use]
    pub fn identity_hash(self) -> i32 {
        (self.0.wrapping_mul(0x9E37_79B9) >> 1) as i32
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// An object on the heap.
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// `java.lang.String`
    String(Vec<u16>),
    /// `java.lang.StringBuilder`
    StringBuilder(Vec<u16>),
    /// A boxed primitive (`java.lang.Integer`, ...)
    Boxed {
        /// Internal name of the wrapper class
        class: &'static str,
        /// The wrapped primitive
        value: Value,
    },
    /// `java.lang.Class`, by internal name, array descriptor or primitive keyword
    Class(String),
    /// An array
    Array {
        /// Component type
        component: FieldType,
        /// Elements
        elements: Vec<Value>,
    },
    /// Any other object, including enum constants and throwables
    Instance {
        /// Internal name of the runtime class
        class: String,
        /// Instance fields keyed by their declaring reference
        fields: BTreeMap<MemberReference, Value>,
    },
}

impl HeapObject {
    /// Internal name of the object's runtime class.
    #[must_use]
    pub fn class_name(&self) -> String {
        match self {
            HeapObject::String(_) => "java/lang/String".to_string(),
            HeapObject::StringBuilder(_) => "java/lang/StringBuilder".to_string(),
            HeapObject::Boxed { class, .. } => (*class).to_string(),
            HeapObject::Class(_) => "java/lang/Class".to_string(),
            HeapObject::Array { component, .. } => format!("[{}", component.descriptor()),
            HeapObject::Instance { class, .. } => class.clone(),
        }
    }

    /// True for objects whose state can change after construction.
    ///
    /// Results of calls involving mutable objects are never memoized.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        matches!(
            self,
            HeapObject::StringBuilder(_) | HeapObject::Array { .. } | HeapObject::Instance { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BoxKey(&'static str, i64);

/// The emulator's object heap.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
    interned: HashMap<Vec<u16>, HeapRef>,
    classes: HashMap<String, HeapRef>,
    boxes: HashMap<BoxKey, HeapRef>,
}

impl Heap {
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Heap::default()
    }

    /// Number of allocated objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Allocate a new object.
    pub fn alloc(&mut self, object: HeapObject) -> HeapRef {
        let reference = HeapRef(self.objects.len() as u32);
        self.objects.push(object);
        reference
    }

    /// Access an object.
    ///
    /// References are only created by this heap, so every handle is valid.
    #[must_use]
    pub fn get(&self, reference: HeapRef) -> &HeapObject {
        &self.objects[reference.index()]
    }

    /// Mutable access to an object.
    pub fn get_mut(&mut self, reference: HeapRef) -> &mut HeapObject {
        &mut self.objects[reference.index()]
    }

    /// Allocate a fresh (non-interned) string.
    pub fn new_string(&mut self, units: Vec<u16>) -> HeapRef {
        self.alloc(HeapObject::String(units))
    }

    /// The canonical instance of a string literal.
    pub fn intern(&mut self, units: Vec<u16>) -> HeapRef {
        if let Some(existing) = self.interned.get(&units) {
            return *existing;
        }
        let reference = self.alloc(HeapObject::String(units.clone()));
        self.interned.insert(units, reference);
        reference
    }

    /// The canonical instance of an existing string (`String.intern`).
    pub fn intern_existing(&mut self, reference: HeapRef) -> HeapRef {
        let units = match self.get(reference) {
            HeapObject::String(units) => units.clone(),
            _ => return reference,
        };
        *self.interned.entry(units).or_insert(reference)
    }

    /// The class object of a type.
    pub fn class_object(&mut self, name: &str) -> HeapRef {
        if let Some(existing) = self.classes.get(name) {
            return *existing;
        }
        let reference = self.alloc(HeapObject::Class(name.to_string()));
        self.classes.insert(name.to_string(), reference);
        reference
    }

    /// Box a primitive, reusing the cached instance where `valueOf` would.
    pub fn boxed(&mut self, class: &'static str, value: Value) -> HeapRef {
        let key = match (class, value) {
            ("java/lang/Boolean", Value::Int(v)) => Some(BoxKey(class, i64::from(v != 0))),
            ("java/lang/Character", Value::Int(v)) if (0..=127).contains(&v) => {
                Some(BoxKey(class, i64::from(v)))
            }
            ("java/lang/Integer" | "java/lang/Short" | "java/lang/Byte", Value::Int(v))
                if (-128..=127).contains(&v) =>
            {
                Some(BoxKey(class, i64::from(v)))
            }
            ("java/lang/Long", Value::Long(v)) if (-128..=127).contains(&v) => {
                Some(BoxKey(class, v))
            }
            _ => None,
        };

        match key {
            Some(key) => {
                if let Some(existing) = self.boxes.get(&key) {
                    return *existing;
                }
                let reference = self.alloc(HeapObject::Boxed { class, value });
                self.boxes.insert(key, reference);
                reference
            }
            None => self.alloc(HeapObject::Boxed { class, value }),
        }
    }

    /// The UTF-16 content of a string object.
    #[must_use]
    pub fn string_units(&self, reference: HeapRef) -> Option<&[u16]> {
        match self.get(reference) {
            HeapObject::String(units) => Some(units),
            _ => None,
        }
    }

    /// The content of a string object, `None` for non-strings and unpaired surrogates.
    #[must_use]
    pub fn string(&self, reference: HeapRef) -> Option<String> {
        self.string_units(reference)
            .and_then(|units| String::from_utf16(units).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(text: &str) -> Vec<u16> {
        text.encode_utf16().collect()
    }

    #[test]
    fn literals_are_interned_computed_strings_are_not() {
        let mut heap = Heap::new();
        let a = heap.intern(units("abc"));
        let b = heap.intern(units("abc"));
        let c = heap.new_string(units("abc"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.intern_existing(c), a);
        assert_eq!(heap.string(c).as_deref(), Some("abc"));
    }

    #[test]
    fn box_cache_matches_value_of() {
        let mut heap = Heap::new();
        let small = heap.boxed("java/lang/Integer", Value::Int(100));
        assert_eq!(small, heap.boxed("java/lang/Integer", Value::Int(100)));
        let large = heap.boxed("java/lang/Integer", Value::Int(1000));
        assert_ne!(large, heap.boxed("java/lang/Integer", Value::Int(1000)));
        let yes = heap.boxed("java/lang/Boolean", Value::Int(1));
        assert_eq!(yes, heap.boxed("java/lang/Boolean", Value::Int(5)));
    }

    #[test]
    fn class_objects_are_unique() {
        let mut heap = Heap::new();
        let a = heap.class_object("java/lang/String");
        assert_eq!(a, heap.class_object("java/lang/String"));
        assert_eq!(heap.get(a).class_name(), "java/lang/Class");
    }
}
