//! The class universe.
//!
//! A [`ClassUniverse`] holds every compilation unit of a run, primary inputs and classpath
//! alike, keyed by internal class name. Units are parsed once in
//! [`ParseMode::Structure`](crate::classfile::ParseMode::Structure) for the configuration scan;
//! the emulator asks for a fully decoded copy the first time it executes code of a class.
//!
//! Platform classes (`java/lang/...`) are not part of the universe. Their place in the type
//! hierarchy comes from a fixed table covering the types the native runtime implements, so
//! subtype checks, exception handler matching and selector lookup work across the boundary.

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    sync::{Arc, OnceLock},
};

use crate::{
    classfile::{ClassFile, FieldType, ParseMode},
    config::ClassInput,
    Error, Result,
};

/// Superclass and interfaces of the platform types the native runtime knows.
const PLATFORM_TYPES: &[(&str, &str, &[&str])] = &[
    ("java/lang/String", "java/lang/Object", &["java/io/Serializable", "java/lang/Comparable", "java/lang/CharSequence"]),
    ("java/lang/StringBuilder", "java/lang/AbstractStringBuilder", &["java/io/Serializable", "java/lang/CharSequence", "java/lang/Appendable"]),
    ("java/lang/AbstractStringBuilder", "java/lang/Object", &["java/lang/Appendable", "java/lang/CharSequence"]),
    ("java/lang/Number", "java/lang/Object", &["java/io/Serializable"]),
    ("java/lang/Integer", "java/lang/Number", &["java/lang/Comparable"]),
    ("java/lang/Long", "java/lang/Number", &["java/lang/Comparable"]),
    ("java/lang/Short", "java/lang/Number", &["java/lang/Comparable"]),
    ("java/lang/Byte", "java/lang/Number", &["java/lang/Comparable"]),
    ("java/lang/Float", "java/lang/Number", &["java/lang/Comparable"]),
    ("java/lang/Double", "java/lang/Number", &["java/lang/Comparable"]),
    ("java/lang/Boolean", "java/lang/Object", &["java/io/Serializable", "java/lang/Comparable"]),
    ("java/lang/Character", "java/lang/Object", &["java/io/Serializable", "java/lang/Comparable"]),
    ("java/lang/Enum", "java/lang/Object", &["java/lang/Comparable", "java/io/Serializable"]),
    ("java/lang/Class", "java/lang/Object", &["java/io/Serializable"]),
    ("java/lang/Math", "java/lang/Object", &[]),
    ("java/lang/System", "java/lang/Object", &[]),
    ("java/util/Objects", "java/lang/Object", &[]),
    ("java/lang/Throwable", "java/lang/Object", &["java/io/Serializable"]),
    ("java/lang/Exception", "java/lang/Throwable", &[]),
    ("java/lang/Error", "java/lang/Throwable", &[]),
    ("java/lang/RuntimeException", "java/lang/Exception", &[]),
    ("java/lang/CloneNotSupportedException", "java/lang/Exception", &[]),
    ("java/lang/ReflectiveOperationException", "java/lang/Exception", &[]),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException", &[]),
    ("java/lang/NumberFormatException", "java/lang/IllegalArgumentException", &[]),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException", &[]),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException", &[]),
    ("java/lang/NullPointerException", "java/lang/RuntimeException", &[]),
    ("java/lang/ClassCastException", "java/lang/RuntimeException", &[]),
    ("java/lang/ArrayStoreException", "java/lang/RuntimeException", &[]),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException", &[]),
    ("java/lang/UnsupportedOperationException", "java/lang/RuntimeException", &[]),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException", &[]),
    ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException", &[]),
    ("java/lang/StringIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException", &[]),
    ("java/lang/LinkageError", "java/lang/Error", &[]),
    ("java/lang/ExceptionInInitializerError", "java/lang/LinkageError", &[]),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError", &[]),
    ("java/lang/VirtualMachineError", "java/lang/Error", &[]),
    ("java/lang/StackOverflowError", "java/lang/VirtualMachineError", &[]),
    ("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError", &[]),
    ("java/lang/AssertionError", "java/lang/Error", &[]),
];

fn platform_type(name: &str) -> Option<&'static (&'static str, &'static str, &'static [&'static str])> {
    PLATFORM_TYPES.iter().find(|(class, _, _)| *class == name)
}

/// Returns true for types provided by the native runtime rather than the universe.
#[must_use]
pub fn is_platform_type(name: &str) -> bool {
    name == "java/lang/Object" || platform_type(name).is_some()
}

/// A compilation unit of the universe.
#[derive(Debug)]
pub struct ClassEntry {
    input: Arc<dyn ClassInput>,
    primary: bool,
    class: ClassFile,
    full: OnceLock<Arc<ClassFile>>,
}

impl ClassEntry {
    /// The input the class was read from.
    #[must_use]
    pub fn input(&self) -> &Arc<dyn ClassInput> {
        &self.input
    }

    /// True for primary inputs, false for classpath units.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// The structural parse of the class (bodies not decoded).
    #[must_use]
    pub fn class(&self) -> &ClassFile {
        &self.class
    }

    /// The fully decoded class, parsed on first use.
    ///
    /// # Errors
    /// Returns an error if a method body cannot be decoded.
    pub fn full(&self) -> Result<Arc<ClassFile>> {
        if let Some(full) = self.full.get() {
            return Ok(full.clone());
        }
        let parsed = Arc::new(ClassFile::parse(self.input.bytes(), ParseMode::Full)?);
        Ok(self.full.get_or_init(|| parsed).clone())
    }
}

/// Every class of a run, by internal name.
#[derive(Debug, Default)]
pub struct ClassUniverse {
    classes: BTreeMap<String, ClassEntry>,
}

impl ClassUniverse {
    /// Create an empty universe.
    #[must_use]
    pub fn new() -> Self {
        ClassUniverse::default()
    }

    /// Parse an input and add it.
    ///
    /// A primary input replaces nothing: a second primary definition of the same class is a
    /// hard error. A classpath unit never shadows a class that is already present.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateClass`] for a repeated primary class, or the parse error.
    pub fn insert(&mut self, input: Arc<dyn ClassInput>, primary: bool) -> Result<()> {
        let class = ClassFile::parse(input.bytes(), ParseMode::Structure)?;
        if let Some(existing) = self.classes.get(&class.name) {
            if primary && existing.primary {
                return Err(Error::DuplicateClass {
                    class: class.name.clone(),
                    first: existing.input.key().to_string(),
                    second: input.key().to_string(),
                });
            }
            if !primary || existing.primary {
                return Ok(());
            }
        }
        self.classes.insert(
            class.name.clone(),
            ClassEntry {
                input,
                primary,
                class,
                full: OnceLock::new(),
            },
        );
        Ok(())
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True if the universe is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Look up a class.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    /// The structural parse of a class.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassFile> {
        self.classes.get(name).map(ClassEntry::class)
    }

    /// All classes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.values()
    }

    /// The primary inputs in name order.
    pub fn primaries(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.values().filter(|entry| entry.primary)
    }

    /// Direct superclass of a type. Arrays and unknown types extend `java/lang/Object`.
    #[must_use]
    pub fn superclass<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if name == "java/lang/Object" {
            return None;
        }
        if let Some(class) = self.class(name) {
            return class.super_name.as_deref();
        }
        match platform_type(name) {
            Some((_, superclass, _)) => Some(superclass),
            None => Some("java/lang/Object"),
        }
    }

    /// Directly implemented interfaces of a type.
    #[must_use]
    pub fn interfaces<'a>(&'a self, name: &str) -> Vec<&'a str> {
        if name.starts_with('[') {
            return vec!["java/lang/Cloneable", "java/io/Serializable"];
        }
        if let Some(class) = self.class(name) {
            return class.interfaces.iter().map(String::as_str).collect();
        }
        match platform_type(name) {
            Some((_, _, interfaces)) => interfaces.to_vec(),
            None => Vec::new(),
        }
    }

    /// True if a value of type `sub` is assignable to `sup`.
    #[must_use]
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == "java/lang/Object" {
            return true;
        }
        if let Some(component) = sub.strip_prefix('[') {
            return match sup.strip_prefix('[') {
                Some(sup_component) => self.is_component_subtype(component, sup_component),
                None => matches!(sup, "java/lang/Cloneable" | "java/io/Serializable"),
            };
        }
        if sup.starts_with('[') {
            return false;
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([sub]);
        while let Some(current) = queue.pop_front() {
            if current == sup {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(superclass) = self.superclass(current) {
                queue.push_back(superclass);
            }
            queue.extend(self.interfaces(current));
        }
        false
    }

    fn is_component_subtype(&self, sub: &str, sup: &str) -> bool {
        match (FieldType::parse(sub), FieldType::parse(sup)) {
            (Ok(sub), Ok(sup)) => match (sub.class_name(), sup.class_name()) {
                (Some(sub), Some(sup)) => self.is_subtype(&sub, &sup),
                _ => sub == sup,
            },
            _ => false,
        }
    }

    /// The type, its superclass chain, then all interfaces, each once.
    #[must_use]
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut current = name.to_string();
        while let Some(superclass) = self.superclass(&current) {
            let superclass = superclass.to_string();
            chain.push(superclass.clone());
            current = superclass;
        }

        let mut seen: HashSet<String> = chain.iter().cloned().collect();
        let mut queue: VecDeque<String> = VecDeque::new();
        for class in &chain {
            queue.extend(self.interfaces(class).into_iter().map(str::to_string));
        }
        while let Some(interface) = queue.pop_front() {
            if !seen.insert(interface.clone()) {
                continue;
            }
            queue.extend(self.interfaces(&interface).into_iter().map(str::to_string));
            chain.push(interface);
        }
        chain
    }

    /// Resolve a field reference to the universe class declaring it.
    ///
    /// Follows field resolution order: the class itself, its superinterfaces, then its
    /// superclass. Returns `None` when the search leaves the universe.
    #[must_use]
    pub fn resolve_field(&self, owner: &str, name: &str, descriptor: &str) -> Option<String> {
        let class = self.class(owner)?;
        if class.find_field(name, descriptor).is_some() {
            return Some(owner.to_string());
        }
        for interface in &class.interfaces {
            if let Some(found) = self.resolve_field(interface, name, descriptor) {
                return Some(found);
            }
        }
        self.resolve_field(class.super_name.as_deref()?, name, descriptor)
    }

    /// Resolve a method reference to the universe class declaring it: the class and its
    /// superclasses first, then superinterfaces.
    #[must_use]
    pub fn resolve_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<String> {
        let mut current = Some(owner);
        while let Some(class_name) = current {
            let class = self.class(class_name)?;
            if class.find_method(name, descriptor).is_some() {
                return Some(class_name.to_string());
            }
            current = class.super_name.as_deref();
        }
        self.ancestors(owner)
            .into_iter()
            .filter(|ancestor| self.class(ancestor).is_some_and(ClassFile::is_interface))
            .find(|interface| {
                self.class(interface)
                    .and_then(|c| c.find_method(name, descriptor))
                    .is_some()
            })
    }

    /// Select the implementation a virtual call dispatches to for a receiver of runtime type
    /// `class`, looking only at the classes of the universe.
    ///
    /// Returns the universe class declaring the implementation, or `None` if the superclass
    /// chain leaves the universe first. The caller then consults the native runtime for the
    /// platform part of the chain and finally [`ClassUniverse::select_default`].
    #[must_use]
    pub fn select_virtual(&self, class: &str, name: &str, descriptor: &str) -> Option<String> {
        let mut current = Some(class);
        while let Some(class_name) = current {
            let entry = self.class(class_name)?;
            if entry
                .find_method(name, descriptor)
                .is_some_and(|m| !m.is_abstract() && !m.is_static())
            {
                return Some(class_name.to_string());
            }
            current = entry.super_name.as_deref();
        }
        None
    }

    /// The interface declaring a default method inherited by `class`.
    #[must_use]
    pub fn select_default(&self, class: &str, name: &str, descriptor: &str) -> Option<String> {
        self.ancestors(class)
            .into_iter()
            .filter(|ancestor| self.class(ancestor).is_some_and(ClassFile::is_interface))
            .find(|interface| {
                self.class(interface)
                    .and_then(|c| c.find_method(name, descriptor))
                    .is_some_and(|m| !m.is_abstract() && !m.is_static())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{AccessFlags, ClassBuilder, Opcode},
        config::BytesInput,
    };

    fn add(universe: &mut ClassUniverse, builder: ClassBuilder, primary: bool) {
        let class = builder.build().unwrap();
        let bytes = class.to_bytes().unwrap();
        universe
            .insert(Arc::new(BytesInput::for_class(&class.name, bytes)), primary)
            .unwrap();
    }

    fn universe() -> ClassUniverse {
        let mut universe = ClassUniverse::new();
        add(
            &mut universe,
            ClassBuilder::new("demo/Shape")
                .access(AccessFlags::PUBLIC | AccessFlags::ABSTRACT | AccessFlags::INTERFACE)
                .super_class("java/lang/Object")
                .method(AccessFlags::PUBLIC, "sides", "()I", |m| m.int(0).op(Opcode::Ireturn)),
            true,
        );
        add(
            &mut universe,
            ClassBuilder::new("demo/Base")
                .interface("demo/Shape")
                .field(AccessFlags::PROTECTED, "size", "I"),
            true,
        );
        add(
            &mut universe,
            ClassBuilder::new("demo/Square")
                .super_class("demo/Base")
                .method(AccessFlags::PUBLIC, "sides", "()I", |m| m.int(4).op(Opcode::Ireturn)),
            false,
        );
        universe
    }

    #[test]
    fn subtyping_crosses_into_platform_types() {
        let universe = universe();
        assert!(universe.is_subtype("demo/Square", "demo/Shape"));
        assert!(universe.is_subtype("demo/Square", "java/lang/Object"));
        assert!(!universe.is_subtype("demo/Base", "demo/Square"));
        assert!(universe.is_subtype(
            "java/lang/NumberFormatException",
            "java/lang/RuntimeException"
        ));
        assert!(universe.is_subtype("java/lang/Integer", "java/lang/Comparable"));
        assert!(universe.is_subtype("[Ldemo/Square;", "[Ldemo/Base;"));
        assert!(!universe.is_subtype("[I", "[J"));
        assert!(universe.is_subtype("[I", "java/lang/Cloneable"));
    }

    #[test]
    fn ancestors_list_classes_before_interfaces() {
        let universe = universe();
        assert_eq!(
            universe.ancestors("demo/Square"),
            ["demo/Square", "demo/Base", "java/lang/Object", "demo/Shape"]
        );
    }

    #[test]
    fn member_resolution() {
        let universe = universe();
        assert_eq!(
            universe.resolve_field("demo/Square", "size", "I").as_deref(),
            Some("demo/Base")
        );
        assert_eq!(
            universe.select_virtual("demo/Square", "sides", "()I").as_deref(),
            Some("demo/Square")
        );
        assert_eq!(universe.select_virtual("demo/Base", "sides", "()I"), None);
        assert_eq!(
            universe.select_default("demo/Base", "sides", "()I").as_deref(),
            Some("demo/Shape")
        );
        assert_eq!(universe.resolve_method("demo/Square", "missing", "()V"), None);
    }

    #[test]
    fn duplicate_primaries_are_rejected() {
        let mut universe = universe();
        let bytes = ClassBuilder::new("demo/Base").build().unwrap().to_bytes().unwrap();
        let err = universe
            .insert(Arc::new(BytesInput::new("other/Base.class", bytes.clone())), true)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateClass { .. }));

        // classpath copies never shadow
        universe
            .insert(Arc::new(BytesInput::new("cp/Base.class", bytes)), false)
            .unwrap();
        assert_eq!(universe.get("demo/Base").unwrap().input().key(), "demo/Base.class");
        assert!(!universe.get("demo/Square").unwrap().is_primary());
    }
}
