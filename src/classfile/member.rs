//! Structural member addressing.
//!
//! [`MemberReference`] names a field, method or constructor anywhere in the class universe by
//! owner, name and descriptor. [`NameDescriptor`] is the owner-less key used inside a single
//! class to tell overloads apart. Both are plain values: cheap to clone, structurally compared,
//! and totally ordered so that maps keyed by them iterate deterministically.

use std::fmt;

/// (owning type, member name, member descriptor)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberReference {
    /// Internal name of the owning type (`java/lang/Integer`)
    pub owner: String,
    /// Member name (`parseInt`, `<init>`)
    pub name: String,
    /// Field or method descriptor
    pub descriptor: String,
}

impl MemberReference {
    /// Create a new member reference.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        MemberReference {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// The owner-less part of this reference.
    #[must_use]
    pub fn name_descriptor(&self) -> NameDescriptor {
        NameDescriptor::new(self.name.clone(), self.descriptor.clone())
    }

    /// The same name and descriptor on another owner.
    #[must_use]
    pub fn with_owner(&self, owner: impl Into<String>) -> MemberReference {
        MemberReference {
            owner: owner.into(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }

    /// True for instance initializers.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// True for a method descriptor, false for a field descriptor.
    #[must_use]
    pub fn is_method(&self) -> bool {
        self.descriptor.starts_with('(')
    }
}

impl fmt::Display for MemberReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {}",
            self.owner.replace('/', "."),
            self.name,
            self.descriptor
        )
    }
}

/// (name, descriptor) key of a member within one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameDescriptor {
    /// Member name
    pub name: String,
    /// Field or method descriptor
    pub descriptor: String,
}

impl NameDescriptor {
    /// Create a new key.
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        NameDescriptor {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Attach an owner.
    #[must_use]
    pub fn on(&self, owner: impl Into<String>) -> MemberReference {
        MemberReference::new(owner, self.name.clone(), self.descriptor.clone())
    }
}

impl fmt::Display for NameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn ordering_is_deterministic() {
        let set: BTreeSet<_> = [
            NameDescriptor::new("value", "()I"),
            NameDescriptor::new("<init>", "(I)V"),
            NameDescriptor::new("value", "()J"),
        ]
        .into_iter()
        .collect();
        let names: Vec<_> = set.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["<init>(I)V", "value()I", "value()J"]);
    }

    #[test]
    fn display_uses_dotted_owner() {
        let member = MemberReference::new("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I");
        assert_eq!(
            member.to_string(),
            "java.lang.Integer.parseInt (Ljava/lang/String;)I"
        );
        assert!(member.is_method());
        assert!(!member.is_constructor());
        assert_eq!(member.name_descriptor().on("java/lang/Long").owner, "java/lang/Long");
    }
}
