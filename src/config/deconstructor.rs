//! Reconstruction recipes.
//!
//! A value without a literal encoding can still be folded if the rewriter can emit code
//! that produces an equal value. The configuration describes how, per declared type:
//!
//! - [`DeconstructorConfiguration`] - a constructor, static factory or static field, plus
//!   the accessors that extract the arguments from an instance
//! - [`DeconstructionSelector`] - the ordered alternatives tried for a type
//!
//! Selectors are flattened once when the configuration is built, so the folding engine
//! only ever sees a [`DeconstructionSelector::FirstMatch`] of leaf variants with the
//! static-field equality candidates in front.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::classfile::{FieldType, MemberReference};

/// How a recipe produces its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecipeKind {
    /// `new Owner(args...)`
    Constructor,
    /// `Owner.name(args...)`, a static method
    Factory,
    /// `Owner.name`, a static field read
    StaticField,
}

/// Whether an accessor reads a field or calls a getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorKind {
    /// An instance field read.
    Field,
    /// A zero-argument instance method call.
    Getter,
}

/// Extracts one constituent value from an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeconstructionDataAccessor {
    /// Field read or getter call
    pub kind: AccessorKind,
    /// The field, or the getter with a `()T` descriptor
    pub member: MemberReference,
    /// The type the extracted value is passed to the recipe as
    pub encoded_as: FieldType,
}

impl DeconstructionDataAccessor {
    /// An accessor calling `owner.name()` returning `encoded_as`.
    pub fn getter(owner: impl Into<String>, name: impl Into<String>, encoded_as: FieldType) -> Self {
        let descriptor = format!("(){}", encoded_as.descriptor());
        DeconstructionDataAccessor {
            kind: AccessorKind::Getter,
            member: MemberReference::new(owner, name, descriptor),
            encoded_as,
        }
    }

    /// An accessor reading the instance field `owner.name`.
    pub fn field(owner: impl Into<String>, name: impl Into<String>, encoded_as: FieldType) -> Self {
        let descriptor = encoded_as.descriptor();
        DeconstructionDataAccessor {
            kind: AccessorKind::Field,
            member: MemberReference::new(owner, name, descriptor),
            encoded_as,
        }
    }
}

/// A single reconstruction recipe.
///
/// Equality and hashing only consider owner, name, kind and descriptor: two recipes naming
/// the same member are the same recipe regardless of how their accessors were resolved.
#[derive(Debug, Clone)]
pub struct DeconstructorConfiguration {
    member: MemberReference,
    kind: RecipeKind,
    accessors: Vec<DeconstructionDataAccessor>,
}

impl DeconstructorConfiguration {
    /// `new owner(args)`, with one accessor per constructor parameter.
    pub fn constructor(
        owner: impl Into<String>,
        descriptor: impl Into<String>,
        accessors: Vec<DeconstructionDataAccessor>,
    ) -> Self {
        DeconstructorConfiguration {
            member: MemberReference::new(owner, "<init>", descriptor),
            kind: RecipeKind::Constructor,
            accessors,
        }
    }

    /// `owner.name(args)`, with one accessor per factory parameter.
    pub fn factory(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        accessors: Vec<DeconstructionDataAccessor>,
    ) -> Self {
        DeconstructorConfiguration {
            member: MemberReference::new(owner, name, descriptor),
            kind: RecipeKind::Factory,
            accessors,
        }
    }

    /// A read of the static field `owner.name`.
    pub fn static_field(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        DeconstructorConfiguration {
            member: MemberReference::new(owner, name, descriptor),
            kind: RecipeKind::StaticField,
            accessors: Vec::new(),
        }
    }

    /// The constructor, factory or field the recipe emits.
    #[must_use]
    pub fn member(&self) -> &MemberReference {
        &self.member
    }

    /// How the recipe produces its value.
    #[must_use]
    pub fn kind(&self) -> RecipeKind {
        self.kind
    }

    /// Argument accessors, in parameter order.
    #[must_use]
    pub fn accessors(&self) -> &[DeconstructionDataAccessor] {
        &self.accessors
    }

    /// True for constructor and factory recipes.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.kind != RecipeKind::StaticField
    }
}

impl PartialEq for DeconstructorConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.member == other.member
    }
}

impl Eq for DeconstructorConfiguration {}

impl Hash for DeconstructorConfiguration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.member.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for DeconstructorConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.member)
    }
}

/// The alternatives tried to reconstruct values of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeconstructionSelector {
    /// Reconstruct with a single recipe.
    Recipe(DeconstructorConfiguration),
    /// Reuse the first of these static fields whose value equals the target.
    StaticFieldEquality(Vec<MemberReference>),
    /// Try each alternative in order.
    FirstMatch(Vec<DeconstructionSelector>),
}

impl DeconstructionSelector {
    /// Flatten nested [`DeconstructionSelector::FirstMatch`] lists and move the static-field
    /// equality variants in front of the recipes, keeping the order within each group.
    /// Static-field recipes join the equality list.
    ///
    /// Equality lists are merged into one, dropping repeated fields. A result with a single
    /// alternative is returned as that alternative.
    #[must_use]
    pub fn flatten(self) -> DeconstructionSelector {
        let mut fields: Vec<MemberReference> = Vec::new();
        let mut recipes: Vec<DeconstructorConfiguration> = Vec::new();
        self.collect(&mut fields, &mut recipes);

        let mut alternatives = Vec::with_capacity(recipes.len() + 1);
        if !fields.is_empty() {
            alternatives.push(DeconstructionSelector::StaticFieldEquality(fields));
        }
        alternatives.extend(recipes.into_iter().map(DeconstructionSelector::Recipe));

        if alternatives.len() == 1 {
            if let Some(single) = alternatives.pop() {
                return single;
            }
        }
        DeconstructionSelector::FirstMatch(alternatives)
    }

    fn collect(self, fields: &mut Vec<MemberReference>, recipes: &mut Vec<DeconstructorConfiguration>) {
        match self {
            DeconstructionSelector::Recipe(recipe) if recipe.kind() == RecipeKind::StaticField => {
                if !fields.contains(recipe.member()) {
                    fields.push(recipe.member);
                }
            }
            DeconstructionSelector::Recipe(recipe) => {
                if !recipes.contains(&recipe) {
                    recipes.push(recipe);
                }
            }
            DeconstructionSelector::StaticFieldEquality(candidates) => {
                for field in candidates {
                    if !fields.contains(&field) {
                        fields.push(field);
                    }
                }
            }
            DeconstructionSelector::FirstMatch(alternatives) => {
                for alternative in alternatives {
                    alternative.collect(fields, recipes);
                }
            }
        }
    }

    /// The leaf alternatives in the order they are tried.
    #[must_use]
    pub fn alternatives(&self) -> Vec<&DeconstructionSelector> {
        match self {
            DeconstructionSelector::FirstMatch(alternatives) => {
                alternatives.iter().flat_map(DeconstructionSelector::alternatives).collect()
            }
            leaf => vec![leaf],
        }
    }

    /// The executable recipes among the alternatives.
    #[must_use]
    pub fn executable_recipes(&self) -> Vec<&DeconstructorConfiguration> {
        self.alternatives()
            .into_iter()
            .filter_map(|alternative| match alternative {
                DeconstructionSelector::Recipe(recipe) if recipe.is_executable() => Some(recipe),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero() -> MemberReference {
        MemberReference::new("demo/BigNum", "ZERO", "Ldemo/BigNum;")
    }

    fn one() -> MemberReference {
        MemberReference::new("demo/BigNum", "ONE", "Ldemo/BigNum;")
    }

    fn ten() -> MemberReference {
        MemberReference::new("demo/BigNum", "TEN", "Ldemo/BigNum;")
    }

    fn ctor() -> DeconstructorConfiguration {
        DeconstructorConfiguration::constructor(
            "demo/BigNum",
            "(I)V",
            vec![DeconstructionDataAccessor::getter("demo/BigNum", "value", FieldType::Int)],
        )
    }

    #[test]
    fn flatten_puts_equality_first() {
        let selector = DeconstructionSelector::FirstMatch(vec![
            DeconstructionSelector::Recipe(ctor()),
            DeconstructionSelector::FirstMatch(vec![
                DeconstructionSelector::StaticFieldEquality(vec![zero()]),
                DeconstructionSelector::StaticFieldEquality(vec![one(), zero()]),
            ]),
            DeconstructionSelector::Recipe(DeconstructorConfiguration::static_field(
                "demo/BigNum",
                "TEN",
                "Ldemo/BigNum;",
            )),
        ]);

        let flat = selector.flatten();
        assert_eq!(
            flat,
            DeconstructionSelector::FirstMatch(vec![
                DeconstructionSelector::StaticFieldEquality(vec![zero(), one(), ten()]),
                DeconstructionSelector::Recipe(ctor()),
            ])
        );
        assert_eq!(flat.alternatives().len(), 2);
        assert_eq!(flat.executable_recipes(), vec![&ctor()]);
    }

    #[test]
    fn single_alternative_is_unwrapped() {
        let selector = DeconstructionSelector::FirstMatch(vec![DeconstructionSelector::FirstMatch(
            vec![DeconstructionSelector::Recipe(ctor())],
        )]);
        assert_eq!(selector.flatten(), DeconstructionSelector::Recipe(ctor()));
    }

    #[test]
    fn recipe_equality_ignores_accessors() {
        let bare = DeconstructorConfiguration::constructor("demo/BigNum", "(I)V", Vec::new());
        assert_eq!(bare, ctor());
        assert_ne!(
            bare,
            DeconstructorConfiguration::factory("demo/BigNum", "<init>", "(I)V", Vec::new())
        );
        assert_eq!(ctor().accessors()[0].member.descriptor, "()I");
        assert_eq!(ctor().to_string(), "demo.BigNum.<init> (I)V");
    }
}
