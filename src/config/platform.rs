//! Built-in configuration for platform classes.
//!
//! Platform classes carry no markers, so
//! [`RunConfigurationBuilder::platform_defaults`](crate::config::RunConfigurationBuilder::platform_defaults)
//! supplies their configuration:
//!
//! | Owner | Constant members |
//! |-------|------------------|
//! | `String` | every native except the array and `Object` conversions |
//! | `Integer` ... `Character` | every native |
//! | `Math` | every native |
//! | `Enum` | `name`, `toString`, `ordinal`, `equals`, `compareTo`, `getDeclaringClass`, `valueOf` |
//! | `StringBuilder` | constructors, `append` of primitives and strings, `length`, `toString` |
//!
//! The members come from the [`NativeRegistry`], so only members the emulator can execute
//! are ever marked. All of them are `AllowAll`: the owners are final, or the member checked
//! is the implementation the receiver dispatches to.
//!
//! Each wrapper class also gets its boxing factory as recipe (`Integer.valueOf(int)` with
//! accessor `intValue()` and so on), which makes boxed results reconstructable.

use crate::{
    classfile::{FieldType, MemberReference},
    config::{
        deconstructor::{DeconstructionDataAccessor, DeconstructionSelector, DeconstructorConfiguration},
        predicate::ReconstructorPredicate,
    },
    emulation::NativeRegistry,
};

const PURE_OWNERS: &[&str] = &[
    "java/lang/String",
    "java/lang/Integer",
    "java/lang/Long",
    "java/lang/Short",
    "java/lang/Byte",
    "java/lang/Float",
    "java/lang/Double",
    "java/lang/Boolean",
    "java/lang/Character",
    "java/lang/Math",
];

/// Members of the pure owners that take or produce arrays or call user code.
const EXCLUDED: &[(&str, &str, &str)] = &[
    ("java/lang/String", "<init>", "([C)V"),
    ("java/lang/String", "<init>", "([CII)V"),
    ("java/lang/String", "<init>", "(Ljava/lang/StringBuilder;)V"),
    ("java/lang/String", "toCharArray", "()[C"),
    ("java/lang/String", "valueOf", "([C)Ljava/lang/String;"),
    ("java/lang/String", "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;"),
    (
        "java/lang/String",
        "join",
        "(Ljava/lang/CharSequence;[Ljava/lang/CharSequence;)Ljava/lang/String;",
    ),
];

const ENUM_MEMBERS: &[(&str, &str)] = &[
    ("name", "()Ljava/lang/String;"),
    ("toString", "()Ljava/lang/String;"),
    ("ordinal", "()I"),
    ("equals", "(Ljava/lang/Object;)Z"),
    ("compareTo", "(Ljava/lang/Enum;)I"),
    ("compareTo", "(Ljava/lang/Object;)I"),
    ("getDeclaringClass", "()Ljava/lang/Class;"),
    ("valueOf", "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;"),
];

const BUILDER_MEMBERS: &[(&str, &str)] = &[
    ("<init>", "()V"),
    ("<init>", "(I)V"),
    ("<init>", "(Ljava/lang/String;)V"),
    ("append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;"),
    ("append", "(I)Ljava/lang/StringBuilder;"),
    ("append", "(J)Ljava/lang/StringBuilder;"),
    ("append", "(F)Ljava/lang/StringBuilder;"),
    ("append", "(D)Ljava/lang/StringBuilder;"),
    ("append", "(Z)Ljava/lang/StringBuilder;"),
    ("append", "(C)Ljava/lang/StringBuilder;"),
    ("length", "()I"),
    ("toString", "()Ljava/lang/String;"),
];

/// Wrapper class, boxed primitive, unboxing getter.
const BOXING: &[(&str, FieldType, &str)] = &[
    ("java/lang/Integer", FieldType::Int, "intValue"),
    ("java/lang/Long", FieldType::Long, "longValue"),
    ("java/lang/Short", FieldType::Short, "shortValue"),
    ("java/lang/Byte", FieldType::Byte, "byteValue"),
    ("java/lang/Float", FieldType::Float, "floatValue"),
    ("java/lang/Double", FieldType::Double, "doubleValue"),
    ("java/lang/Boolean", FieldType::Boolean, "booleanValue"),
    ("java/lang/Character", FieldType::Char, "charValue"),
];

/// The constant platform members.
pub(crate) fn constant_methods(natives: &NativeRegistry) -> Vec<(MemberReference, ReconstructorPredicate)> {
    let mut members: Vec<MemberReference> = natives
        .members()
        .filter(|m| PURE_OWNERS.contains(&m.owner.as_str()))
        .filter(|m| {
            !EXCLUDED
                .iter()
                .any(|(owner, name, descriptor)| m.owner == *owner && m.name == *name && m.descriptor == *descriptor)
        })
        .cloned()
        .collect();

    let listed = ENUM_MEMBERS
        .iter()
        .map(|(name, descriptor)| MemberReference::new("java/lang/Enum", *name, *descriptor))
        .chain(
            BUILDER_MEMBERS
                .iter()
                .map(|(name, descriptor)| MemberReference::new("java/lang/StringBuilder", *name, *descriptor)),
        );
    members.extend(listed.filter(|m| natives.contains(m)));

    members.sort();
    members.dedup();
    members
        .into_iter()
        .map(|member| (member, ReconstructorPredicate::AllowAll))
        .collect()
}

/// Boxing factories as recipes, keyed by wrapper class.
pub(crate) fn recipes() -> Vec<(String, DeconstructionSelector)> {
    BOXING
        .iter()
        .map(|(class, primitive, getter)| {
            let descriptor = format!("({})L{class};", primitive.descriptor());
            let accessor = DeconstructionDataAccessor::getter(*class, *getter, primitive.clone());
            let recipe = DeconstructorConfiguration::factory(*class, "valueOf", descriptor, vec![accessor]);
            ((*class).to_string(), DeconstructionSelector::Recipe(recipe))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_parsing_but_not_user_callbacks() {
        let methods = constant_methods(&NativeRegistry::platform());
        let has = |owner: &str, name: &str, descriptor: &str| {
            methods
                .iter()
                .any(|(m, _)| *m == MemberReference::new(owner, name, descriptor))
        };
        assert!(has("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I"));
        assert!(has("java/lang/Enum", "equals", "(Ljava/lang/Object;)Z"));
        assert!(has("java/lang/Math", "max", "(II)I"));
        assert!(!has("java/lang/String", "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;"));
        assert!(!has("java/lang/Enum", "hashCode", "()I"));
        assert!(!has("java/lang/System", "identityHashCode", "(Ljava/lang/Object;)I"));
    }

    #[test]
    fn every_wrapper_has_a_boxing_recipe() {
        let recipes = recipes();
        assert_eq!(recipes.len(), 8);
        let (class, DeconstructionSelector::Recipe(recipe)) = &recipes[0] else {
            panic!("expected a recipe");
        };
        assert_eq!(class, "java/lang/Integer");
        assert_eq!(recipe.member().descriptor, "(I)Ljava/lang/Integer;");
        assert_eq!(recipe.accessors()[0].member.descriptor, "()I");
    }
}
