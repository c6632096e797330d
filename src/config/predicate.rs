//! Conditions under which a constant method may be folded.
//!
//! A constant method is only evaluated at a call site when its predicate accepts the
//! concrete [`Invocation`]. The member tested is always the implementation the call
//! dispatches to, so an unmarked override in a subclass is never folded through a marked
//! base method.

use std::{fmt, sync::Arc};

use crate::{classfile::MemberReference, emulation::ClassUniverse};

/// A call site as the predicate sees it, after argument evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// The implementation the call dispatches to.
    pub member: &'a MemberReference,
    /// Runtime class of the receiver, `None` for static calls and constructors.
    pub receiver: Option<&'a str>,
    /// Runtime classes of the arguments, `None` for primitives and null.
    pub arguments: &'a [Option<String>],
}

/// Custom predicate function.
pub type PredicateFn = dyn Fn(&Invocation<'_>) -> bool + Send + Sync;

/// Decides whether a constant method may be folded at a call site.
#[derive(Clone, Default)]
pub enum ReconstructorPredicate {
    /// Every call is folded.
    #[default]
    AllowAll,
    /// Only calls whose receiver's runtime class is exactly this type.
    ExactType(String),
    /// Only calls whose receiver is an instance of this type.
    InstanceOf(String),
    /// A host-supplied test.
    Custom(Arc<PredicateFn>),
}

impl ReconstructorPredicate {
    /// Wrap a closure as a predicate.
    pub fn custom(test: impl Fn(&Invocation<'_>) -> bool + Send + Sync + 'static) -> Self {
        ReconstructorPredicate::Custom(Arc::new(test))
    }

    /// Test an invocation.
    ///
    /// The type predicates reject calls without a receiver.
    #[must_use]
    pub fn allows(&self, invocation: &Invocation<'_>, universe: &ClassUniverse) -> bool {
        match self {
            ReconstructorPredicate::AllowAll => true,
            ReconstructorPredicate::ExactType(class) => invocation.receiver == Some(class.as_str()),
            ReconstructorPredicate::InstanceOf(class) => invocation
                .receiver
                .is_some_and(|receiver| universe.is_subtype(receiver, class)),
            ReconstructorPredicate::Custom(test) => test(invocation),
        }
    }
}

impl fmt::Debug for ReconstructorPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconstructorPredicate::AllowAll => f.write_str("AllowAll"),
            ReconstructorPredicate::ExactType(class) => write!(f, "ExactType({class})"),
            ReconstructorPredicate::InstanceOf(class) => write!(f, "InstanceOf({class})"),
            ReconstructorPredicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call<'a>(member: &'a MemberReference, receiver: Option<&'a str>) -> Invocation<'a> {
        Invocation {
            member,
            receiver,
            arguments: &[],
        }
    }

    #[test]
    fn type_predicates_need_a_receiver() {
        let universe = ClassUniverse::new();
        let member = MemberReference::new("java/lang/String", "length", "()I");

        let exact = ReconstructorPredicate::ExactType("java/lang/String".into());
        assert!(exact.allows(&call(&member, Some("java/lang/String")), &universe));
        assert!(!exact.allows(&call(&member, None), &universe));

        let instance = ReconstructorPredicate::InstanceOf("java/lang/CharSequence".into());
        assert!(instance.allows(&call(&member, Some("java/lang/String")), &universe));
        assert!(!instance.allows(&call(&member, Some("java/lang/Integer")), &universe));
        assert!(!instance.allows(&call(&member, None), &universe));
    }

    #[test]
    fn custom_predicates_see_the_member() {
        let universe = ClassUniverse::new();
        let member = MemberReference::new("demo/Codes", "lookup", "(I)I");
        let predicate = ReconstructorPredicate::custom(|call| call.member.name == "lookup");
        assert!(predicate.allows(&call(&member, None), &universe));
        assert_eq!(format!("{predicate:?}"), "Custom(..)");
        assert!(ReconstructorPredicate::default().allows(&call(&member, None), &universe));
    }
}
