//! Reconstruction of values without a literal form.
//!
//! When a folded value is an object other than a string or class, the rewriter needs code
//! that produces an equal object. The [`Deconstructor`] looks up the selector of the value's
//! runtime class and tries its alternatives in order:
//!
//! 1. **Reusable instances**: read each candidate static field and compare with `equals`.
//!    Candidates that the rewrite site could observe before their assignment are skipped.
//! 2. **Recipes**: extract the arguments through the accessors, encode each one (literally or
//!    by recursive reconstruction), then run the recipe in the emulator and compare the result
//!    with the original value. Only a faithful recipe is used.
//!
//! Recursion is bounded by [`MAX_DEPTH`] and by a cycle check over the objects currently
//! being reconstructed, so self-referential graphs fail instead of looping.

use std::slice;

use crate::{
    classfile::{FieldType, Instruction, MemberReference, MethodDescriptor, Opcode},
    config::{AccessorKind, DeconstructionSelector, DeconstructorConfiguration, RecipeKind, RunConfiguration},
    emulation::{ClassUniverse, EmulationError, ExecutionContext, HeapRef, InvokeKind, Value},
    folding::{analysis::InitOrder, evaluator},
};

/// Maximum nesting of recursive reconstructions.
pub const MAX_DEPTH: usize = 32;

/// Code reproducing a value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reconstruction {
    /// Instructions leaving the value on the stack.
    pub code: Vec<Instruction>,
    /// Static type of the value the code leaves, internal name or array descriptor.
    pub produces: String,
    /// The recipe or field used, for the event log.
    pub recipe: String,
}

/// Searches for code reproducing a value at one rewrite site.
pub(crate) struct Deconstructor<'a> {
    config: &'a RunConfiguration,
    order: &'a InitOrder,
    index: usize,
    visiting: Vec<HeapRef>,
}

impl<'a> Deconstructor<'a> {
    /// A deconstructor for the instruction at `index` of the method `order` describes.
    pub(crate) fn new(config: &'a RunConfiguration, order: &'a InitOrder, index: usize) -> Self {
        Deconstructor {
            config,
            order,
            index,
            visiting: Vec::new(),
        }
    }

    /// Find code reproducing `value`.
    ///
    /// The error describes why every alternative failed.
    pub(crate) fn reconstruct(&mut self, ctx: &mut ExecutionContext<'_>, value: Value) -> Result<Reconstruction, String> {
        let Some(reference) = value.reference() else {
            return Err(format!("{} value has no recipe", value.type_name()));
        };
        ctx.begin_evaluation();
        self.rebuild(ctx, reference, value, 0)
    }

    fn rebuild(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        reference: HeapRef,
        value: Value,
        depth: usize,
    ) -> Result<Reconstruction, String> {
        if depth >= MAX_DEPTH {
            return Err(format!("reconstruction nested deeper than {MAX_DEPTH} levels"));
        }
        if self.visiting.contains(&reference) {
            return Err("object graph is cyclic".to_string());
        }
        let class = ctx.heap().get(reference).class_name();
        let Some(selector) = self.config.selector_for(&class) else {
            return Err(format!("no recipe for {}", class.replace('/', ".")));
        };

        self.visiting.push(reference);
        let result = self.first_match(ctx, &selector, value, depth, &class);
        self.visiting.pop();
        result
    }

    fn first_match(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        selector: &DeconstructionSelector,
        value: Value,
        depth: usize,
        class: &str,
    ) -> Result<Reconstruction, String> {
        let mut reasons = Vec::new();
        for alternative in selector.alternatives() {
            let attempt = match alternative {
                DeconstructionSelector::StaticFieldEquality(fields) => self.reuse(ctx, fields, value),
                DeconstructionSelector::Recipe(recipe) if recipe.kind() == RecipeKind::StaticField => {
                    self.reuse(ctx, slice::from_ref(recipe.member()), value)
                }
                DeconstructionSelector::Recipe(recipe) => self.execute(ctx, recipe, value, depth),
                DeconstructionSelector::FirstMatch(_) => continue,
            };
            match attempt {
                Ok(reconstruction) => return Ok(reconstruction),
                Err(reason) => reasons.push(reason),
            }
        }
        Err(format!(
            "no recipe reproduces {}: {}",
            class.replace('/', "."),
            reasons.join("; ")
        ))
    }

    fn reuse(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        fields: &[MemberReference],
        value: Value,
    ) -> Result<Reconstruction, String> {
        let mut forward = 0usize;
        for field in fields {
            if !self.order.reusable(field, self.index, self.config.universe()) {
                forward += 1;
                continue;
            }
            let Ok(candidate) = ctx.get_static(field) else {
                continue;
            };
            let equal = candidate.identical(&value) || ctx.java_equals(candidate, value).unwrap_or(false);
            if equal {
                let produces = FieldType::parse(&field.descriptor)
                    .ok()
                    .and_then(|t| t.class_name())
                    .unwrap_or_else(|| field.owner.clone());
                return Ok(Reconstruction {
                    code: vec![Instruction::Field {
                        opcode: Opcode::Getstatic,
                        member: field.clone(),
                    }],
                    produces,
                    recipe: field.to_string(),
                });
            }
        }
        if forward > 0 {
            Err(format!("no equal instance among {} fields ({forward} not yet assigned)", fields.len()))
        } else {
            Err(format!("no equal instance among {} fields", fields.len()))
        }
    }

    fn execute(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        recipe: &DeconstructorConfiguration,
        value: Value,
        depth: usize,
    ) -> Result<Reconstruction, String> {
        let member = recipe.member();
        let mut code = Vec::new();
        if recipe.kind() == RecipeKind::Constructor {
            code.push(Instruction::Type {
                opcode: Opcode::New,
                class: member.owner.clone(),
            });
            code.push(Instruction::Simple(Opcode::Dup));
        }

        let mut arguments = Vec::with_capacity(recipe.accessors().len());
        for accessor in recipe.accessors() {
            let extracted = match accessor.kind {
                AccessorKind::Getter => ctx
                    .invoke(InvokeKind::Virtual, &accessor.member, vec![value])
                    .map_err(|e| format!("{}: {}", accessor.member, ctx.describe_error(&e)))?
                    .ok_or_else(|| format!("{} returned no value", accessor.member))?,
                AccessorKind::Field => ctx
                    .get_field(value, &accessor.member)
                    .map_err(|e| format!("{}: {}", accessor.member, ctx.describe_error(&e)))?,
            };
            code.extend(self.encode(ctx, extracted, &accessor.encoded_as, depth)?);
            arguments.push(extracted);
        }

        let rebuilt = match recipe.kind() {
            RecipeKind::Constructor => ctx.construct(member, arguments),
            _ => ctx
                .invoke(InvokeKind::Static, member, arguments)
                .and_then(|v| v.ok_or_else(|| EmulationError::Unsupported(format!("{member} returned no value")))),
        }
        .map_err(|e| format!("{recipe}: {}", ctx.describe_error(&e)))?;

        let faithful = rebuilt.identical(&value)
            || ctx
                .java_equals(rebuilt, value)
                .map_err(|e| format!("{recipe}: equals {}", ctx.describe_error(&e)))?;
        if !faithful {
            return Err(format!("{recipe} does not reproduce an equal value"));
        }

        let universe = self.config.universe();
        let (opcode, produces) = match recipe.kind() {
            RecipeKind::Constructor => (Opcode::Invokespecial, member.owner.clone()),
            _ => (
                Opcode::Invokestatic,
                MethodDescriptor::parse(&member.descriptor)
                    .ok()
                    .and_then(|d| d.return_type)
                    .and_then(|t| t.class_name())
                    .unwrap_or_else(|| member.owner.clone()),
            ),
        };
        code.push(Instruction::Invoke {
            opcode,
            member: member.clone(),
            interface: universe.class(&member.owner).is_some_and(|c| c.is_interface()),
        });
        Ok(Reconstruction {
            code,
            produces,
            recipe: recipe.to_string(),
        })
    }

    /// Code for one recipe argument.
    fn encode(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        value: Value,
        encoded_as: &FieldType,
        depth: usize,
    ) -> Result<Vec<Instruction>, String> {
        if let Some(code) = evaluator::literal(ctx, value) {
            return Ok(code);
        }
        let Some(reference) = value.reference() else {
            return Err(format!("{} argument has no literal form", value.type_name()));
        };
        let nested = self.rebuild(ctx, reference, value, depth + 1)?;
        let mut code = nested.code;
        if let Some(cast) = cast_needed(self.config.universe(), &nested.produces, encoded_as) {
            code.push(Instruction::Type {
                opcode: Opcode::Checkcast,
                class: cast,
            });
        }
        Ok(code)
    }
}

/// The class to cast to when code producing `produces` replaces a value of type `expected`.
pub(crate) fn cast_needed(universe: &ClassUniverse, produces: &str, expected: &FieldType) -> Option<String> {
    let expected = expected.class_name()?;
    if expected == "java/lang/Object" || expected == produces || universe.is_subtype(produces, &expected) {
        return None;
    }
    Some(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casts_only_for_unrelated_types() {
        let universe = ClassUniverse::new();
        let object = FieldType::Object("java/lang/Object".into());
        let number = FieldType::Object("java/lang/Number".into());
        let integer = FieldType::Object("java/lang/Integer".into());

        assert_eq!(cast_needed(&universe, "java/lang/Integer", &object), None);
        assert_eq!(cast_needed(&universe, "java/lang/Integer", &integer), None);
        assert_eq!(cast_needed(&universe, "java/lang/Integer", &number), None);
        assert_eq!(cast_needed(&universe, "java/lang/Integer", &FieldType::Int), None);
        assert_eq!(
            cast_needed(&universe, "java/lang/Number", &integer),
            Some("java/lang/Integer".to_string())
        );
    }
}
