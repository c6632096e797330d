//! Marker scan over the class universe.
//!
//! The scan reads every class of the universe in name order, primary inputs and classpath
//! alike, using only the structural parse. It collects:
//!
//! | Marker | On | Effect |
//! |--------|----|--------|
//! | `ConstantType` | class | every member of the type is constant |
//! | `Constant` | static field | constant field |
//! | `Constant` | instance field | constant field, read from folded receivers |
//! | `Constant` | static method, constructor | constant method, `AllowAll` |
//! | `Constant` | instance method | constant method, `InstanceOf(declaring type)` |
//! | `Reconstructor` | static field | reusable instance of the field's type |
//! | `Reconstructor` | constructor | constructor recipe for the owner |
//! | `Reconstructor` | static method | factory recipe for the returned type |
//!
//! Enum classes need no markers: enumerators become constant fields and reusable
//! instances, and `valueOf(String)` becomes the factory with accessor `Enum.name()`.
//!
//! Every other placement of a marker fails the scan with [`Error::InvalidMarker`].

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    classfile::{AccessFlags, ClassFile, FieldNode, FieldType, MemberReference, MethodDescriptor, MethodNode},
    config::{
        deconstructor::{DeconstructionDataAccessor, DeconstructionSelector, DeconstructorConfiguration},
        predicate::ReconstructorPredicate,
        CONSTANT, CONSTANT_TYPE, RECONSTRUCTOR,
    },
    emulation::ClassUniverse,
    folding::EventLog,
    Error, Result,
};

/// Getter through which enum values are reconstructed.
pub(crate) const ENUM_NAME: (&str, &str) = ("java/lang/Enum", "name");

/// Configuration collected from markers.
#[derive(Debug, Default)]
pub(crate) struct ScanResult {
    pub constant_types: BTreeSet<String>,
    pub constant_fields: BTreeSet<MemberReference>,
    pub constant_methods: BTreeMap<MemberReference, ReconstructorPredicate>,
    /// Alternatives per value type, in discovery order
    pub selectors: BTreeMap<String, Vec<DeconstructionSelector>>,
}

struct Scanner<'a> {
    universe: &'a ClassUniverse,
    events: &'a EventLog,
    result: ScanResult,
    /// The executable recipe registered for each type
    executables: BTreeMap<String, DeconstructorConfiguration>,
    /// Enum factories, added after the scan where no explicit recipe exists
    enum_factories: Vec<(String, DeconstructorConfiguration)>,
}

/// Scan a universe for configuration markers.
///
/// # Errors
/// Returns the first configuration defect: [`Error::InvalidMarker`],
/// [`Error::DuplicateReconstructor`], [`Error::MissingParameterNames`],
/// [`Error::MissingAccessor`] or [`Error::AmbiguousAccessor`].
pub(crate) fn scan(universe: &ClassUniverse, events: &EventLog) -> Result<ScanResult> {
    let mut scanner = Scanner {
        universe,
        events,
        result: ScanResult::default(),
        executables: BTreeMap::new(),
        enum_factories: Vec::new(),
    };

    for entry in universe.iter() {
        scanner.scan_class(entry.class())?;
    }

    for (value_type, factory) in std::mem::take(&mut scanner.enum_factories) {
        if scanner.executables.contains_key(&value_type) {
            continue;
        }
        scanner.add_selector(&value_type, DeconstructionSelector::Recipe(factory));
    }
    Ok(scanner.result)
}

fn invalid(member: &MemberReference, reason: &str) -> Error {
    Error::InvalidMarker {
        member: member.to_string(),
        reason: reason.to_string(),
    }
}

impl Scanner<'_> {
    fn add_selector(&mut self, value_type: &str, selector: DeconstructionSelector) {
        self.result
            .selectors
            .entry(value_type.to_string())
            .or_default()
            .push(selector);
    }

    fn scan_class(&mut self, class: &ClassFile) -> Result<()> {
        if class.has_annotation(CONSTANT_TYPE) {
            self.result.constant_types.insert(class.name.clone());
        }
        if class.is_enum() {
            self.scan_enum(class);
        }
        for field in &class.fields {
            self.scan_field(class, field)?;
        }
        for method in &class.methods {
            self.scan_method(class, method)?;
        }
        Ok(())
    }

    fn scan_enum(&mut self, class: &ClassFile) {
        let own_type = format!("L{};", class.name);
        let enumerators: Vec<MemberReference> = class
            .fields
            .iter()
            .filter(|f| f.access.contains(AccessFlags::ENUM | AccessFlags::STATIC))
            .filter(|f| f.descriptor == own_type)
            .map(|f| class.field_reference(f))
            .collect();

        self.result.constant_fields.extend(enumerators.iter().cloned());
        if !enumerators.is_empty() {
            self.add_selector(&class.name, DeconstructionSelector::StaticFieldEquality(enumerators));
        }

        let value_of = format!("(Ljava/lang/String;){own_type}");
        match class.find_method("valueOf", &value_of) {
            Some(method) if method.is_static() => {
                let factory = DeconstructorConfiguration::factory(
                    class.name.clone(),
                    "valueOf",
                    value_of,
                    vec![DeconstructionDataAccessor::getter(
                        ENUM_NAME.0,
                        ENUM_NAME.1,
                        FieldType::Object("java/lang/String".to_string()),
                    )],
                );
                self.enum_factories.push((class.name.clone(), factory));
            }
            _ => self.events.info(format!(
                "enum {} has no valueOf(String); only its enumerators are reusable",
                class.name.replace('/', ".")
            )),
        }
    }

    fn scan_field(&mut self, class: &ClassFile, field: &FieldNode) -> Result<()> {
        let member = class.field_reference(field);
        if field.has_annotation(CONSTANT) {
            self.result.constant_fields.insert(member.clone());
        }
        if !field.has_annotation(RECONSTRUCTOR) {
            return Ok(());
        }

        if !field.is_static() {
            return Err(invalid(&member, "reusable instances must be static fields"));
        }
        let value_type = match FieldType::parse(&field.descriptor)? {
            FieldType::Object(name) => name,
            FieldType::Array(_) => return Err(invalid(&member, "array-typed fields cannot be reused")),
            _ => return Err(invalid(&member, "primitive-typed fields need no reconstruction")),
        };
        if field.access.intersects(AccessFlags::TRANSIENT | AccessFlags::SYNTHETIC) {
            self.events.warn(format!("skipping transient or synthetic reusable instance {member}"));
            return Ok(());
        }
        self.add_selector(&value_type, DeconstructionSelector::StaticFieldEquality(vec![member]));
        Ok(())
    }

    fn scan_method(&mut self, class: &ClassFile, method: &MethodNode) -> Result<()> {
        let member = class.method_reference(method);
        let constant = method.has_annotation(CONSTANT);
        let reconstructor = method.has_annotation(RECONSTRUCTOR);
        if !constant && !reconstructor {
            return Ok(());
        }
        if method.name == "<clinit>" {
            return Err(invalid(&member, "static initializers cannot be marked"));
        }

        if constant {
            let predicate = if method.is_static() || member.is_constructor() {
                ReconstructorPredicate::AllowAll
            } else {
                ReconstructorPredicate::InstanceOf(class.name.clone())
            };
            self.result.constant_methods.insert(member.clone(), predicate);
        }
        if !reconstructor {
            return Ok(());
        }

        let recipe = if member.is_constructor() {
            let accessors = self.resolve_accessors(class, method, &class.name)?;
            (class.name.clone(), DeconstructorConfiguration::constructor(
                class.name.clone(),
                method.descriptor.clone(),
                accessors,
            ))
        } else if method.is_static() {
            let value_type = match MethodDescriptor::parse(&method.descriptor)?.return_type {
                Some(FieldType::Object(name)) => name,
                _ => return Err(invalid(&member, "factories must return an object type")),
            };
            let accessors = self.resolve_accessors(class, method, &value_type)?;
            (value_type, DeconstructorConfiguration::factory(
                class.name.clone(),
                method.name.clone(),
                method.descriptor.clone(),
                accessors,
            ))
        } else {
            return Err(invalid(&member, "instance methods cannot reconstruct values"));
        };

        let (value_type, recipe) = recipe;
        if let Some(existing) = self.executables.get(&value_type) {
            return Err(Error::DuplicateReconstructor {
                value_type: value_type.replace('/', "."),
                existing: existing.to_string(),
                duplicate: recipe.to_string(),
            });
        }
        self.executables.insert(value_type.clone(), recipe.clone());
        self.add_selector(&value_type, DeconstructionSelector::Recipe(recipe));
        Ok(())
    }

    /// Find the getter of `value_type` for every parameter of a reconstructor.
    fn resolve_accessors(
        &self,
        class: &ClassFile,
        method: &MethodNode,
        value_type: &str,
    ) -> Result<Vec<DeconstructionDataAccessor>> {
        let executable = class.method_reference(method).to_string();
        let parameters = MethodDescriptor::parse(&method.descriptor)?.parameters;
        if parameters.is_empty() {
            return Ok(Vec::new());
        }
        let names = method
            .parameter_names(&class.pool)?
            .ok_or_else(|| Error::MissingParameterNames(executable.clone()))?;

        let ancestors = self.universe.ancestors(value_type);
        let mut accessors = Vec::with_capacity(parameters.len());
        for (index, (name, parameter)) in names.iter().zip(&parameters).enumerate() {
            let descriptor = format!("(){}", parameter.descriptor());
            let prefixed = format!("get{name}");

            let mut matches: Vec<MemberReference> = Vec::new();
            for ancestor in &ancestors {
                let Some(declaring) = self.universe.class(ancestor) else {
                    continue;
                };
                for candidate in &declaring.methods {
                    if candidate.is_static()
                        || candidate.descriptor != descriptor
                        || candidate.name.starts_with('<')
                        || !(candidate.name.eq_ignore_ascii_case(name)
                            || candidate.name.eq_ignore_ascii_case(&prefixed))
                    {
                        continue;
                    }
                    if matches.iter().all(|m| m.name != candidate.name) {
                        matches.push(declaring.method_reference(candidate));
                    }
                }
            }

            match matches.len() {
                0 => {
                    return Err(Error::MissingAccessor {
                        executable,
                        index,
                        parameter: name.clone(),
                    })
                }
                1 => {
                    let getter = matches.remove(0);
                    accessors.push(DeconstructionDataAccessor::getter(
                        getter.owner,
                        getter.name,
                        parameter.clone(),
                    ));
                }
                _ => {
                    return Err(Error::AmbiguousAccessor {
                        executable,
                        index,
                        candidates: matches.into_iter().map(|m| m.name).collect(),
                    })
                }
            }
        }
        Ok(accessors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        classfile::{ClassBuilder, Opcode},
        config::BytesInput,
    };

    const PUBLIC: AccessFlags = AccessFlags::PUBLIC;

    fn universe(classes: Vec<ClassFile>) -> ClassUniverse {
        let mut universe = ClassUniverse::new();
        for class in classes {
            let bytes = class.to_bytes().unwrap();
            universe
                .insert(Arc::new(BytesInput::for_class(&class.name, bytes)), true)
                .unwrap();
        }
        universe
    }

    fn point(ctor: impl FnOnce(ClassBuilder) -> ClassBuilder) -> ClassFile {
        let builder = ClassBuilder::new("demo/Point")
            .field(AccessFlags::PRIVATE | AccessFlags::FINAL, "x", "I")
            .method(PUBLIC, "getX", "()I", |m| {
                m.load(Opcode::Aload, 0)
                    .getfield("demo/Point", "x", "I")
                    .op(Opcode::Ireturn)
            });
        ctor(builder).build().unwrap()
    }

    #[test]
    fn constructor_recipe_resolves_getters() {
        let class = point(|b| {
            b.method(PUBLIC, "<init>", "(I)V", |m| {
                m.annotate(RECONSTRUCTOR)
                    .parameter_names(&["x"])
                    .load(Opcode::Aload, 0)
                    .invokespecial("java/lang/Object", "<init>", "()V")
                    .op(Opcode::Return)
            })
        });
        let result = scan(&universe(vec![class]), &EventLog::new()).unwrap();

        let selectors = &result.selectors["demo/Point"];
        assert_eq!(selectors.len(), 1);
        let DeconstructionSelector::Recipe(recipe) = &selectors[0] else {
            panic!("expected a recipe");
        };
        assert_eq!(recipe.accessors()[0].member, MemberReference::new("demo/Point", "getX", "()I"));
    }

    #[test]
    fn missing_parameter_names_are_fatal() {
        let class = point(|b| {
            b.method(PUBLIC, "<init>", "(I)V", |m| {
                m.annotate(RECONSTRUCTOR)
                    .load(Opcode::Aload, 0)
                    .invokespecial("java/lang/Object", "<init>", "()V")
                    .op(Opcode::Return)
            })
        });
        let error = scan(&universe(vec![class]), &EventLog::new()).unwrap_err();
        assert!(matches!(error, Error::MissingParameterNames(_)));
    }

    #[test]
    fn unmatched_parameter_is_a_missing_accessor() {
        let class = point(|b| {
            b.method(PUBLIC, "<init>", "(I)V", |m| {
                m.annotate(RECONSTRUCTOR)
                    .parameter_names(&["y"])
                    .load(Opcode::Aload, 0)
                    .invokespecial("java/lang/Object", "<init>", "()V")
                    .op(Opcode::Return)
            })
        });
        let error = scan(&universe(vec![class]), &EventLog::new()).unwrap_err();
        assert!(matches!(error, Error::MissingAccessor { index: 0, ref parameter, .. } if parameter == "y"));
    }

    #[test]
    fn marker_on_instance_method_is_invalid() {
        let class = ClassBuilder::new("demo/Bad")
            .method(PUBLIC, "make", "()Ldemo/Bad;", |m| {
                m.annotate(RECONSTRUCTOR).op(Opcode::AconstNull).op(Opcode::Areturn)
            })
            .build()
            .unwrap();
        let error = scan(&universe(vec![class]), &EventLog::new()).unwrap_err();
        assert!(matches!(error, Error::InvalidMarker { .. }));
    }

    #[test]
    fn enum_enumerators_become_constants() {
        let class = ClassBuilder::new("demo/Color")
            .enumeration()
            .field_with(
                AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL | AccessFlags::ENUM,
                "RED",
                "Ldemo/Color;",
                |f| f,
            )
            .build()
            .unwrap();
        let events = EventLog::new();
        let result = scan(&universe(vec![class]), &events).unwrap();

        let red = MemberReference::new("demo/Color", "RED", "Ldemo/Color;");
        assert!(result.constant_fields.contains(&red));
        assert_eq!(
            result.selectors["demo/Color"],
            vec![DeconstructionSelector::StaticFieldEquality(vec![red])]
        );
        assert_eq!(events.len(), 1);
    }
}
