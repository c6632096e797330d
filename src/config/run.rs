//! The run configuration and its builder.
//!
//! A [`RunConfiguration`] is assembled once by [`RunConfigurationBuilder::build`]: inputs are
//! parsed into the [`ClassUniverse`], the universe is scanned for markers, and the scanned
//! configuration is merged with the platform defaults and whatever the host configured
//! programmatically. From then on it is read-only; the event log and the selector cache are
//! the only state that changes during the run, both through `&self`.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::Arc,
};

use dashmap::DashMap;

use crate::{
    classfile::MemberReference,
    config::{
        deconstructor::DeconstructionSelector,
        input::{ClassInput, OutputMode, OutputSink},
        platform,
        predicate::ReconstructorPredicate,
        scanner,
    },
    emulation::{ClassUniverse, EmulationLimits, NativeRegistry},
    folding::EventLog,
    Error, Result,
};

/// Prefix of keys that hold platform-specific class variants.
const MULTI_RELEASE_PREFIX: &str = "META-INF/versions/";

/// Everything a folding run needs, built before rewriting starts.
#[derive(Debug)]
pub struct RunConfiguration {
    constant_types: BTreeSet<String>,
    constant_fields: BTreeSet<MemberReference>,
    constant_methods: BTreeMap<MemberReference, ReconstructorPredicate>,
    selectors: BTreeMap<String, DeconstructionSelector>,
    selector_cache: DashMap<String, Option<DeconstructionSelector>>,
    fold_string_concat: bool,
    primary: Vec<Arc<dyn ClassInput>>,
    classpath: Vec<Arc<dyn ClassInput>>,
    output: Option<OutputMode>,
    events: EventLog,
    limits: EmulationLimits,
    universe: ClassUniverse,
}

impl RunConfiguration {
    /// Start configuring a run.
    #[must_use]
    pub fn builder() -> RunConfigurationBuilder {
        RunConfigurationBuilder::new()
    }

    /// Types whose members are all constant.
    #[must_use]
    pub fn constant_types(&self) -> &BTreeSet<String> {
        &self.constant_types
    }

    /// Fields marked constant, by declaring reference.
    #[must_use]
    pub fn constant_fields(&self) -> &BTreeSet<MemberReference> {
        &self.constant_fields
    }

    /// Methods and constructors marked constant, with their predicates.
    #[must_use]
    pub fn constant_methods(&self) -> &BTreeMap<MemberReference, ReconstructorPredicate> {
        &self.constant_methods
    }

    /// Flattened selectors by declared type.
    #[must_use]
    pub fn selectors(&self) -> &BTreeMap<String, DeconstructionSelector> {
        &self.selectors
    }

    /// True if string concatenation call sites may be folded.
    #[must_use]
    pub fn fold_string_concat(&self) -> bool {
        self.fold_string_concat
    }

    /// The primary inputs, in the order they were added.
    #[must_use]
    pub fn primary_inputs(&self) -> &[Arc<dyn ClassInput>] {
        &self.primary
    }

    /// The classpath inputs, in the order they were added.
    #[must_use]
    pub fn classpath_inputs(&self) -> &[Arc<dyn ClassInput>] {
        &self.classpath
    }

    /// Where rewritten classes go, `None` for a run without inputs.
    #[must_use]
    pub fn output(&self) -> Option<&OutputMode> {
        self.output.as_ref()
    }

    /// The event log of the run.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Emulation limits.
    #[must_use]
    pub fn limits(&self) -> EmulationLimits {
        self.limits
    }

    /// Every class of the run.
    #[must_use]
    pub fn universe(&self) -> &ClassUniverse {
        &self.universe
    }

    /// True if a field read may be folded. `field` is the declaring reference.
    #[must_use]
    pub fn is_constant_field(&self, field: &MemberReference) -> bool {
        self.constant_fields.contains(field) || self.constant_types.contains(&field.owner)
    }

    /// The predicate of a constant method or constructor, `None` if it is not constant.
    ///
    /// `member` is the implementation a call dispatches to. Members of a constant type are
    /// constant even without their own entry.
    #[must_use]
    pub fn constant_predicate(
        &self,
        member: &MemberReference,
        is_static: bool,
    ) -> Option<ReconstructorPredicate> {
        if let Some(predicate) = self.constant_methods.get(member) {
            return Some(predicate.clone());
        }
        if !self.constant_types.contains(&member.owner) {
            return None;
        }
        Some(if is_static || member.is_constructor() {
            ReconstructorPredicate::AllowAll
        } else {
            ReconstructorPredicate::InstanceOf(member.owner.clone())
        })
    }

    /// The selector for values of `runtime_class`: the one of the most derived configured
    /// ancestor (the class, its superclasses, then its interfaces).
    ///
    /// Results are cached per runtime class for the rest of the run.
    #[must_use]
    pub fn selector_for(&self, runtime_class: &str) -> Option<DeconstructionSelector> {
        if let Some(cached) = self.selector_cache.get(runtime_class) {
            return cached.value().clone();
        }
        let selector = self
            .universe
            .ancestors(runtime_class)
            .iter()
            .find_map(|ancestor| self.selectors.get(ancestor))
            .cloned();
        self.selector_cache
            .insert(runtime_class.to_string(), selector.clone());
        selector
    }
}

/// Builder for [`RunConfiguration`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use classfold::classfile::MemberReference;
/// use classfold::config::{CollectingSink, ReconstructorPredicate, RunConfiguration};
///
/// let config = RunConfiguration::builder()
///     .platform_defaults()
///     .constant_method(
///         MemberReference::new("demo/Codes", "lookup", "(I)I"),
///         ReconstructorPredicate::AllowAll,
///     )
///     .output_sink(Arc::new(CollectingSink::new()))
///     .build()?;
/// assert!(config.constant_methods().len() > 1);
/// # Ok::<(), classfold::Error>(())
/// ```
#[derive(Debug)]
pub struct RunConfigurationBuilder {
    primary: Vec<Arc<dyn ClassInput>>,
    classpath: Vec<Arc<dyn ClassInput>>,
    outputs: Vec<OutputMode>,
    constant_types: BTreeSet<String>,
    constant_fields: BTreeSet<MemberReference>,
    constant_methods: BTreeMap<MemberReference, ReconstructorPredicate>,
    selectors: BTreeMap<String, Vec<DeconstructionSelector>>,
    platform_defaults: bool,
    fold_string_concat: Option<bool>,
    limits: EmulationLimits,
}

impl Default for RunConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunConfigurationBuilder {
    /// Create a builder with no inputs and no configuration.
    #[must_use]
    pub fn new() -> Self {
        RunConfigurationBuilder {
            primary: Vec::new(),
            classpath: Vec::new(),
            outputs: Vec::new(),
            constant_types: BTreeSet::new(),
            constant_fields: BTreeSet::new(),
            constant_methods: BTreeMap::new(),
            selectors: BTreeMap::new(),
            platform_defaults: false,
            fold_string_concat: None,
            limits: EmulationLimits::default(),
        }
    }

    /// Add a primary input, a class that is rewritten.
    #[must_use]
    pub fn input(mut self, input: impl ClassInput + 'static) -> Self {
        self.primary.push(Arc::new(input));
        self
    }

    /// Add a shared primary input.
    #[must_use]
    pub fn input_arc(mut self, input: Arc<dyn ClassInput>) -> Self {
        self.primary.push(input);
        self
    }

    /// Add several primary inputs.
    #[must_use]
    pub fn inputs<I: ClassInput + 'static>(mut self, inputs: impl IntoIterator<Item = I>) -> Self {
        for input in inputs {
            self.primary.push(Arc::new(input));
        }
        self
    }

    /// Add a classpath input, a class that is scanned and executed but never emitted.
    #[must_use]
    pub fn classpath(mut self, input: impl ClassInput + 'static) -> Self {
        self.classpath.push(Arc::new(input));
        self
    }

    /// Add several classpath inputs.
    #[must_use]
    pub fn classpath_inputs<I: ClassInput + 'static>(mut self, inputs: impl IntoIterator<Item = I>) -> Self {
        for input in inputs {
            self.classpath.push(Arc::new(input));
        }
        self
    }

    /// Deliver rewritten classes to a sink.
    #[must_use]
    pub fn output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.outputs.push(OutputMode::Sink(sink));
        self
    }

    /// Write rewritten classes below a directory.
    #[must_use]
    pub fn output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.outputs.push(OutputMode::Directory(directory.into()));
        self
    }

    /// Overwrite the input files.
    #[must_use]
    pub fn in_place(mut self) -> Self {
        self.outputs.push(OutputMode::InPlace);
        self
    }

    /// Mark every member of a type constant.
    #[must_use]
    pub fn constant_type(mut self, class: impl Into<String>) -> Self {
        self.constant_types.insert(class.into());
        self
    }

    /// Mark a field constant.
    #[must_use]
    pub fn constant_field(mut self, field: MemberReference) -> Self {
        self.constant_fields.insert(field);
        self
    }

    /// Mark a method or constructor constant under a predicate.
    #[must_use]
    pub fn constant_method(mut self, method: MemberReference, predicate: ReconstructorPredicate) -> Self {
        self.constant_methods.insert(method, predicate);
        self
    }

    /// Add a selector for a declared type, tried after the scanned ones.
    #[must_use]
    pub fn selector(mut self, class: impl Into<String>, selector: DeconstructionSelector) -> Self {
        self.selectors.entry(class.into()).or_default().push(selector);
        self
    }

    /// Include the configuration of the platform classes: pure `java.lang` members, enum
    /// accessors and boxing recipes.
    ///
    /// Also enables folding of string concatenation unless disabled explicitly.
    #[must_use]
    pub fn platform_defaults(mut self) -> Self {
        self.platform_defaults = true;
        self
    }

    /// Allow or forbid folding of `StringConcatFactory` call sites.
    #[must_use]
    pub fn string_concat(mut self, fold: bool) -> Self {
        self.fold_string_concat = Some(fold);
        self
    }

    /// Replace the emulation limits.
    #[must_use]
    pub fn limits(mut self, limits: EmulationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the maximum call depth of the emulator.
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.limits.max_call_depth = depth;
        self
    }

    /// Set an instruction budget per evaluation.
    #[must_use]
    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.limits.max_instructions = Some(max);
        self
    }

    /// Parse and scan the inputs and assemble the configuration.
    ///
    /// # Errors
    /// Returns [`Error::ConflictingOutputModes`] or [`Error::MissingOutput`] for an invalid
    /// output setup, [`Error::MultiReleaseInput`] or [`Error::DuplicateClass`] for rejected
    /// inputs, any scan error (see [`Error`]), or the parse error of a damaged class file.
    pub fn build(self) -> Result<RunConfiguration> {
        let mut outputs = self.outputs.into_iter();
        let output = outputs.next();
        if let (Some(first), Some(second)) = (&output, outputs.next()) {
            return Err(Error::ConflictingOutputModes(first.name(), second.name()));
        }
        if output.is_none() && !self.primary.is_empty() {
            return Err(Error::MissingOutput);
        }

        for input in self.primary.iter().chain(&self.classpath) {
            let key = input.key();
            if key.starts_with(MULTI_RELEASE_PREFIX) || key.contains("/META-INF/versions/") {
                return Err(Error::MultiReleaseInput { key: key.to_string() });
            }
        }

        let mut universe = ClassUniverse::new();
        for input in &self.primary {
            universe.insert(input.clone(), true)?;
        }
        for input in &self.classpath {
            universe.insert(input.clone(), false)?;
        }

        let events = EventLog::new();
        let scanned = scanner::scan(&universe, &events)?;

        let mut constant_methods = BTreeMap::new();
        let mut selectors: BTreeMap<String, Vec<DeconstructionSelector>> = BTreeMap::new();
        if self.platform_defaults {
            constant_methods.extend(platform::constant_methods(&NativeRegistry::platform()));
            for (class, selector) in platform::recipes() {
                selectors.entry(class).or_default().push(selector);
            }
        }
        constant_methods.extend(scanned.constant_methods);
        constant_methods.extend(self.constant_methods);

        for (class, alternatives) in scanned.selectors.into_iter().chain(self.selectors) {
            selectors.entry(class).or_default().extend(alternatives);
        }
        let selectors = selectors
            .into_iter()
            .map(|(class, alternatives)| (class, DeconstructionSelector::FirstMatch(alternatives).flatten()))
            .collect();

        let mut constant_types = scanned.constant_types;
        constant_types.extend(self.constant_types);
        let mut constant_fields = scanned.constant_fields;
        constant_fields.extend(self.constant_fields);

        events.info(format!(
            "configured {} constant types, {} constant fields, {} constant methods over {} classes",
            constant_types.len(),
            constant_fields.len(),
            constant_methods.len(),
            universe.len()
        ));

        Ok(RunConfiguration {
            constant_types,
            constant_fields,
            constant_methods,
            selectors,
            selector_cache: DashMap::new(),
            fold_string_concat: self.fold_string_concat.unwrap_or(self.platform_defaults),
            primary: self.primary,
            classpath: self.classpath,
            output,
            events,
            limits: self.limits,
            universe,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BytesInput, CollectingSink};

    #[test]
    fn empty_configuration_builds() {
        let config = RunConfiguration::builder().build().unwrap();
        assert!(config.constant_methods().is_empty());
        assert!(config.output().is_none());
        assert!(!config.fold_string_concat());
    }

    #[test]
    fn output_modes_are_exclusive() {
        let error = RunConfiguration::builder()
            .output_sink(Arc::new(CollectingSink::new()))
            .in_place()
            .build()
            .unwrap_err();
        assert!(matches!(error, Error::ConflictingOutputModes("sink", "in-place")));
    }

    #[test]
    fn inputs_need_an_output() {
        let error = RunConfiguration::builder()
            .input(BytesInput::for_class("demo/A", Vec::new()))
            .build()
            .unwrap_err();
        assert!(matches!(error, Error::MissingOutput));
    }

    #[test]
    fn multi_release_inputs_are_rejected() {
        let error = RunConfiguration::builder()
            .classpath(BytesInput::new("META-INF/versions/11/demo/A.class", Vec::new()))
            .build()
            .unwrap_err();
        assert!(matches!(error, Error::MultiReleaseInput { ref key } if key.starts_with("META-INF")));
    }

    #[test]
    fn platform_selectors_resolve_through_ancestors() {
        let config = RunConfiguration::builder().platform_defaults().build().unwrap();
        assert!(config.fold_string_concat());
        assert!(matches!(
            config.selector_for("java/lang/Integer"),
            Some(DeconstructionSelector::Recipe(_))
        ));
        assert!(config.selector_for("java/lang/StringBuilder").is_none());
        assert!(config.selector_for("java/lang/StringBuilder").is_none());
    }

    #[test]
    fn constant_types_mark_their_members() {
        let config = RunConfiguration::builder().constant_type("demo/Codes").build().unwrap();
        let lookup = MemberReference::new("demo/Codes", "lookup", "(I)I");
        assert!(matches!(
            config.constant_predicate(&lookup, true),
            Some(ReconstructorPredicate::AllowAll)
        ));
        assert!(matches!(
            config.constant_predicate(&lookup, false),
            Some(ReconstructorPredicate::InstanceOf(ref owner)) if owner == "demo/Codes"
        ));
        assert!(config.is_constant_field(&MemberReference::new("demo/Codes", "A", "I")));
        assert!(config
            .constant_predicate(&MemberReference::new("demo/Other", "f", "()I"), true)
            .is_none());
    }
}
