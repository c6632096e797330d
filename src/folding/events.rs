//! Event logging for folding runs.
//!
//! Everything a run decides is recorded here: folded constants, deconstructed instances,
//! skipped candidates and their reasons, emitted classes and pass boundaries. Soft failures
//! never surface as errors; this log is the only place they are visible.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Append-only collection with query and summary capabilities
//! - [`EventBuilder`] - Fluent API for creating events
//! - [`FoldStats`] - Counters derived from a log
//!
//! # Example
//!
//! ```rust
//! use classfold::classfile::MemberReference;
//! use classfold::folding::{EventKind, EventLog, FoldStats};
//!
//! let log = EventLog::new();
//! let clinit = MemberReference::new("demo/Holder", "<clinit>", "()V");
//!
//! log.record(EventKind::ConstantFolded)
//!     .at(clinit.clone(), 3)
//!     .message("java.lang.Integer.parseInt (Ljava/lang/String;)I -> 10");
//! log.info("pass 1 started");
//!
//! assert_eq!(FoldStats::from_log(&log).constants_folded, 1);
//! assert_eq!(log.filter_method(&clinit).count(), 1);
//! ```

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use crate::classfile::MemberReference;

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A field read or call was replaced by a literal.
    ConstantFolded,
    /// A non-representable value was replaced by a reconstruction recipe.
    InstanceDeconstructed,
    /// A candidate could not be folded; the instruction was left as is.
    FoldSkipped,
    /// A member could not be resolved or has no implementation.
    MemberInaccessible,
    /// A static final field became a resolved constant.
    FieldResolved,
    /// Leading static initializer assignments were moved into `ConstantValue` attributes.
    ConstantValueInlined,
    /// An empty static initializer was removed.
    InitializerRemoved,
    /// Tool markers were stripped from a class.
    MarkersStripped,
    /// A rewritten class was serialized for output.
    ClassEmitted,

    /// A pass over the primary inputs started.
    PassStarted,
    /// A pass over the primary inputs completed.
    PassCompleted,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ConstantFolded => "constant folded",
            Self::InstanceDeconstructed => "instance deconstructed",
            Self::FoldSkipped => "fold skipped",
            Self::MemberInaccessible => "member inaccessible",
            Self::FieldResolved => "field resolved",
            Self::ConstantValueInlined => "constant value inlined",
            Self::InitializerRemoved => "initializer removed",
            Self::MarkersStripped => "markers stripped",
            Self::ClassEmitted => "class emitted",
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a change to a class.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::ConstantFolded
                | Self::InstanceDeconstructed
                | Self::ConstantValueInlined
                | Self::InitializerRemoved
                | Self::MarkersStripped
        )
    }

    /// Returns true for soft failures and diagnostics.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(
            self,
            Self::FoldSkipped | Self::MemberInaccessible | Self::Info | Self::Warning | Self::Error
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The method where the event occurred (if applicable).
    pub method: Option<MemberReference>,
    /// Instruction index within the method.
    pub location: Option<usize>,
    /// The member the event is about: the folded field or callee, the inaccessible member.
    pub member: Option<MemberReference>,
    /// Human-readable description.
    pub message: String,
    /// Pass number (1-based) if recorded during a pass.
    pub pass: Option<usize>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            method: None,
            location: None,
            member: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.kind)?;
        if let Some(method) = &self.method {
            write!(f, "{method}")?;
            if let Some(location) = self.location {
                write!(f, " @{location}")?;
            }
            f.write_str(": ")?;
        }
        f.write_str(&self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<MemberReference>,
    location: Option<usize>,
    member: Option<MemberReference>,
    message: Option<String>,
    pass: Option<usize>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            location: None,
            member: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the method and instruction index where the event occurred.
    pub fn at(mut self, method: MemberReference, location: usize) -> Self {
        self.method = Some(method);
        self.location = Some(location);
        self
    }

    /// Sets only the method.
    pub fn method(mut self, method: MemberReference) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the member the event is about.
    pub fn member(mut self, member: MemberReference) -> Self {
        self.member = Some(member);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a pass.
    pub fn pass(mut self, pass: usize) -> Self {
        self.pass = Some(pass);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            method: self.method.take(),
            location: self.location.take(),
            member: self.member.take(),
            message,
            pass: self.pass.take(),
        };

        self.log.events.push(event);
    }
}

/// Collection of events from a folding run.
///
/// Appending only needs a shared reference, so the log can live inside the otherwise
/// read-only [`RunConfiguration`](crate::config::RunConfiguration). Statistics are derived
/// from the events rather than tracked separately.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        for (_, event) in &self.events {
            new_log.events.push(event.clone());
        }
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Records that a member could not be used: its owner, the member and the cause.
    pub fn member_inaccessible(&self, member: &MemberReference, cause: impl fmt::Display) {
        self.record(EventKind::MemberInaccessible)
            .member(member.clone())
            .message(format!("{member}: {cause}"));
    }

    /// Appends every event of another log.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Returns an iterator over events recorded inside a specific method.
    pub fn filter_method<'a>(
        &'a self,
        method: &'a MemberReference,
    ) -> impl Iterator<Item = &'a Event> + 'a {
        self.events
            .iter()
            .filter_map(move |(_, e)| (e.method.as_ref() == Some(method)).then_some(e))
    }

    /// Returns an iterator over transformation events only.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(|(_, e)| e.kind.is_transformation().then_some(e))
    }

    /// Returns an iterator over diagnostic events only.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(|(_, e)| e.kind.is_diagnostic().then_some(e))
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of distinct methods with transformation events.
    #[must_use]
    pub fn methods_affected(&self) -> usize {
        self.transformations()
            .filter_map(|e| e.method.as_ref())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();
        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

/// Iterator over the events of an [`EventLog`].
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

/// Statistics derived from an [`EventLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldStats {
    /// Number of methods with at least one transformation.
    pub methods_transformed: usize,
    /// Number of literal replacements.
    pub constants_folded: usize,
    /// Number of recipe replacements.
    pub instances_deconstructed: usize,
    /// Number of candidates left untouched after a soft failure.
    pub folds_skipped: usize,
    /// Number of members that could not be resolved or executed.
    pub members_inaccessible: usize,
    /// Number of static final fields resolved through propagation.
    pub fields_resolved: usize,
    /// Number of fields that received a `ConstantValue` attribute.
    pub constant_values_inlined: usize,
    /// Number of static initializers removed.
    pub initializers_removed: usize,
    /// Number of classes written.
    pub classes_emitted: usize,
    /// Number of passes over the primary inputs.
    pub passes: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Number of errors.
    pub errors: usize,
}

impl FoldStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            methods_transformed: log.methods_affected(),
            constants_folded: get(EventKind::ConstantFolded),
            instances_deconstructed: get(EventKind::InstanceDeconstructed),
            folds_skipped: get(EventKind::FoldSkipped),
            members_inaccessible: get(EventKind::MemberInaccessible),
            fields_resolved: get(EventKind::FieldResolved),
            constant_values_inlined: get(EventKind::ConstantValueInlined),
            initializers_removed: get(EventKind::InitializerRemoved),
            classes_emitted: get(EventKind::ClassEmitted),
            passes: get(EventKind::PassCompleted),
            warnings: get(EventKind::Warning),
            errors: get(EventKind::Error),
        }
    }

    /// Generates a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if self.methods_transformed > 0 {
            parts.push(format!("{} methods", self.methods_transformed));
        }
        if self.constants_folded > 0 {
            parts.push(format!("{} constants folded", self.constants_folded));
        }
        if self.instances_deconstructed > 0 {
            parts.push(format!("{} instances deconstructed", self.instances_deconstructed));
        }
        if self.constant_values_inlined > 0 {
            parts.push(format!("{} constant values", self.constant_values_inlined));
        }
        if self.initializers_removed > 0 {
            parts.push(format!("{} initializers removed", self.initializers_removed));
        }
        if self.classes_emitted > 0 {
            parts.push(format!("{} classes emitted", self.classes_emitted));
        }
        if self.folds_skipped > 0 {
            parts.push(format!("{} skipped", self.folds_skipped));
        }
        if self.errors > 0 {
            parts.push(format!("{} errors", self.errors));
        }
        if self.warnings > 0 {
            parts.push(format!("{} warnings", self.warnings));
        }

        if parts.is_empty() {
            "no transformations".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl fmt::Display for FoldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clinit(owner: &str) -> MemberReference {
        MemberReference::new(owner, "<clinit>", "()V")
    }

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(!log.has(EventKind::ConstantFolded));
        assert_eq!(log.summary(), "no events");
    }

    #[test]
    fn test_record_event() {
        let log = EventLog::new();
        let method = clinit("demo/A");

        log.record(EventKind::ConstantFolded)
            .at(method.clone(), 4)
            .message("10");

        assert_eq!(log.len(), 1);
        let event = log.iter().next().unwrap();
        assert_eq!(event.method.as_ref(), Some(&method));
        assert_eq!(event.location, Some(4));
        assert_eq!(event.message, "10");
        assert_eq!(event.to_string(), "[constant folded] demo.A.<clinit> ()V @4: 10");
    }

    #[test]
    fn test_default_message() {
        let log = EventLog::new();
        log.record(EventKind::InitializerRemoved).method(clinit("demo/A"));
        assert_eq!(log.iter().next().unwrap().message, "initializer removed");
    }

    #[test]
    fn test_member_inaccessible() {
        let log = EventLog::new();
        let member = MemberReference::new("demo/Missing", "f", "()I");
        log.member_inaccessible(&member, "class not found");

        let event = log.filter_kind(EventKind::MemberInaccessible).next().unwrap();
        assert_eq!(event.member.as_ref(), Some(&member));
        assert!(event.message.contains("demo.Missing.f ()I"));
        assert!(event.message.ends_with("class not found"));
    }

    #[test]
    fn test_filters_and_merge() {
        let log = EventLog::new();
        let other = EventLog::new();
        log.record(EventKind::ConstantFolded).at(clinit("demo/A"), 1);
        log.info("some info");
        other.record(EventKind::FoldSkipped).at(clinit("demo/B"), 2);
        log.merge(&other);

        assert_eq!(log.len(), 3);
        assert_eq!(log.transformations().count(), 1);
        assert_eq!(log.diagnostics().count(), 2);
        assert_eq!(log.filter_method(&clinit("demo/B")).count(), 1);
    }

    #[test]
    fn test_stats_and_summary() {
        let log = EventLog::new();
        log.record(EventKind::ConstantFolded).at(clinit("demo/A"), 1);
        log.record(EventKind::ConstantFolded).at(clinit("demo/A"), 5);
        log.record(EventKind::InstanceDeconstructed).at(clinit("demo/B"), 1);
        log.record(EventKind::PassCompleted);
        log.warn("careful");

        let stats = FoldStats::from_log(&log);
        assert_eq!(stats.methods_transformed, 2);
        assert_eq!(stats.constants_folded, 2);
        assert_eq!(stats.instances_deconstructed, 1);
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.warnings, 1);
        assert!(stats.summary().contains("2 constants folded"));
        assert!(log.summary().contains("2 constant folded"));
    }

    #[test]
    fn test_shared_append() {
        use std::{sync::Arc, thread};

        let log = Arc::new(EventLog::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for j in 0..50 {
                        log.record(EventKind::FoldSkipped)
                            .at(clinit(&format!("demo/C{i}")), j);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 200);
        assert_eq!(log.clone().len(), 200);
    }
}
