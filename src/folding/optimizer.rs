//! The folding run.
//!
//! [`Optimizer::run`] drives a whole run over the primary inputs of a [`RunConfiguration`]:
//!
//! 1. **Passes**: every method of every primary class is analyzed and its folds are applied
//!    to a copy of the class. A pass that resolves a new static final field is discarded and
//!    repeated, so that every class sees every resolvable field no matter the input order.
//!    Evaluations of a discarded pass are not run again: the next pass reuses their outcome.
//! 2. **Emission**: the classes of the last pass that received a fold get their static
//!    initializers pruned, every class gets its markers stripped, then every modified class
//!    is serialized.
//! 3. **Delivery**: only after every class serialized successfully are the bytes handed to
//!    the output, which stages file outputs before moving them into place. A hard failure
//!    therefore never leaves partial output behind.

use std::time::{Duration, Instant};

use crate::{
    classfile::ClassFile,
    config::{ClassInput, RunConfiguration},
    emulation::{ClassEntry, ExecutionContext},
    folding::{
        analysis::{Analyzer, RunState},
        rewrite, EventKind, EventLog, FoldStats,
    },
    Error, Result,
};

/// Outcome of a folding run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// All events of the run, including the configuration scan.
    pub events: EventLog,
    /// Internal names of the emitted classes, in name order.
    pub emitted: Vec<String>,
    /// Number of passes over the primary inputs.
    pub passes: usize,
    /// Wall-clock time of the run.
    pub total_time: Duration,
}

impl OptimizationResult {
    /// Computes statistics derived from the event log.
    #[must_use]
    pub fn stats(&self) -> FoldStats {
        FoldStats::from_log(&self.events)
    }

    /// Generates a human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} in {} passes ({:.1?})",
            self.stats().summary(),
            self.passes,
            self.total_time
        )
    }
}

/// Folds the primary inputs of a configuration and delivers the rewritten classes.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use classfold::{
///     config::{CollectingSink, PathInput, RunConfiguration},
///     folding::Optimizer,
/// };
///
/// let sink = Arc::new(CollectingSink::new());
/// let config = RunConfiguration::builder()
///     .inputs(PathInput::scan_directory("build/classes")?)
///     .platform_defaults()
///     .output_sink(sink.clone())
///     .build()?;
///
/// let result = Optimizer::new(config).run()?;
/// println!("{}", result.summary());
/// for (key, bytes) in sink.outputs() {
///     println!("{key}: {} bytes", bytes.len());
/// }
/// # Ok::<(), classfold::Error>(())
/// ```
#[derive(Debug)]
pub struct Optimizer {
    config: RunConfiguration,
}

impl Optimizer {
    /// Creates an optimizer for a built configuration.
    #[must_use]
    pub fn new(config: RunConfiguration) -> Self {
        Optimizer { config }
    }

    /// The configuration of the run.
    #[must_use]
    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    /// The event log of the run. Events accumulate over repeated runs.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        self.config.events()
    }

    /// Folds every primary class and delivers the modified ones to the configured output.
    ///
    /// Candidates that cannot be folded are left untouched and only logged. The emulator
    /// state lives for the duration of this call.
    ///
    /// # Errors
    ///
    /// Returns an error if a class cannot be decoded or serialized, if modified classes exist
    /// but no output is configured, or if delivering an output fails. Nothing is delivered
    /// unless every class serialized successfully.
    pub fn run(&self) -> Result<OptimizationResult> {
        let start = Instant::now();
        let config = &self.config;
        let events = config.events();
        let mut ctx = ExecutionContext::new(config.universe(), config.limits());
        let mut state = RunState::default();

        let mut pass = 0;
        let classes = loop {
            pass += 1;
            let known = state.resolved.len();
            let log = EventLog::new();
            events
                .record(EventKind::PassStarted)
                .pass(pass)
                .message(format!("pass {pass}: {known} resolved fields"));

            let mut classes = Vec::new();
            for entry in config.universe().primaries() {
                let mut class = (*entry.full()?).clone();
                let modified = self.fold_class(&mut ctx, &mut state, &log, pass, &mut class);
                classes.push((entry, class, modified));
            }

            let grown = state.resolved.len() - known;
            events
                .record(EventKind::PassCompleted)
                .pass(pass)
                .message(format!("pass {pass}: {} events, {grown} new resolved fields", log.len()));
            if grown == 0 {
                events.merge(&log);
                break classes;
            }
        };

        let mut outputs = Vec::new();
        for (entry, mut class, mut modified) in classes {
            if modified {
                rewrite::prune_initializer(&mut class, events, pass);
            }
            let stripped = rewrite::strip_markers(&mut class);
            if stripped > 0 {
                events
                    .record(EventKind::MarkersStripped)
                    .pass(pass)
                    .message(format!("{stripped} markers removed from {}", class.name.replace('/', ".")));
                modified = true;
            }
            if modified {
                let bytes = class.to_bytes()?;
                outputs.push((entry, class.name, bytes));
            }
        }

        let emitted = self.deliver(&outputs)?;
        Ok(OptimizationResult {
            events: events.clone(),
            emitted,
            passes: pass,
            total_time: start.elapsed(),
        })
    }

    /// Analyzes every method body of `class` and applies the folds. Returns true if a body
    /// changed.
    fn fold_class(
        &self,
        ctx: &mut ExecutionContext<'_>,
        state: &mut RunState,
        log: &EventLog,
        pass: usize,
        class: &mut ClassFile,
    ) -> bool {
        let mut decisions = Vec::new();
        for (index, method) in class.methods.iter().enumerate() {
            let Some(code) = &method.code else {
                continue;
            };
            let replacements =
                Analyzer::new(&self.config, ctx, state, log, pass, class, method, code).run();
            if !replacements.is_empty() {
                decisions.push((index, replacements));
            }
        }

        let mut modified = false;
        for (index, replacements) in decisions {
            if let Some(code) = class.methods[index].code.as_mut() {
                modified |= rewrite::apply(code, replacements) > 0;
            }
        }
        modified
    }

    fn deliver(&self, outputs: &[(&ClassEntry, String, Vec<u8>)]) -> Result<Vec<String>> {
        if outputs.is_empty() {
            return Ok(Vec::new());
        }
        let Some(output) = self.config.output() else {
            return Err(Error::MissingOutput);
        };

        let staged: Vec<(&dyn ClassInput, &[u8])> = outputs
            .iter()
            .map(|(entry, _, bytes)| (entry.input().as_ref(), bytes.as_slice()))
            .collect();
        output.deliver(&staged)?;

        let mut emitted = Vec::with_capacity(outputs.len());
        for (entry, name, bytes) in outputs {
            self.config
                .events()
                .record(EventKind::ClassEmitted)
                .message(format!(
                    "{} -> {} ({} bytes, {})",
                    name.replace('/', "."),
                    entry.input().key(),
                    bytes.len(),
                    output.name()
                ));
            emitted.push(name.clone());
        }
        Ok(emitted)
    }
}
