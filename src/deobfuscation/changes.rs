//! Structured record of what the engine did to a script.
//!
//! Rules, processors and the scheduler append [`Event`]s to an [`EventLog`] while they
//! work. The log is append-only and can be written through a shared reference, so a
//! rule holding `&Session` parts can still report. [`DerivedStats`] condenses a log
//! into counters for summaries and reports.
//!
//! # Example
//!
//! ```rust
//! use unravel::deobfuscation::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConstantFolded)
//!     .rule("resolveDefiniteBinaryExpressions")
//!     .message("1 + 2 -> 3");
//! log.warn("sandbox timed out");
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.count_kind(EventKind::ConstantFolded), 1);
//! ```

use std::{collections::BTreeMap, fmt, time::Duration};

use strum::{Display, IntoStaticStr};

use crate::ast::NodeId;

/// What an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr)]
pub enum EventKind {
    /// An expression over literals was replaced by its value.
    ConstantFolded,
    /// A branch with a constant test was resolved.
    BranchResolved,
    /// A member access was replaced by the value it reads.
    MemberResolved,
    /// A call was replaced by its result.
    CallResolved,
    /// An indirection (proxy variable, reference or call) was removed.
    ProxyResolved,
    /// An identifier was replaced by its fixed value.
    IdentifierInlined,
    /// A wrapper function or IIFE was unwrapped.
    FunctionUnwrapped,
    /// An `eval` or `Function` call was replaced by the code it runs.
    EvalUnwrapped,
    /// Statements were split, merged or reordered.
    StatementsRestructured,
    /// A node was removed.
    NodeRemoved,
    /// Syntax was normalized for readability.
    Normalized,
    /// A family pre-processor ran.
    PreprocessorApplied,
    /// A family post-processor ran.
    PostprocessorApplied,
    /// Obfuscation family detection finished.
    DetectionComplete,
    /// One iteration of the main loop finished.
    IterationCompleted,
    /// A commit was rejected because the rewritten script did not parse.
    CommitRejected,
    /// A rule failed and its changes were discarded.
    RuleFailed,
    /// Informational message.
    Info,
    /// Warning message.
    Warning,
    /// Error message.
    Error,
}

impl EventKind {
    /// Returns `true` for events that describe a change to the script. Processor
    /// events summarize changes already reported per node.
    #[must_use]
    pub fn is_transformation(self) -> bool {
        !matches!(
            self,
            EventKind::PreprocessorApplied
                | EventKind::PostprocessorApplied
                | EventKind::DetectionComplete
                | EventKind::IterationCompleted
                | EventKind::CommitRejected
                | EventKind::RuleFailed
                | EventKind::Info
                | EventKind::Warning
                | EventKind::Error
        )
    }
}

/// One entry of an [`EventLog`].
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Rule or processor that reported the event.
    pub rule: Option<&'static str>,
    /// Node the event is about, in the tree current at the time.
    pub node: Option<NodeId>,
    /// Main loop iteration, if the event happened inside it.
    pub iteration: Option<usize>,
    /// Free-form detail.
    pub message: Option<String>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(rule) = self.rule {
            write!(f, " {rule}")?;
        }
        if let Some(iteration) = self.iteration {
            write!(f, " (iteration {iteration})")?;
        }
        if let Some(node) = self.node {
            write!(f, " at {node}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Builder returned by [`EventLog::record`]. The event is appended when it drops.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    event: Option<Event>,
}

impl EventBuilder<'_> {
    /// Sets the reporting rule.
    #[must_use]
    pub fn rule(mut self, rule: &'static str) -> Self {
        if let Some(e) = self.event.as_mut() {
            e.rule = Some(rule);
        }
        self
    }

    /// Sets the node the event is about.
    #[must_use]
    pub fn node(mut self, node: NodeId) -> Self {
        if let Some(e) = self.event.as_mut() {
            e.node = Some(node);
        }
        self
    }

    /// Sets the main loop iteration.
    #[must_use]
    pub fn iteration(mut self, iteration: usize) -> Self {
        if let Some(e) = self.event.as_mut() {
            e.iteration = Some(iteration);
        }
        self
    }

    /// Sets the message and records the event.
    pub fn message(mut self, message: impl Into<String>) {
        if let Some(e) = self.event.as_mut() {
            e.message = Some(message.into());
        }
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.log.push(event);
        }
    }
}

/// Append-only log of [`Event`]s.
#[derive(Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording an event of the given kind.
    ///
    /// The event is appended when the returned builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder {
            log: self,
            event: Some(Event {
                kind,
                rule: None,
                node: None,
                iteration: None,
                message: None,
            }),
        }
    }

    /// Appends an event.
    pub fn push(&self, event: Event) {
        self.events.push(event);
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.record(EventKind::Info).message(message);
    }

    /// Records a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.record(EventKind::Warning).message(message);
    }

    /// Records an error.
    pub fn error(&self, message: impl Into<String>) {
        self.record(EventKind::Error).message(message);
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Iterates the events in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Iterates the warnings, rule failures and rejected commits that carry a message.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> {
        self.iter().filter(|e| {
            matches!(
                e.kind,
                EventKind::Warning
                    | EventKind::Error
                    | EventKind::RuleFailed
                    | EventKind::CommitRejected
            ) && e.message.is_some()
        })
    }

    /// Counts events of one kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.iter().filter(|e| e.kind == kind).count()
    }

    /// Returns `true` if any event describes a change to the script.
    #[must_use]
    pub fn has_transformations(&self) -> bool {
        self.iter().any(|e| e.kind.is_transformation())
    }

    /// Counts events per kind.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<EventKind, usize> {
        let mut counts = BTreeMap::new();
        for e in self.iter() {
            *counts.entry(e.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Counts transformation events per reporting rule.
    #[must_use]
    pub fn by_rule(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for e in self.iter().filter(|e| e.kind.is_transformation()) {
            if let Some(rule) = e.rule {
                *counts.entry(rule).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Appends every event of `other`.
    pub fn merge(&self, other: EventLog) {
        for event in other.iter() {
            self.events.push(event.clone());
        }
    }

    /// Moves all events out, leaving the log empty.
    pub fn take(&mut self) -> EventLog {
        std::mem::take(self)
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("events", &self.len())
            .finish()
    }
}

/// Counters derived from an [`EventLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedStats {
    /// Constant expressions folded.
    pub constants_folded: usize,
    /// Constant branches resolved.
    pub branches_resolved: usize,
    /// Member accesses resolved.
    pub members_resolved: usize,
    /// Calls replaced by their result.
    pub calls_resolved: usize,
    /// Indirections removed.
    pub proxies_resolved: usize,
    /// Identifiers inlined.
    pub identifiers_inlined: usize,
    /// Wrappers and `eval` calls unwrapped.
    pub functions_unwrapped: usize,
    /// Nodes removed.
    pub nodes_removed: usize,
    /// Warnings and rule failures.
    pub warnings: usize,
    /// Errors and rejected commits.
    pub errors: usize,
    /// Main loop iterations.
    pub iterations: usize,
    /// Wall-clock time of the run.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes the counters of a log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let mut stats = Self::default();
        for e in log.iter() {
            match e.kind {
                EventKind::ConstantFolded => stats.constants_folded += 1,
                EventKind::BranchResolved => stats.branches_resolved += 1,
                EventKind::MemberResolved => stats.members_resolved += 1,
                EventKind::CallResolved => stats.calls_resolved += 1,
                EventKind::ProxyResolved => stats.proxies_resolved += 1,
                EventKind::IdentifierInlined => stats.identifiers_inlined += 1,
                EventKind::FunctionUnwrapped | EventKind::EvalUnwrapped => {
                    stats.functions_unwrapped += 1;
                }
                EventKind::NodeRemoved => stats.nodes_removed += 1,
                EventKind::IterationCompleted => stats.iterations += 1,
                EventKind::Warning | EventKind::RuleFailed => stats.warnings += 1,
                EventKind::Error | EventKind::CommitRejected => stats.errors += 1,
                _ => {}
            }
        }
        stats
    }

    /// Sets the run time.
    #[must_use]
    pub fn with_time(mut self, total_time: Duration) -> Self {
        self.total_time = total_time;
        self
    }

    /// Sets the iteration count.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Total number of transformations counted.
    #[must_use]
    pub fn total_transformations(&self) -> usize {
        self.constants_folded
            + self.branches_resolved
            + self.members_resolved
            + self.calls_resolved
            + self.proxies_resolved
            + self.identifiers_inlined
            + self.functions_unwrapped
            + self.nodes_removed
    }

    /// One-line description of the non-zero counters.
    #[must_use]
    pub fn summary(&self) -> String {
        let counters = [
            (self.constants_folded, "constants folded"),
            (self.branches_resolved, "branches resolved"),
            (self.members_resolved, "members resolved"),
            (self.calls_resolved, "calls resolved"),
            (self.proxies_resolved, "proxies resolved"),
            (self.identifiers_inlined, "identifiers inlined"),
            (self.functions_unwrapped, "functions unwrapped"),
            (self.nodes_removed, "nodes removed"),
            (self.errors, "errors"),
            (self.warnings, "warnings"),
        ];
        let parts: Vec<String> = counters
            .iter()
            .filter(|(count, _)| *count > 0)
            .map(|(count, label)| format!("{count} {label}"))
            .collect();

        let stats = if parts.is_empty() {
            "no transformations".to_string()
        } else {
            parts.join(", ")
        };

        if self.total_time.as_millis() > 0 {
            format!(
                "{} in {:?} ({} iterations)",
                stats, self.total_time, self.iterations
            )
        } else {
            stats
        }
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_on_drop() {
        let log = EventLog::new();
        {
            let _pending = log.record(EventKind::NodeRemoved).rule("removeDeadNodes");
            assert!(log.is_empty());
        }
        assert_eq!(log.len(), 1);
        let event = log.iter().next().cloned();
        assert_eq!(event.and_then(|e| e.rule), Some("removeDeadNodes"));
    }

    #[test]
    fn test_merge_and_take() {
        let mut log = EventLog::new();
        let other = EventLog::new();
        other.info("a");
        other.record(EventKind::IdentifierInlined).message("x");
        log.merge(other);
        assert_eq!(log.len(), 2);
        assert!(log.has_transformations());

        let taken = log.take();
        assert!(log.is_empty());
        assert_eq!(taken.len(), 2);
    }

    #[test]
    fn test_summary_and_by_rule() {
        let log = EventLog::new();
        log.record(EventKind::ConstantFolded).rule("fold").message("");
        log.record(EventKind::ConstantFolded).rule("fold").message("");
        log.record(EventKind::CallResolved).rule("calls").message("");
        log.warn("w");

        let summary = log.summary();
        assert_eq!(summary.get(&EventKind::ConstantFolded), Some(&2));
        assert_eq!(summary.get(&EventKind::Warning), Some(&1));
        assert_eq!(log.by_rule().get("fold"), Some(&2));
        assert_eq!(log.by_rule().len(), 2);
    }

    #[test]
    fn test_derived_stats() {
        let log = EventLog::new();
        log.record(EventKind::BranchResolved).message("");
        log.record(EventKind::EvalUnwrapped).message("");
        log.record(EventKind::IterationCompleted).message("");
        log.record(EventKind::RuleFailed).message("");
        log.record(EventKind::CommitRejected).message("");

        let stats = DerivedStats::from_log(&log).with_time(Duration::from_millis(5));
        assert_eq!(stats.branches_resolved, 1);
        assert_eq!(stats.functions_unwrapped, 1);
        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.warnings, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_transformations(), 2);
        assert_eq!(stats.total_time, Duration::from_millis(5));
        assert_eq!(
            stats.summary(),
            "1 branches resolved, 1 functions unwrapped, 1 errors, 1 warnings in 5ms (1 iterations)"
        );
        assert_eq!(DerivedStats::default().summary(), "no transformations");
    }

    #[test]
    fn test_event_display() {
        let event = Event {
            kind: EventKind::CallResolved,
            rule: Some("resolveLocalCalls"),
            node: Some(NodeId(7)),
            iteration: Some(2),
            message: Some("a(1) -> 2".to_string()),
        };
        assert_eq!(
            event.to_string(),
            "[CallResolved] resolveLocalCalls (iteration 2) at #7: a(1) -> 2"
        );
    }
}
